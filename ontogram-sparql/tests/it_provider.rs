//! End-to-end provider tests over an in-memory executor.

use async_trait::async_trait;
use ontogram_core::{
    DataError, DataProvider, ElementIri, ElementTypeIri, FilterParams, LinkTypeIri,
    PropertyTypeIri, Result,
};
use ontogram_sparql::blank::{encode_bindings, BlankBinding, BlankShape};
use ontogram_sparql::response::SparqlRow;
use ontogram_sparql::{
    SelectResponse, SparqlDataProvider, SparqlDataProviderOptions, SparqlDataProviderSettings,
    SparqlExecutor, SparqlTerm, Triple,
};
use ontogram_vocab::{rdf, rdfs};
use std::sync::{Arc, Mutex};

const EX_ALICE: &str = "http://example.org/alice";
const EX_BOB: &str = "http://example.org/bob";
const EX_PERSON: &str = "http://example.org/Person";
const EX_KNOWS: &str = "http://example.org/knows";

/// Routes SELECT queries by substring to canned rows and records every
/// query it sees.
#[derive(Default)]
struct RouteExecutor {
    routes: Vec<(&'static str, Vec<SparqlRow>)>,
    failures: Vec<&'static str>,
    triples: Vec<Triple>,
    queries: Mutex<Vec<String>>,
}

impl RouteExecutor {
    fn route(mut self, needle: &'static str, rows: Vec<SparqlRow>) -> Self {
        self.routes.push((needle, rows));
        self
    }

    fn fail_on(mut self, needle: &'static str) -> Self {
        self.failures.push(needle);
        self
    }

    fn with_triples(mut self, triples: Vec<Triple>) -> Self {
        self.triples = triples;
        self
    }

    fn seen(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SparqlExecutor for RouteExecutor {
    async fn select(&self, query: &str) -> Result<SelectResponse> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failures.iter().any(|needle| query.contains(needle)) {
            return Err(DataError::Execute("endpoint unavailable".to_string()));
        }
        for (needle, rows) in &self.routes {
            if query.contains(needle) {
                return Ok(SelectResponse::from_rows(rows.clone()));
            }
        }
        Ok(SelectResponse::empty())
    }

    async fn construct(&self, query: &str) -> Result<Vec<Triple>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.triples.clone())
    }
}

fn row(pairs: &[(&str, SparqlTerm)]) -> SparqlRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn provider(executor: Arc<RouteExecutor>) -> SparqlDataProvider {
    SparqlDataProvider::new(
        executor,
        SparqlDataProviderSettings::owl_stats(),
        SparqlDataProviderOptions::default(),
    )
}

#[tokio::test]
async fn element_info_maps_graph_results() {
    let executor = Arc::new(RouteExecutor::default().with_triples(vec![
        Triple::new(
            SparqlTerm::uri(EX_ALICE),
            SparqlTerm::uri(rdf::TYPE),
            SparqlTerm::uri(EX_PERSON),
        ),
        Triple::new(
            SparqlTerm::uri(EX_ALICE),
            SparqlTerm::uri(rdfs::LABEL),
            SparqlTerm::literal_lang("Alice", "en"),
        ),
        Triple::new(
            SparqlTerm::uri(EX_ALICE),
            SparqlTerm::uri("http://example.org/age"),
            SparqlTerm::literal("42"),
        ),
    ]));
    let provider = provider(executor.clone());

    let elements = provider
        .element_info(&[ElementIri::new(EX_ALICE)])
        .await
        .unwrap();
    let alice = &elements[&ElementIri::new(EX_ALICE)];
    assert_eq!(alice.types, vec![ElementTypeIri::new(EX_PERSON)]);
    assert_eq!(alice.label[0].value, "Alice");
    assert!(alice
        .properties
        .contains_key(&PropertyTypeIri::new("http://example.org/age")));

    let seen = executor.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(&format!("<{EX_ALICE}>")));
}

#[tokio::test]
async fn element_info_attaches_images_from_pattern() {
    let executor = Arc::new(
        RouteExecutor::default()
            .with_triples(vec![Triple::new(
                SparqlTerm::uri(EX_ALICE),
                SparqlTerm::uri(rdf::TYPE),
                SparqlTerm::uri(EX_PERSON),
            )])
            .route(
                "?imageProp",
                vec![row(&[
                    ("inst", SparqlTerm::uri(EX_ALICE)),
                    ("image", SparqlTerm::uri("http://example.org/alice.png")),
                ])],
            ),
    );
    let provider = SparqlDataProvider::new(
        executor,
        SparqlDataProviderSettings::owl_stats(),
        SparqlDataProviderOptions {
            image_property_iris: vec!["http://example.org/depiction".to_string()],
            ..Default::default()
        },
    );

    let elements = provider
        .element_info(&[ElementIri::new(EX_ALICE)])
        .await
        .unwrap();
    assert_eq!(
        elements[&ElementIri::new(EX_ALICE)].image.as_deref(),
        Some("http://example.org/alice.png")
    );
}

#[tokio::test]
async fn filter_by_type_maps_found_elements() {
    let executor = Arc::new(RouteExecutor::default().route(
        "SELECT DISTINCT ?inst ?score",
        vec![row(&[
            ("inst", SparqlTerm::uri(EX_ALICE)),
            ("class", SparqlTerm::uri(EX_PERSON)),
            ("label", SparqlTerm::literal_lang("Alice", "en")),
        ])],
    ));
    let provider = provider(executor.clone());

    let mut params = FilterParams::page(10, 0);
    params.element_type_id = Some(ElementTypeIri::new(EX_PERSON));
    let elements = provider.filter(&params).await.unwrap();
    assert_eq!(elements.len(), 1);
    let alice = &elements[&ElementIri::new(EX_ALICE)];
    assert_eq!(alice.types, vec![ElementTypeIri::new(EX_PERSON)]);

    let seen = executor.seen();
    assert!(seen[0].contains(&format!("<{EX_PERSON}>")));
    assert!(seen[0].contains("LIMIT 10"));
}

#[tokio::test]
async fn relevance_ordering_only_applies_to_text_search() {
    let executor = Arc::new(RouteExecutor::default());
    let provider = provider(executor.clone());

    let mut by_type = FilterParams::page(10, 0);
    by_type.element_type_id = Some(ElementTypeIri::new(EX_PERSON));
    provider.filter(&by_type).await.unwrap();

    let mut by_text = FilterParams::page(10, 0);
    by_text.text = Some("alice".to_string());
    provider.filter(&by_text).await.unwrap();

    let seen = executor.seen();
    assert!(
        !seen[0].contains("ORDER BY"),
        "a type-only filter has a constant score, so nothing to order by"
    );
    assert_eq!(
        seen[1].matches("ORDER BY DESC(?score)").count(),
        1,
        "text search orders by relevance exactly once, on the paged select"
    );
    assert!(seen[1].contains("ORDER BY DESC(?score) LIMIT 10"));
}

#[tokio::test]
async fn filter_rejects_link_id_without_ref_element() {
    let executor = Arc::new(RouteExecutor::default());
    let provider = provider(executor.clone());

    let mut params = FilterParams::page(10, 0);
    params.ref_element_link_id = Some(LinkTypeIri::new(EX_KNOWS));
    let err = provider.filter(&params).await.unwrap_err();
    assert!(err.is_usage());
    assert!(executor.seen().is_empty(), "no query before validation");
}

#[tokio::test]
async fn link_types_of_runs_statistics_per_candidate() {
    let executor = Arc::new(
        RouteExecutor::default()
            .route(
                "SELECT DISTINCT ?link",
                vec![row(&[("link", SparqlTerm::uri(EX_KNOWS))])],
            )
            .route(
                "?outObject",
                vec![row(&[
                    ("link", SparqlTerm::uri(EX_KNOWS)),
                    ("inCount", SparqlTerm::literal("2")),
                    ("outCount", SparqlTerm::literal("3")),
                ])],
            ),
    );
    let provider = provider(executor.clone());

    let counts = provider
        .link_types_of(&ElementIri::new(EX_ALICE))
        .await
        .unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].id, LinkTypeIri::new(EX_KNOWS));
    assert_eq!((counts[0].in_count, counts[0].out_count), (2, 3));
    assert_eq!(executor.seen().len(), 2, "candidates then statistics");
}

#[tokio::test]
async fn link_types_of_propagates_statistics_failures() {
    let executor = Arc::new(
        RouteExecutor::default()
            .route(
                "SELECT DISTINCT ?link",
                vec![row(&[("link", SparqlTerm::uri(EX_KNOWS))])],
            )
            .fail_on("?outObject"),
    );
    let provider = provider(executor.clone());

    let err = provider
        .link_types_of(&ElementIri::new(EX_ALICE))
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::Execute(_)));
    assert_eq!(
        executor.seen().len(),
        2,
        "candidate discovery succeeds, the statistics step fails the call"
    );
}

#[tokio::test]
async fn links_info_restricts_types_and_skips_type_lookup() {
    let executor = Arc::new(RouteExecutor::default().route(
        "VALUES ?source",
        vec![row(&[
            ("source", SparqlTerm::uri(EX_ALICE)),
            ("type", SparqlTerm::uri(EX_KNOWS)),
            ("target", SparqlTerm::uri(EX_BOB)),
        ])],
    ));
    let provider = provider(executor.clone());

    let links = provider
        .links_info(
            &[ElementIri::new(EX_ALICE), ElementIri::new(EX_BOB)],
            &[LinkTypeIri::new(EX_KNOWS)],
        )
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].link_type_id, LinkTypeIri::new(EX_KNOWS));

    let seen = executor.seen();
    assert_eq!(seen.len(), 1, "no domain rules, so no type lookup query");
    assert!(seen[0].contains(&format!("FILTER(?type IN (<{EX_KNOWS}>))")));
}

#[tokio::test]
async fn encoded_blank_ids_are_answered_locally() {
    let executor = Arc::new(RouteExecutor::default());
    let provider = provider(executor.clone());

    let bindings = vec![BlankBinding {
        instance: "b0".to_string(),
        shape: BlankShape::Simple,
        class_iri: Some("http://example.org/Address".to_string()),
        source: Some(EX_ALICE.to_string()),
        source_property: Some("http://example.org/address".to_string()),
        target_property: Some("http://example.org/city".to_string()),
        target: Some(SparqlTerm::literal("Lisbon")),
    }];
    let id = ElementIri::new(encode_bindings(&bindings).unwrap());

    let elements = provider.element_info(&[id.clone()]).await.unwrap();
    assert_eq!(
        elements[&id].types,
        vec![ElementTypeIri::new("http://example.org/Address")]
    );

    let counts = provider.link_types_of(&id).await.unwrap();
    assert!(!counts.is_empty());

    let mut params = FilterParams::page(10, 0);
    params.ref_element_id = Some(id);
    let neighbors = provider.filter(&params).await.unwrap();
    assert!(neighbors.contains_key(&ElementIri::new(EX_ALICE)));

    assert!(executor.seen().is_empty(), "everything answered locally");
}

#[tokio::test]
async fn blank_chain_resolution_stops_at_the_depth_bound() {
    use ontogram_sparql::blank::{is_encoded_blank, BlankChainResolver, MAX_CHAIN_DEPTH};

    // Every nested lookup reports yet another anonymous hop, so only the
    // depth bound terminates resolution.
    let executor = Arc::new(RouteExecutor::default().route(
        "FILTER(ISBLANK(?inst))",
        vec![row(&[
            ("inst", SparqlTerm::bnode("bx")),
            ("blankType", SparqlTerm::literal("blankNode")),
            ("blankTrgProp", SparqlTerm::uri("http://example.org/next")),
            ("blankTrg", SparqlTerm::bnode("by")),
        ])],
    ));
    let resolver = BlankChainResolver::new(executor.as_ref(), "");

    let resolved = resolver
        .resolve(vec![BlankBinding {
            instance: "b0".to_string(),
            shape: BlankShape::Simple,
            class_iri: None,
            source: Some(EX_ALICE.to_string()),
            source_property: Some("http://example.org/head".to_string()),
            target_property: Some("http://example.org/next".to_string()),
            target: Some(SparqlTerm::bnode("b1")),
        }])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 1);
    assert!(is_encoded_blank(&resolved[0].instance));
    assert_eq!(
        executor.seen().len(),
        MAX_CHAIN_DEPTH,
        "one query wave per depth, then the bound cuts off"
    );
}

#[tokio::test]
async fn filter_surfaces_blank_rows_under_encoded_ids() {
    let executor = Arc::new(RouteExecutor::default().route(
        "SELECT DISTINCT ?inst ?score",
        vec![
            row(&[
                ("inst", SparqlTerm::uri(EX_ALICE)),
                ("label", SparqlTerm::literal_lang("Alice", "en")),
            ]),
            row(&[
                ("inst", SparqlTerm::bnode("b0")),
                ("blankType", SparqlTerm::literal("blankNode")),
                ("class", SparqlTerm::uri("http://example.org/Address")),
                ("blankSrc", SparqlTerm::uri(EX_ALICE)),
                (
                    "blankSrcProp",
                    SparqlTerm::uri("http://example.org/address"),
                ),
                ("blankTrgProp", SparqlTerm::uri("http://example.org/city")),
                ("blankTrg", SparqlTerm::literal("Lisbon")),
            ]),
        ],
    ));
    let provider = SparqlDataProvider::new(
        executor,
        SparqlDataProviderSettings::owl_stats(),
        SparqlDataProviderOptions {
            accept_blank_nodes: true,
            ..Default::default()
        },
    );

    let mut params = FilterParams::page(10, 0);
    params.element_type_id = Some(ElementTypeIri::new(EX_PERSON));
    let elements = provider.filter(&params).await.unwrap();

    assert_eq!(elements.len(), 2);
    assert!(elements.contains_key(&ElementIri::new(EX_ALICE)));
    let blank = elements
        .keys()
        .find(|id| ontogram_sparql::blank::is_encoded_blank(id.as_str()))
        .expect("blank row surfaced under an encoded id");
    assert_eq!(
        elements[blank].types,
        vec![ElementTypeIri::new("http://example.org/Address")]
    );
}
