//! The single-endpoint provider
//!
//! [`SparqlDataProvider`] answers the full [`DataProvider`] contract against
//! one SPARQL endpoint: it instantiates the configured query templates,
//! executes them through an injected [`SparqlExecutor`], and maps the
//! responses onto model types. Requests addressing encoded blank-node ids
//! are answered locally from the decoded structure without touching the
//! endpoint.

use crate::blank::{self, bindings_from_rows, decode_id, filter_blank_pattern, BlankChainResolver};
use crate::executor::SparqlExecutor;
use crate::mapper::{self, LinkConfigIndex, PropertyConfigIndex};
use crate::response::{triples_to_element_rows, SelectResponse, SparqlRow, SparqlTerm};
use crate::settings::SparqlDataProviderSettings;
use crate::template::{
    enclose_iri, format_iri_list, instantiate_link_path, link_union, property_union,
    ref_element_union, resolve_template,
};
use async_trait::async_trait;
use futures::future::join_all;
use ontogram_core::{
    ClassModel, DataProvider, ElementIri, ElementModel, ElementTypeIri, FilterParams, LinkCount,
    LinkDirection, LinkModel, LinkTypeIri, LinkTypeModel, PropertyModel, PropertyTypeIri, Result,
};
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves image URLs for a batch of elements outside the regular query
/// path, e.g. against a separate media service.
#[async_trait]
pub trait ImagePreparer: Send + Sync {
    /// Produce an image URL per element id; ids without an image are simply
    /// absent from the result.
    async fn prepare(&self, ids: &[ElementIri]) -> Result<HashMap<ElementIri, String>>;
}

/// Behavior switches orthogonal to the endpoint dialect.
#[derive(Clone, Default)]
pub struct SparqlDataProviderOptions {
    /// Surface anonymous nodes as encoded structural ids instead of
    /// dropping them from results
    pub accept_blank_nodes: bool,
    /// Predicates whose object is used as the element image
    pub image_property_iris: Vec<String>,
    /// External image resolution; takes precedence over
    /// `image_property_iris` when set
    pub prepare_images: Option<Arc<dyn ImagePreparer>>,
}

impl std::fmt::Debug for SparqlDataProviderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparqlDataProviderOptions")
            .field("accept_blank_nodes", &self.accept_blank_nodes)
            .field("image_property_iris", &self.image_property_iris)
            .field("has_prepare_images", &self.prepare_images.is_some())
            .finish()
    }
}

/// A [`DataProvider`] backed by one SPARQL endpoint.
pub struct SparqlDataProvider {
    executor: Arc<dyn SparqlExecutor>,
    settings: SparqlDataProviderSettings,
    options: SparqlDataProviderOptions,
    link_index: LinkConfigIndex,
    property_index: PropertyConfigIndex,
    open_world_links: bool,
    open_world_properties: bool,
}

impl SparqlDataProvider {
    /// Create a provider over `executor` with the given endpoint dialect.
    ///
    /// Configuration rules are indexed once here; the open-world flags
    /// default to "open iff no rules exist" unless set explicitly.
    pub fn new(
        executor: Arc<dyn SparqlExecutor>,
        settings: SparqlDataProviderSettings,
        options: SparqlDataProviderOptions,
    ) -> Self {
        let link_index = LinkConfigIndex::new(&settings.link_configurations);
        let property_index = PropertyConfigIndex::new(&settings.property_configurations);
        let open_world_links = settings
            .open_world_links
            .unwrap_or(settings.link_configurations.is_empty());
        let open_world_properties = settings
            .open_world_properties
            .unwrap_or(settings.property_configurations.is_empty());
        Self {
            executor,
            settings,
            options,
            link_index,
            property_index,
            open_world_links,
            open_world_properties,
        }
    }

    fn query(&self, template: &str, substitutions: &HashMap<&str, String>) -> String {
        format!(
            "{}{}",
            self.settings.default_prefixes,
            resolve_template(template, substitutions)
        )
    }

    fn schema_label_subs(&self) -> HashMap<&'static str, String> {
        HashMap::from([(
            "schemaLabelProperty",
            self.settings.schema_label_property.clone(),
        )])
    }

    /// Attach image URLs to `elements`, either through the injected
    /// preparer or through the image query pattern. Failures downgrade to a
    /// warning; elements simply stay imageless.
    async fn enrich_images(&self, elements: &mut HashMap<ElementIri, ElementModel>) {
        if elements.is_empty() {
            return;
        }
        let ids: Vec<ElementIri> = elements.keys().cloned().collect();

        if let Some(preparer) = &self.options.prepare_images {
            match preparer.prepare(&ids).await {
                Ok(images) => {
                    for (id, url) in images {
                        if let Some(element) = elements.get_mut(&id) {
                            element.image = Some(url);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "image preparation failed"),
            }
            return;
        }

        if self.options.image_property_iris.is_empty() {
            return;
        }
        let subs = HashMap::from([
            (
                "ids",
                format_iri_list(ids.iter().map(ElementIri::as_str)),
            ),
            (
                "imageProps",
                format_iri_list(self.options.image_property_iris.iter()),
            ),
        ]);
        let query = self.query(&self.settings.image_query_pattern, &subs);
        match self.executor.select(&query).await {
            Ok(response) => {
                for row in &response.results.bindings {
                    let (Some(inst), Some(image)) = (
                        row.get("inst").and_then(SparqlTerm::as_iri),
                        row.get("image"),
                    ) else {
                        continue;
                    };
                    if let Some(element) = elements.get_mut(&ElementIri::new(inst)) {
                        element.image = Some(image.value().to_string());
                    }
                }
            }
            Err(e) => warn!(error = %e, "image lookup failed"),
        }
    }

    /// `{ out } UNION { in }` pattern bodies for the incident-statistics
    /// query of one candidate link type.
    fn statistics_patterns(&self, element: &ElementIri, candidate: &LinkTypeIri) -> (String, String) {
        let elem = enclose_iri(element.as_str());
        let mut out_patterns = Vec::new();
        let mut in_patterns = Vec::new();
        for config in self
            .settings
            .link_configurations
            .iter()
            .filter(|c| &c.id == candidate)
        {
            if config.is_direct() {
                let pred = enclose_iri(&config.path);
                out_patterns.push(format!("{elem} {pred} ?outObject ."));
                in_patterns.push(format!("?inObject {pred} {elem} ."));
            } else {
                out_patterns.push(instantiate_link_path(&config.path, &elem, "?outObject"));
                in_patterns.push(instantiate_link_path(&config.path, "?inObject", &elem));
            }
        }
        if out_patterns.is_empty() {
            let pred = enclose_iri(candidate.as_str());
            out_patterns.push(format!("{elem} {pred} ?outObject ."));
            in_patterns.push(format!("?inObject {pred} {elem} ."));
        }
        (
            out_patterns.join(" } UNION { "),
            in_patterns.join(" } UNION { "),
        )
    }

    /// Batched type lookup feeding domain matching; skipped entirely when
    /// no link rule restricts its domain.
    async fn element_types(
        &self,
        ids: &[&ElementIri],
    ) -> Result<HashMap<ElementIri, Vec<ElementTypeIri>>> {
        let mut types: HashMap<ElementIri, Vec<ElementTypeIri>> = HashMap::new();
        if ids.is_empty() || !self.link_index.has_domains() {
            return Ok(types);
        }
        let subs = HashMap::from([(
            "ids",
            format_iri_list(ids.iter().map(|id| id.as_str())),
        )]);
        let query = self.query(&self.settings.element_types_query, &subs);
        let response = self.executor.select(&query).await?;
        for row in &response.results.bindings {
            let (Some(inst), Some(class)) = (
                row.get("inst").and_then(SparqlTerm::as_iri),
                row.get("class").and_then(SparqlTerm::as_iri),
            ) else {
                continue;
            };
            let entry = types.entry(ElementIri::new(inst)).or_default();
            let class_id = ElementTypeIri::new(class);
            if !entry.contains(&class_id) {
                entry.push(class_id);
            }
        }
        Ok(types)
    }

    /// Assemble and run the filter query; shared by `filter` and
    /// `link_elements`.
    async fn run_filter(&self, params: &FilterParams) -> Result<HashMap<ElementIri, ElementModel>> {
        let mut criteria = Vec::new();
        let mut extra_prefix = String::new();
        let mut use_extracted_label = false;

        if let Some(type_id) = &params.element_type_id {
            let subs = HashMap::from([("elementTypeIri", enclose_iri(type_id.as_str()))]);
            criteria.push(resolve_template(&self.settings.filter_type_pattern, &subs));
        }
        if let Some(ref_id) = &params.ref_element_id {
            let union = ref_element_union(
                &self.settings.link_configurations,
                ref_id.as_str(),
                params.ref_element_link_id.as_ref(),
                params.link_direction,
                self.open_world_links,
            );
            criteria.push(format!("{union}\nBIND(0 AS ?score)"));
        }
        if let Some(text) = &params.text {
            let search = &self.settings.full_text_search;
            extra_prefix = search.prefix.clone();
            use_extracted_label = search.extract_label;
            let subs = HashMap::from([
                ("text", escape_text(text)),
                (
                    "dataLabelProperty",
                    self.settings.data_label_property.clone(),
                ),
            ]);
            criteria.push(resolve_template(&search.query_pattern, &subs));
        }
        if criteria.is_empty() {
            return Ok(HashMap::new());
        }

        // Relevance ordering only makes sense when a full-text criterion
        // binds a real ?score; it has to sit on the inner select so LIMIT
        // keeps the best-scored page.
        let order_by = if params.text.is_some() {
            " ORDER BY DESC(?score)"
        } else {
            ""
        };
        let mut inner = format!(
            "SELECT DISTINCT ?inst ?score WHERE {{\n{}\n{}\n}}{order_by}",
            criteria.join("\n"),
            self.settings.filter_additional_restriction,
        );
        if params.limit > 0 {
            inner.push_str(&format!(" LIMIT {}", params.limit));
        }
        if params.offset > 0 {
            inner.push_str(&format!(" OFFSET {}", params.offset));
        }

        let info_subs = HashMap::from([(
            "dataLabelProperty",
            self.settings.data_label_property.clone(),
        )]);
        let info_pattern = resolve_template(&self.settings.filter_element_info_pattern, &info_subs);
        let blank_pattern = if self.options.accept_blank_nodes {
            filter_blank_pattern()
        } else {
            String::new()
        };

        let query = format!(
            "{prefixes}{extra_prefix}\
             SELECT ?inst ?class ?label ?score ?extractedLabel \
             ?blankSrc ?blankSrcProp ?blankTrgProp ?blankTrg ?blankType WHERE {{\n\
             {{\n{inner}\n}}\n\
             {info_pattern}\n\
             {blank_pattern}\n\
             }}",
            prefixes = self.settings.default_prefixes,
        );
        debug!(criteria = criteria.len(), "running filter query");
        let response = self.executor.select(&query).await?;

        let (named_rows, blank_rows): (Vec<SparqlRow>, Vec<SparqlRow>) = response
            .results
            .bindings
            .into_iter()
            .partition(|row| !matches!(row.get("inst"), Some(t) if t.is_bnode()));

        let mut elements =
            mapper::filtered_elements(&SelectResponse::from_rows(named_rows), use_extracted_label);

        if self.options.accept_blank_nodes && !blank_rows.is_empty() {
            let resolver =
                BlankChainResolver::new(self.executor.as_ref(), &self.settings.default_prefixes);
            let resolved = resolver.resolve(bindings_from_rows(&blank_rows)).await?;
            let mut by_id: HashMap<String, Vec<blank::BlankBinding>> = HashMap::new();
            for binding in resolved {
                by_id.entry(binding.instance.clone()).or_default().push(binding);
            }
            for (id, bindings) in by_id {
                let element_id = ElementIri::new(id);
                elements.insert(
                    element_id.clone(),
                    blank::element_from_bindings(&element_id, &bindings),
                );
            }
        }
        Ok(elements)
    }
}

/// Escape a text value for inclusion inside a quoted query string.
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl DataProvider for SparqlDataProvider {
    async fn class_tree(&self) -> Result<Vec<ClassModel>> {
        let query = self.query(&self.settings.class_tree_query, &self.schema_label_subs());
        let response = self.executor.select(&query).await?;
        Ok(mapper::class_tree(&response))
    }

    async fn class_info(&self, class_ids: &[ElementTypeIri]) -> Result<Vec<ClassModel>> {
        if class_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut subs = self.schema_label_subs();
        subs.insert("ids", format_iri_list(class_ids.iter().map(ElementTypeIri::as_str)));
        let query = self.query(&self.settings.class_info_query, &subs);
        let response = self.executor.select(&query).await?;
        Ok(mapper::class_info(&response))
    }

    async fn property_info(
        &self,
        property_ids: &[PropertyTypeIri],
    ) -> Result<HashMap<PropertyTypeIri, PropertyModel>> {
        if property_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut subs = self.schema_label_subs();
        subs.insert(
            "ids",
            format_iri_list(property_ids.iter().map(PropertyTypeIri::as_str)),
        );
        let query = self.query(&self.settings.property_info_query, &subs);
        let response = self.executor.select(&query).await?;
        Ok(mapper::property_info(&response))
    }

    async fn link_types(&self) -> Result<Vec<LinkTypeModel>> {
        let query = self.query(&self.settings.link_types_query, &self.schema_label_subs());
        let response = self.executor.select(&query).await?;
        Ok(mapper::link_types(&response))
    }

    async fn link_types_info(&self, link_type_ids: &[LinkTypeIri]) -> Result<Vec<LinkTypeModel>> {
        if link_type_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut subs = self.schema_label_subs();
        subs.insert(
            "ids",
            format_iri_list(link_type_ids.iter().map(LinkTypeIri::as_str)),
        );
        let query = self.query(&self.settings.link_types_info_query, &subs);
        let response = self.executor.select(&query).await?;
        Ok(mapper::link_types(&response))
    }

    async fn element_info(
        &self,
        element_ids: &[ElementIri],
    ) -> Result<HashMap<ElementIri, ElementModel>> {
        let mut elements: HashMap<ElementIri, ElementModel> = HashMap::new();
        let mut named: Vec<&ElementIri> = Vec::new();
        for id in element_ids {
            match decode_id(id.as_str()) {
                Some(bindings) => {
                    elements.insert(id.clone(), blank::element_from_bindings(id, &bindings));
                }
                None => named.push(id),
            }
        }

        if !named.is_empty() {
            let subs = HashMap::from([
                ("ids", format_iri_list(named.iter().map(|id| id.as_str()))),
                (
                    "dataLabelProperty",
                    self.settings.data_label_property.clone(),
                ),
                (
                    "propertyPatterns",
                    property_union(
                        &self.settings.property_configurations,
                        "?propType",
                        "?propValue",
                        self.open_world_properties,
                    ),
                ),
            ]);
            let query = self.query(&self.settings.element_info_query, &subs);
            let triples = self.executor.construct(&query).await?;
            let rows = triples_to_element_rows(&triples);
            elements.extend(mapper::elements_info(
                &rows,
                &self.property_index,
                self.open_world_properties,
            ));
        }

        self.enrich_images(&mut elements).await;
        Ok(elements)
    }

    async fn links_info(
        &self,
        element_ids: &[ElementIri],
        link_type_ids: &[LinkTypeIri],
    ) -> Result<Vec<LinkModel>> {
        let requested: FxHashSet<&str> = element_ids.iter().map(ElementIri::as_str).collect();
        let mut links: Vec<LinkModel> = Vec::new();
        let mut named: Vec<&ElementIri> = Vec::new();

        for id in element_ids {
            match decode_id(id.as_str()) {
                Some(bindings) => {
                    for link in blank::links_from_bindings(&bindings) {
                        let counterpart = if link.source_id.as_str() == id.as_str() {
                            &link.target_id
                        } else {
                            &link.source_id
                        };
                        if !requested.contains(counterpart.as_str()) {
                            continue;
                        }
                        if !link_type_ids.is_empty() && !link_type_ids.contains(&link.link_type_id)
                        {
                            continue;
                        }
                        links.push(link);
                    }
                }
                None => named.push(id),
            }
        }

        if !named.is_empty() {
            let restriction = if link_type_ids.is_empty() {
                // A lone space suppresses the token without leaving it
                // literally in the query.
                " ".to_string()
            } else {
                format!(
                    "FILTER(?type IN ({}))",
                    link_type_ids
                        .iter()
                        .map(|id| enclose_iri(id.as_str()))
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            let subs = HashMap::from([
                ("ids", format_iri_list(named.iter().map(|id| id.as_str()))),
                (
                    "linkPatterns",
                    link_union(
                        &self.settings.link_configurations,
                        "?type",
                        self.open_world_links,
                    ),
                ),
                ("linkTypeRestriction", restriction),
            ]);
            let query = self.query(&self.settings.links_info_query, &subs);
            let types_by_element = self.element_types(&named).await?;
            let response = self.executor.select(&query).await?;
            links.extend(mapper::links_info(
                &response.results.bindings,
                &self.link_index,
                self.open_world_links,
                &types_by_element,
            ));
        }
        Ok(links)
    }

    async fn link_types_of(&self, element_id: &ElementIri) -> Result<Vec<LinkCount>> {
        if let Some(bindings) = decode_id(element_id.as_str()) {
            return Ok(blank::link_counts_from_bindings(&bindings));
        }

        let union = ref_element_union(
            &self.settings.link_configurations,
            element_id.as_str(),
            None,
            None,
            self.open_world_links,
        );
        let subs = HashMap::from([("linkUnion", union)]);
        let query = self.query(&self.settings.link_types_of_query, &subs);
        let response = self.executor.select(&query).await?;
        let candidates = mapper::link_type_ids(&response);

        let statistics = candidates.iter().map(|candidate| {
            let (out_pattern, in_pattern) = self.statistics_patterns(element_id, candidate);
            let subs = HashMap::from([
                ("linkId", enclose_iri(candidate.as_str())),
                ("outPattern", out_pattern),
                ("inPattern", in_pattern),
            ]);
            let query = self.query(&self.settings.link_types_statistics_query, &subs);
            async move { self.executor.select(&query).await }
        });

        let mut counts = Vec::new();
        for response in join_all(statistics).await {
            if let Some(count) = mapper::link_count(&response?) {
                counts.push(count);
            }
        }
        Ok(counts)
    }

    async fn link_elements(
        &self,
        element_id: &ElementIri,
        link_id: Option<&LinkTypeIri>,
        limit: usize,
        offset: usize,
        direction: Option<LinkDirection>,
    ) -> Result<HashMap<ElementIri, ElementModel>> {
        let mut params = FilterParams::page(limit, offset);
        params.ref_element_id = Some(element_id.clone());
        params.ref_element_link_id = link_id.cloned();
        params.link_direction = direction;
        self.filter(&params).await
    }

    async fn filter(&self, params: &FilterParams) -> Result<HashMap<ElementIri, ElementModel>> {
        params.validate()?;
        if let Some(ref_id) = &params.ref_element_id {
            // Neighborhoods of an encoded blank node are fully known from
            // its decoded structure; no query needed.
            if let Some(bindings) = decode_id(ref_id.as_str()) {
                return Ok(blank::filter_neighbors(&bindings, params));
            }
        }
        self.run_filter(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Triple;
    use crate::settings::LinkConfiguration;

    struct NoopExecutor;

    #[async_trait]
    impl SparqlExecutor for NoopExecutor {
        async fn select(&self, _: &str) -> Result<SelectResponse> {
            Ok(SelectResponse::empty())
        }

        async fn construct(&self, _: &str) -> Result<Vec<Triple>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn text_escaping_covers_quotes_and_backslashes() {
        assert_eq!(escape_text(r#"say "hi"\now"#), r#"say \"hi\"\\now"#);
    }

    #[test]
    fn statistics_patterns_use_configured_paths() {
        let mut settings = SparqlDataProviderSettings::owl_stats();
        settings.link_configurations = vec![LinkConfiguration::path(
            "http://example.org/worksWith",
            "?source <http://example.org/member> ?g . ?g <http://example.org/member> ?target .",
        )];
        let provider = SparqlDataProvider::new(
            Arc::new(NoopExecutor),
            settings,
            SparqlDataProviderOptions::default(),
        );
        let (out_pattern, in_pattern) = provider.statistics_patterns(
            &ElementIri::new("http://example.org/alice"),
            &LinkTypeIri::new("http://example.org/worksWith"),
        );
        assert!(out_pattern
            .starts_with("<http://example.org/alice> <http://example.org/member> ?g"));
        assert!(out_pattern.contains("?outObject"));
        assert!(in_pattern.contains("?inObject <http://example.org/member>"));
    }

    #[test]
    fn unconfigured_candidate_falls_back_to_its_own_predicate() {
        let provider = SparqlDataProvider::new(
            Arc::new(NoopExecutor),
            SparqlDataProviderSettings::owl_stats(),
            SparqlDataProviderOptions::default(),
        );
        let (out_pattern, in_pattern) = provider.statistics_patterns(
            &ElementIri::new("http://example.org/alice"),
            &LinkTypeIri::new("http://example.org/knows"),
        );
        assert_eq!(
            out_pattern,
            "<http://example.org/alice> <http://example.org/knows> ?outObject ."
        );
        assert_eq!(
            in_pattern,
            "?inObject <http://example.org/knows> <http://example.org/alice> ."
        );
    }
}
