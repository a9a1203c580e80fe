//! Structural identity for anonymous (blank) nodes
//!
//! Blank nodes have no durable identifier, yet the diagram must address them
//! across separate requests. The codec treats the set of defining edges
//! around an anonymous node as its identity: bindings are structurally
//! de-duplicated, deterministically sorted, JSON-encoded, percent-escaped,
//! and prefixed with a reserved marker. Two structurally identical binding
//! sets always collapse to the same encoded id.
//!
//! Encoded ids are stable for a given binding set within one data session;
//! they are not tied to the store's own blank-node labels, which may change
//! between query executions.
//!
//! Chains of nested anonymous nodes (typically RDF lists) resolve breadth
//! first, one query wave per recursion depth, bounded by
//! [`MAX_CHAIN_DEPTH`]; deeper chains keep their raw store label rather than
//! recursing further.

use crate::executor::SparqlExecutor;
use crate::response::{SparqlRow, SparqlTerm};
use crate::template::enclose_iri;
use ontogram_core::{
    DataError, ElementIri, ElementModel, ElementTypeIri, FilterParams, LinkCount, LinkDirection,
    LinkIdentity, LinkModel, LinkTypeIri, LocalizedString, Property, PropertyTypeIri, Result,
};
use ontogram_vocab::rdf;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker prefix of encoded blank-node identifiers. Reserved scheme-like
/// text that never collides with ordinary IRIs.
pub const ENCODED_PREFIX: &str = "ontogram:blank:";

/// Maximum nesting depth resolved for anonymous chains. Chains deeper than
/// this keep an unresolved raw reference; termination is guaranteed by the
/// bound, not by cancellation.
pub const MAX_CHAIN_DEPTH: usize = 3;

/// Discriminator of blank-node shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlankShape {
    /// A plain anonymous node with arbitrary outgoing edges
    #[serde(rename = "blankNode")]
    Simple,
    /// The head of an RDF-list-shaped structure
    #[serde(rename = "listHead")]
    ListHead,
}

/// One edge touching an anonymous node.
///
/// The `instance` handle identifies the node within a single response
/// (a store label or, after resolution, the encoded id); it carries no
/// identity. Identity is the canonical JSON encoding of the remaining
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankBinding {
    /// Per-call handle; excluded from canonical identity
    #[serde(skip)]
    pub instance: String,
    /// Shape discriminator
    pub shape: BlankShape,
    /// Declared class of the node, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_iri: Option<String>,
    /// Named (or encoded) node pointing at this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Predicate of the incoming edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_property: Option<String>,
    /// Predicate of the outgoing edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
    /// Value of the outgoing edge; may itself be a blank node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SparqlTerm>,
}

fn canonical_json(binding: &BlankBinding) -> Result<String> {
    serde_json::to_string(binding)
        .map_err(|e| DataError::Malformed(format!("blank binding encode failed: {e}")))
}

/// Encode a binding set into its canonical identifier.
///
/// Structurally identical bindings are collapsed, the remainder sorted
/// deterministically; input order never affects the result.
pub fn encode_bindings(bindings: &[BlankBinding]) -> Result<String> {
    let mut canonical: Vec<String> = bindings
        .iter()
        .map(canonical_json)
        .collect::<Result<Vec<_>>>()?;
    canonical.sort();
    canonical.dedup();
    let payload = format!("[{}]", canonical.join(","));
    Ok(format!("{ENCODED_PREFIX}{}", urlencoding::encode(&payload)))
}

/// Whether `id` is an encoded blank-node identifier.
pub fn is_encoded_blank(id: &str) -> bool {
    id.starts_with(ENCODED_PREFIX)
}

/// Decode an encoded identifier back into its binding set, re-attaching the
/// id itself as each binding's instance handle.
///
/// Returns `None` for ids that are not encoded blank ids; this doubles as a
/// type predicate.
pub fn decode_id(id: &str) -> Option<Vec<BlankBinding>> {
    let payload = id.strip_prefix(ENCODED_PREFIX)?;
    let decoded = urlencoding::decode(payload).ok()?;
    let mut bindings: Vec<BlankBinding> = serde_json::from_str(&decoded).ok()?;
    for binding in &mut bindings {
        binding.instance = id.to_string();
    }
    Some(bindings)
}

/// The OPTIONAL fragment that enriches a filter query with blank-node
/// context, binding `?blankSrc ?blankSrcProp ?blankTrgProp ?blankTrg
/// ?blankType` for rows whose `?inst` is anonymous.
pub fn filter_blank_pattern() -> String {
    format!(
        "OPTIONAL {{\n\
         FILTER(ISBLANK(?inst))\n\
         ?blankSrc ?blankSrcProp ?inst .\n\
         {{\n\
           ?inst ?blankTrgProp ?blankTrg .\n\
           BIND(\"blankNode\" AS ?blankType)\n\
           FILTER NOT EXISTS {{ ?inst {first} ?first }}\n\
         }} UNION {{\n\
           ?inst {rest}*/{first} ?blankTrg .\n\
           BIND({first} AS ?blankTrgProp)\n\
           BIND(\"listHead\" AS ?blankType)\n\
         }}\n\
         OPTIONAL {{ ?inst a ?class }}\n\
         }}",
        first = enclose_iri(rdf::FIRST),
        rest = enclose_iri(rdf::REST),
    )
}

/// Collect blank bindings from rows whose `?inst` is a blank node, using
/// the variable names bound by [`filter_blank_pattern`].
pub fn bindings_from_rows(rows: &[SparqlRow]) -> Vec<BlankBinding> {
    let mut bindings = Vec::new();
    for row in rows {
        let Some(SparqlTerm::Bnode { value: label }) = row.get("inst") else {
            continue;
        };
        let shape = match row.get("blankType") {
            Some(SparqlTerm::Literal { value, .. }) if value == "listHead" => BlankShape::ListHead,
            _ => BlankShape::Simple,
        };
        bindings.push(BlankBinding {
            instance: label.clone(),
            shape,
            class_iri: row
                .get("class")
                .and_then(SparqlTerm::as_iri)
                .map(str::to_string),
            source: row
                .get("blankSrc")
                .and_then(SparqlTerm::as_iri)
                .map(str::to_string),
            source_property: row
                .get("blankSrcProp")
                .and_then(SparqlTerm::as_iri)
                .map(str::to_string),
            target_property: row
                .get("blankTrgProp")
                .and_then(SparqlTerm::as_iri)
                .map(str::to_string),
            target: row.get("blankTrg").cloned(),
        });
    }
    bindings
}

/// Path of formatted predicate steps from a named anchor node down to one
/// anonymous node.
#[derive(Debug, Clone)]
struct Anchor {
    source_iri: String,
    /// Already-formatted path steps (`<iri>` or `<rest>*/<first>`)
    steps: Vec<String>,
}

struct Group {
    bindings: Vec<BlankBinding>,
    /// (parent group index, parent member index) for nested groups
    parent: Option<(usize, usize)>,
    depth: usize,
    anchor: Option<Anchor>,
    resolved_id: Option<String>,
}

/// Resolves chains of nested anonymous nodes against an executor.
///
/// One resolver call owns a transient memo from query string to rows; the
/// memo de-duplicates identical queries requested by siblings within the
/// same wave and is discarded when the call ends, so repeated calls never
/// share stale state.
pub struct BlankChainResolver<'a> {
    executor: &'a dyn SparqlExecutor,
    prefixes: &'a str,
}

impl<'a> BlankChainResolver<'a> {
    /// Create a resolver over `executor`; `prefixes` is prepended to every
    /// nested query.
    pub fn new(executor: &'a dyn SparqlExecutor, prefixes: &'a str) -> Self {
        Self { executor, prefixes }
    }

    /// Resolve all chains in `bindings`, returning the bindings with their
    /// instance handles rewritten to encoded ids.
    ///
    /// Proceeds in breadth-first waves, one per nesting depth, each wave
    /// awaited fully before the next; bounded by [`MAX_CHAIN_DEPTH`].
    pub async fn resolve(&self, bindings: Vec<BlankBinding>) -> Result<Vec<BlankBinding>> {
        let mut groups = initial_groups(bindings);
        let mut memo: FxHashMap<String, Vec<SparqlRow>> = FxHashMap::default();

        for depth in 0..MAX_CHAIN_DEPTH {
            let wave = self.collect_wave(&groups, depth);
            if wave.is_empty() {
                break;
            }

            // Issue each distinct query once per call.
            let mut pending: Vec<String> = Vec::new();
            for (query, _) in &wave {
                if !memo.contains_key(query) && !pending.contains(query) {
                    pending.push(query.clone());
                }
            }
            let responses = futures::future::join_all(
                pending.iter().map(|query| self.executor.select(query)),
            )
            .await;
            for (query, response) in pending.into_iter().zip(responses) {
                memo.insert(query, response?.results.bindings);
            }

            for (query, slots) in wave {
                let rows = memo.get(&query).map(Vec::as_slice).unwrap_or(&[]);
                let children = nested_bindings(rows);
                if children.is_empty() {
                    continue;
                }
                for (group_index, member_index) in slots {
                    let anchor = child_anchor(&groups[group_index], member_index);
                    groups.push(Group {
                        bindings: children.clone(),
                        parent: Some((group_index, member_index)),
                        depth: depth + 1,
                        anchor,
                        resolved_id: None,
                    });
                }
            }
        }

        finish_groups(groups)
    }

    /// Queries needed at `depth`: one per member whose target is still an
    /// anonymous node and whose group has a usable anchor.
    fn collect_wave(&self, groups: &[Group], depth: usize) -> Vec<(String, Vec<(usize, usize)>)> {
        let mut wave: Vec<(String, Vec<(usize, usize)>)> = Vec::new();
        for (group_index, group) in groups.iter().enumerate() {
            if group.depth != depth {
                continue;
            }
            let Some(anchor) = &group.anchor else {
                continue;
            };
            for (member_index, binding) in group.bindings.iter().enumerate() {
                let nested = matches!(&binding.target, Some(t) if t.is_bnode());
                if !nested {
                    continue;
                }
                let Some(step) = member_step(binding) else {
                    continue;
                };
                let query = self.nested_query(anchor, &step);
                match wave.iter_mut().find(|(q, _)| q == &query) {
                    Some((_, slots)) => slots.push((group_index, member_index)),
                    None => wave.push((query, vec![(group_index, member_index)])),
                }
            }
        }
        wave
    }

    /// Query re-locating a nested anonymous node through its named anchor
    /// and fetching its own defining bindings.
    fn nested_query(&self, anchor: &Anchor, step: &str) -> String {
        let mut lines = Vec::new();
        let mut subject = enclose_iri(&anchor.source_iri);
        let steps: Vec<&str> = anchor
            .steps
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(step))
            .collect();
        let last = steps.len() - 1;
        for (i, path) in steps.iter().enumerate() {
            let var = if i == last {
                "?inst".to_string()
            } else {
                format!("?b{i}")
            };
            lines.push(format!("{subject} {path} {var} ."));
            subject = var;
        }
        format!(
            "{prefixes}SELECT ?inst ?class ?blankTrgProp ?blankTrg ?blankType WHERE {{\n\
             {path}\n\
             FILTER(ISBLANK(?inst))\n\
             {{\n\
               ?inst ?blankTrgProp ?blankTrg .\n\
               BIND(\"blankNode\" AS ?blankType)\n\
               FILTER NOT EXISTS {{ ?inst {first} ?first }}\n\
             }} UNION {{\n\
               ?inst {rest}*/{first} ?blankTrg .\n\
               BIND({first} AS ?blankTrgProp)\n\
               BIND(\"listHead\" AS ?blankType)\n\
             }}\n\
             OPTIONAL {{ ?inst a ?class }}\n\
             }}",
            prefixes = self.prefixes,
            path = lines.join("\n"),
            first = enclose_iri(rdf::FIRST),
            rest = enclose_iri(rdf::REST),
        )
    }
}

/// Group input bindings by instance handle, preserving first-seen order.
fn initial_groups(bindings: Vec<BlankBinding>) -> Vec<Group> {
    let mut index_by_handle: FxHashMap<String, usize> = FxHashMap::default();
    let mut groups: Vec<Group> = Vec::new();
    for binding in bindings {
        let anchor = binding.source.as_ref().and_then(|source| {
            if is_encoded_blank(source) {
                return None;
            }
            binding.source_property.as_ref().map(|prop| Anchor {
                source_iri: source.clone(),
                steps: vec![enclose_iri(prop)],
            })
        });
        match index_by_handle.get(&binding.instance) {
            Some(&i) => groups[i].bindings.push(binding),
            None => {
                index_by_handle.insert(binding.instance.clone(), groups.len());
                groups.push(Group {
                    bindings: vec![binding],
                    parent: None,
                    depth: 0,
                    anchor,
                    resolved_id: None,
                });
            }
        }
    }
    groups
}

/// The path step leading from a binding's node to its nested target.
fn member_step(binding: &BlankBinding) -> Option<String> {
    match binding.shape {
        BlankShape::Simple => binding
            .target_property
            .as_ref()
            .map(|prop| enclose_iri(prop)),
        BlankShape::ListHead => Some(format!(
            "{}*/{}",
            enclose_iri(rdf::REST),
            enclose_iri(rdf::FIRST)
        )),
    }
}

fn child_anchor(parent: &Group, member_index: usize) -> Option<Anchor> {
    let anchor = parent.anchor.as_ref()?;
    let step = member_step(&parent.bindings[member_index])?;
    let mut steps = anchor.steps.clone();
    steps.push(step);
    Some(Anchor {
        source_iri: anchor.source_iri.clone(),
        steps,
    })
}

/// Nested rows become child bindings. Nested bindings carry no incoming
/// edge: their identity is purely their own outgoing structure, which is
/// what makes parent ids computable from child ids.
fn nested_bindings(rows: &[SparqlRow]) -> Vec<BlankBinding> {
    bindings_from_rows(rows)
        .into_iter()
        .map(|mut binding| {
            binding.source = None;
            binding.source_property = None;
            binding
        })
        .collect()
}

/// Substitute resolved child ids into parents bottom-up, then compute each
/// group's encoded id. Children always have a larger index than their
/// parent, so reverse iteration settles them first. Members whose target is
/// still anonymous past the depth bound keep the raw reference.
fn finish_groups(mut groups: Vec<Group>) -> Result<Vec<BlankBinding>> {
    for group_index in (0..groups.len()).rev() {
        // Collect settled children of this group first to keep the borrows
        // disjoint.
        let substitutions: Vec<(usize, String)> = groups
            .iter()
            .filter_map(|child| match (&child.parent, &child.resolved_id) {
                (Some((parent, member)), Some(id)) if *parent == group_index => {
                    Some((*member, id.clone()))
                }
                _ => None,
            })
            .collect();
        let group = &mut groups[group_index];
        for (member_index, child_id) in substitutions {
            group.bindings[member_index].target = Some(SparqlTerm::uri(child_id));
        }
        let id = encode_bindings(&group.bindings)?;
        for binding in &mut group.bindings {
            binding.instance = id.clone();
        }
        group.resolved_id = Some(id);
    }

    Ok(groups
        .into_iter()
        .filter(|group| group.parent.is_none())
        .flat_map(|group| group.bindings)
        .collect())
}

/// Build an element model for one decoded blank node.
pub fn element_from_bindings(id: &ElementIri, bindings: &[BlankBinding]) -> ElementModel {
    let mut element = ElementModel::empty(id.clone());
    for binding in bindings {
        if let Some(class) = &binding.class_iri {
            element.add_type(ElementTypeIri::new(class.clone()));
        }
        let (Some(property), Some(target)) = (&binding.target_property, &binding.target) else {
            continue;
        };
        let key = PropertyTypeIri::new(property.clone());
        let incoming = match target {
            SparqlTerm::Uri { value } => Property::Iri {
                values: vec![ElementIri::new(value.clone())],
            },
            SparqlTerm::Literal {
                value,
                lang,
                datatype,
            } => Property::Literal {
                values: vec![LocalizedString {
                    value: value.clone(),
                    language: lang.clone().unwrap_or_default(),
                    datatype: datatype.clone(),
                }],
            },
            SparqlTerm::Bnode { .. } => continue,
        };
        match element.properties.get_mut(&key) {
            Some(existing) => existing.merge(&incoming),
            None => {
                element.properties.insert(key, incoming);
            }
        }
    }
    element
}

/// Links incident to one decoded blank node.
pub fn links_from_bindings(bindings: &[BlankBinding]) -> Vec<LinkModel> {
    let mut seen: FxHashSet<LinkIdentity> = FxHashSet::default();
    let mut links = Vec::new();
    let mut push = |link: LinkModel| {
        if seen.insert(link.identity()) {
            links.push(link);
        }
    };
    for binding in bindings {
        if let (Some(source), Some(property)) = (&binding.source, &binding.source_property) {
            push(LinkModel {
                link_type_id: LinkTypeIri::new(property.clone()),
                source_id: ElementIri::new(source.clone()),
                target_id: ElementIri::new(binding.instance.clone()),
                properties: HashMap::new(),
            });
        }
        if let (Some(property), Some(SparqlTerm::Uri { value })) =
            (&binding.target_property, &binding.target)
        {
            push(LinkModel {
                link_type_id: LinkTypeIri::new(property.clone()),
                source_id: ElementIri::new(binding.instance.clone()),
                target_id: ElementIri::new(value.clone()),
                properties: HashMap::new(),
            });
        }
    }
    links
}

/// Purely local incident-edge statistics for one decoded blank node.
pub fn link_counts_from_bindings(bindings: &[BlankBinding]) -> Vec<LinkCount> {
    let mut order: Vec<LinkTypeIri> = Vec::new();
    let mut counts: FxHashMap<LinkTypeIri, (u64, u64)> = FxHashMap::default();
    let mut bump = |id: LinkTypeIri, incoming: bool| {
        let entry = counts.entry(id.clone()).or_insert_with(|| {
            order.push(id);
            (0, 0)
        });
        if incoming {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    };
    for binding in bindings {
        if let Some(property) = &binding.source_property {
            bump(LinkTypeIri::new(property.clone()), true);
        }
        if let (Some(property), Some(SparqlTerm::Uri { .. })) =
            (&binding.target_property, &binding.target)
        {
            bump(LinkTypeIri::new(property.clone()), false);
        }
    }
    order
        .into_iter()
        .filter_map(|id| {
            counts.remove(&id).map(|(in_count, out_count)| LinkCount {
                id,
                in_count,
                out_count,
            })
        })
        .collect()
}

/// Local filter over a decoded reference element: its neighbors, optionally
/// restricted by link id and direction. Always answered without a query.
pub fn filter_neighbors(
    bindings: &[BlankBinding],
    params: &FilterParams,
) -> HashMap<ElementIri, ElementModel> {
    let mut result = HashMap::new();
    for link in links_from_bindings(bindings) {
        if let Some(link_id) = &params.ref_element_link_id {
            if &link.link_type_id != link_id {
                continue;
            }
        }
        let ref_id = params.ref_element_id.as_ref().map(ElementIri::as_str);
        let outgoing = Some(link.source_id.as_str()) == ref_id;
        match params.link_direction {
            Some(LinkDirection::Out) if !outgoing => continue,
            Some(LinkDirection::In) if outgoing => continue,
            _ => {}
        }
        let neighbor = if outgoing { link.target_id } else { link.source_id };
        result
            .entry(neighbor.clone())
            .or_insert_with(|| ElementModel::empty(neighbor));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_binding(instance: &str, target: SparqlTerm) -> BlankBinding {
        BlankBinding {
            instance: instance.to_string(),
            shape: BlankShape::Simple,
            class_iri: Some("http://example.org/Address".to_string()),
            source: Some("http://example.org/alice".to_string()),
            source_property: Some("http://example.org/address".to_string()),
            target_property: Some("http://example.org/city".to_string()),
            target: Some(target),
        }
    }

    #[test]
    fn round_trip_preserves_structure() {
        let bindings = vec![
            simple_binding("b0", SparqlTerm::literal("Lisbon")),
            simple_binding("b0", SparqlTerm::uri("http://example.org/lisbon")),
        ];
        let id = encode_bindings(&bindings).unwrap();
        assert!(is_encoded_blank(&id));

        let decoded = decode_id(&id).expect("decodable");
        assert_eq!(decoded.len(), 2);
        for binding in &decoded {
            assert_eq!(binding.instance, id, "handle rewritten to the new id");
        }
        let reencoded = encode_bindings(&decoded).unwrap();
        assert_eq!(id, reencoded);
    }

    #[test]
    fn encoding_is_order_independent() {
        let a = simple_binding("b0", SparqlTerm::literal("Lisbon"));
        let b = simple_binding("b0", SparqlTerm::uri("http://example.org/lisbon"));
        let forward = encode_bindings(&[a.clone(), b.clone()]).unwrap();
        let backward = encode_bindings(&[b, a]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn structurally_identical_bindings_collapse() {
        let a = simple_binding("b0", SparqlTerm::literal("Lisbon"));
        let mut b = a.clone();
        b.instance = "b99".to_string();
        let single = encode_bindings(&[a.clone()]).unwrap();
        let doubled = encode_bindings(&[a, b]).unwrap();
        assert_eq!(single, doubled, "instance handle carries no identity");
    }

    #[test]
    fn decode_rejects_ordinary_iris() {
        assert_eq!(decode_id("http://example.org/alice"), None);
        assert!(!is_encoded_blank("http://example.org/alice"));
    }

    #[test]
    fn decoded_element_carries_types_and_properties() {
        let bindings = vec![simple_binding("b0", SparqlTerm::literal("Lisbon"))];
        let id = encode_bindings(&bindings).unwrap();
        let element = element_from_bindings(&ElementIri::new(id.clone()), &decode_id(&id).unwrap());
        assert_eq!(
            element.types,
            vec![ElementTypeIri::new("http://example.org/Address")]
        );
        assert!(element
            .properties
            .contains_key(&PropertyTypeIri::new("http://example.org/city")));
    }

    #[test]
    fn local_link_counts_cover_both_directions() {
        let bindings = vec![simple_binding(
            "b0",
            SparqlTerm::uri("http://example.org/lisbon"),
        )];
        let counts = link_counts_from_bindings(&bindings);
        assert_eq!(counts.len(), 2);
        let incoming = counts
            .iter()
            .find(|c| c.id.as_str() == "http://example.org/address")
            .unwrap();
        assert_eq!((incoming.in_count, incoming.out_count), (1, 0));
        let outgoing = counts
            .iter()
            .find(|c| c.id.as_str() == "http://example.org/city")
            .unwrap();
        assert_eq!((outgoing.in_count, outgoing.out_count), (0, 1));
    }

    #[test]
    fn neighbor_filter_respects_direction() {
        let bindings = vec![simple_binding(
            "b0",
            SparqlTerm::uri("http://example.org/lisbon"),
        )];
        let id = encode_bindings(&bindings).unwrap();
        let decoded = decode_id(&id).unwrap();

        let mut params = FilterParams::page(10, 0);
        params.ref_element_id = Some(ElementIri::new(id.clone()));
        params.link_direction = Some(LinkDirection::Out);
        let out = filter_neighbors(&decoded, &params);
        assert!(out.contains_key(&ElementIri::new("http://example.org/lisbon")));
        assert_eq!(out.len(), 1);

        params.link_direction = Some(LinkDirection::In);
        let incoming = filter_neighbors(&decoded, &params);
        assert!(incoming.contains_key(&ElementIri::new("http://example.org/alice")));
        assert_eq!(incoming.len(), 1);
    }
}
