//! Mapping query bindings onto domain entities
//!
//! Raw tabular/graph bindings become [`ElementModel`]s, [`LinkModel`]s, and
//! the class forest here. Domain-matching rules decide whether a raw
//! predicate surfaces as a configured logical id, passes through unchanged
//! (open world), or is dropped (closed world).

use crate::response::{SelectResponse, SparqlRow, SparqlTerm};
use crate::settings::{LinkConfiguration, PropertyConfiguration};
use ontogram_core::{
    ClassModel, ElementIri, ElementModel, ElementTypeIri, LinkCount, LinkIdentity, LinkModel,
    LinkTypeIri, LinkTypeModel, LocalizedString, Property, PropertyModel, PropertyTypeIri,
};
use ontogram_vocab::{rdf, rdfs};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;

/// Link rules indexed by their effective predicate.
#[derive(Debug, Clone, Default)]
pub struct LinkConfigIndex {
    by_predicate: FxHashMap<String, Vec<LinkConfiguration>>,
    has_domains: bool,
}

impl LinkConfigIndex {
    /// Index `configs` by [`LinkConfiguration::effective_predicate`].
    pub fn new(configs: &[LinkConfiguration]) -> Self {
        let mut by_predicate: FxHashMap<String, Vec<LinkConfiguration>> = FxHashMap::default();
        let mut has_domains = false;
        for config in configs {
            has_domains |= !config.domain.is_empty();
            by_predicate
                .entry(config.effective_predicate().to_string())
                .or_default()
                .push(config.clone());
        }
        Self {
            by_predicate,
            has_domains,
        }
    }

    /// Rules keyed under `predicate`.
    pub fn lookup(&self, predicate: &str) -> &[LinkConfiguration] {
        self.by_predicate
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether no rules are configured at all.
    pub fn is_empty(&self) -> bool {
        self.by_predicate.is_empty()
    }

    /// Whether any rule restricts its domain. When none does, type context
    /// is unnecessary for matching and the type-lookup query can be skipped.
    pub fn has_domains(&self) -> bool {
        self.has_domains
    }
}

/// Property rules indexed by their effective predicate.
#[derive(Debug, Clone, Default)]
pub struct PropertyConfigIndex {
    by_predicate: FxHashMap<String, Vec<PropertyConfiguration>>,
    has_domains: bool,
}

impl PropertyConfigIndex {
    /// Index `configs` by [`PropertyConfiguration::effective_predicate`].
    pub fn new(configs: &[PropertyConfiguration]) -> Self {
        let mut by_predicate: FxHashMap<String, Vec<PropertyConfiguration>> =
            FxHashMap::default();
        let mut has_domains = false;
        for config in configs {
            has_domains |= !config.domain.is_empty();
            by_predicate
                .entry(config.effective_predicate().to_string())
                .or_default()
                .push(config.clone());
        }
        Self {
            by_predicate,
            has_domains,
        }
    }

    /// Rules keyed under `predicate`.
    pub fn lookup(&self, predicate: &str) -> &[PropertyConfiguration] {
        self.by_predicate
            .get(predicate)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether no rules are configured at all.
    pub fn is_empty(&self) -> bool {
        self.by_predicate.is_empty()
    }

    /// Whether any rule restricts its domain.
    pub fn has_domains(&self) -> bool {
        self.has_domains
    }
}

/// Open-world match: an empty/absent domain always matches; otherwise the
/// subject's known types must intersect the configured domain.
pub fn domain_matches(domain: &[ElementTypeIri], types: &[ElementTypeIri]) -> bool {
    domain.is_empty() || domain.iter().any(|d| types.contains(d))
}

fn literal_to_localized(value: &str, lang: &Option<String>, datatype: &Option<String>) -> LocalizedString {
    LocalizedString {
        value: value.to_string(),
        language: lang.clone().unwrap_or_default(),
        datatype: datatype.clone(),
    }
}

fn add_property_value(
    properties: &mut HashMap<PropertyTypeIri, Property>,
    key: PropertyTypeIri,
    term: &SparqlTerm,
) {
    let incoming = match term {
        SparqlTerm::Uri { value } => Property::Iri {
            values: vec![ElementIri::new(value.clone())],
        },
        SparqlTerm::Literal {
            value,
            lang,
            datatype,
        } => Property::Literal {
            values: vec![literal_to_localized(value, lang, datatype)],
        },
        // Blank-node property values are handled by the blank codec, not here.
        SparqlTerm::Bnode { .. } => return,
    };
    match properties.get_mut(&key) {
        Some(existing) => existing.merge(&incoming),
        None => {
            properties.insert(key, incoming);
        }
    }
}

/// Build element models from `inst`/`propType`/`propValue` rows.
///
/// The first pass accumulates labels, types, and raw properties per subject,
/// de-duplicating as it goes. The second pass remaps raw predicates to
/// configured logical ids filtered by domain; it only runs when closed-world
/// filtering is requested or any property rule exists. Under open-world
/// mode, unconfigured predicates pass through unchanged; under closed-world
/// mode they are dropped.
pub fn elements_info(
    rows: &[SparqlRow],
    property_index: &PropertyConfigIndex,
    open_world_properties: bool,
) -> HashMap<ElementIri, ElementModel> {
    let mut elements: HashMap<ElementIri, ElementModel> = HashMap::new();
    let mut raw_properties: HashMap<ElementIri, HashMap<PropertyTypeIri, Property>> =
        HashMap::new();

    for row in rows {
        let Some(inst) = row.get("inst").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = ElementIri::new(inst);
        let element = elements
            .entry(id.clone())
            .or_insert_with(|| ElementModel::empty(id.clone()));

        let Some(prop_type) = row.get("propType").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let Some(value) = row.get("propValue") else {
            continue;
        };

        if prop_type == rdf::TYPE {
            if let Some(class_iri) = value.as_iri() {
                element.add_type(ElementTypeIri::new(class_iri));
            }
        } else if prop_type == rdfs::LABEL {
            if let SparqlTerm::Literal {
                value,
                lang,
                datatype,
            } = value
            {
                element.add_label(literal_to_localized(value, lang, datatype));
            }
        } else {
            add_property_value(
                raw_properties.entry(id).or_default(),
                PropertyTypeIri::new(prop_type),
                value,
            );
        }
    }

    let remap = !open_world_properties || !property_index.is_empty();
    for (id, raw) in raw_properties {
        let element = match elements.get_mut(&id) {
            Some(e) => e,
            None => continue,
        };
        if !remap {
            element.properties = raw;
            continue;
        }
        for (raw_key, property) in raw {
            let matching: Vec<&PropertyConfiguration> = property_index
                .lookup(raw_key.as_str())
                .iter()
                .filter(|config| domain_matches(&config.domain, &element.types))
                .collect();
            if matching.is_empty() {
                // Closed world silently drops unconfigured predicates; this
                // is deliberate policy, not an authoring safeguard.
                if open_world_properties {
                    merge_property(&mut element.properties, raw_key, property);
                }
            } else {
                for config in matching {
                    merge_property(&mut element.properties, config.id.clone(), property.clone());
                }
            }
        }
    }

    elements
}

fn merge_property(
    properties: &mut HashMap<PropertyTypeIri, Property>,
    key: PropertyTypeIri,
    incoming: Property,
) {
    match properties.get_mut(&key) {
        Some(existing) => existing.merge(&incoming),
        None => {
            properties.insert(key, incoming);
        }
    }
}

/// Build links from `source`/`type`/`target` rows, de-duplicating by the
/// (type, source, target) triple.
///
/// When several rules map the same raw predicate to several logical link
/// types, one underlying binding yields multiple output links (fan-out).
pub fn links_info(
    rows: &[SparqlRow],
    link_index: &LinkConfigIndex,
    open_world_links: bool,
    types_by_element: &HashMap<ElementIri, Vec<ElementTypeIri>>,
) -> Vec<LinkModel> {
    let mut by_identity: FxHashMap<LinkIdentity, LinkModel> = FxHashMap::default();
    let mut order: Vec<LinkIdentity> = Vec::new();

    for row in rows {
        let (Some(source), Some(raw_type), Some(target)) = (
            row.get("source").and_then(SparqlTerm::as_iri),
            row.get("type").and_then(SparqlTerm::as_iri),
            row.get("target").and_then(SparqlTerm::as_iri),
        ) else {
            continue;
        };
        let source_id = ElementIri::new(source);
        let empty_types = Vec::new();
        let source_types = types_by_element.get(&source_id).unwrap_or(&empty_types);

        let matching: Vec<&LinkConfiguration> = link_index
            .lookup(raw_type)
            .iter()
            .filter(|config| domain_matches(&config.domain, source_types))
            .collect();

        let logical_ids: Vec<LinkTypeIri> = if matching.is_empty() {
            if open_world_links {
                vec![LinkTypeIri::new(raw_type)]
            } else {
                continue;
            }
        } else {
            matching.iter().map(|c| c.id.clone()).collect()
        };

        for link_type_id in logical_ids {
            let link = LinkModel {
                link_type_id,
                source_id: source_id.clone(),
                target_id: ElementIri::new(target),
                properties: link_properties(row),
            };
            let identity = link.identity();
            match by_identity.get_mut(&identity) {
                Some(existing) => {
                    for (key, property) in &link.properties {
                        merge_property(&mut existing.properties, key.clone(), property.clone());
                    }
                }
                None => {
                    by_identity.insert(identity.clone(), link);
                    order.push(identity);
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|identity| by_identity.remove(&identity))
        .collect()
}

fn link_properties(row: &SparqlRow) -> HashMap<PropertyTypeIri, Property> {
    let mut properties = HashMap::new();
    if let (Some(prop_type), Some(value)) = (
        row.get("propType").and_then(SparqlTerm::as_iri),
        row.get("propValue"),
    ) {
        add_property_value(&mut properties, PropertyTypeIri::new(prop_type), value);
    }
    properties
}

struct ClassNode {
    label: Vec<LocalizedString>,
    count: Option<u64>,
    children: Vec<ElementTypeIri>,
}

/// Build the class forest from `class`/`label`/`parent`/`instcount` rows.
///
/// Classes are collected from every binding shape the query produces;
/// labels and counts merge per class id. A parent→children map drives tree
/// construction; any class reachable as a descendant is pruned from the top
/// level, and count aggregation walks each node at most once with a
/// visiting set guarding against cyclic `subClassOf` data.
pub fn class_tree(response: &SelectResponse) -> Vec<ClassModel> {
    let mut nodes: FxHashMap<ElementTypeIri, ClassNode> = FxHashMap::default();
    let mut order: Vec<ElementTypeIri> = Vec::new();

    let ensure_node = |nodes: &mut FxHashMap<ElementTypeIri, ClassNode>,
                       order: &mut Vec<ElementTypeIri>,
                       id: &ElementTypeIri| {
        if !nodes.contains_key(id) {
            nodes.insert(
                id.clone(),
                ClassNode {
                    label: Vec::new(),
                    count: None,
                    children: Vec::new(),
                },
            );
            order.push(id.clone());
        }
    };

    for row in &response.results.bindings {
        let Some(class) = row.get("class").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = ElementTypeIri::new(class);
        ensure_node(&mut nodes, &mut order, &id);

        if let Some(SparqlTerm::Literal {
            value,
            lang,
            datatype,
        }) = row.get("label")
        {
            if let Some(node) = nodes.get_mut(&id) {
                let text = literal_to_localized(value, lang, datatype);
                if !node.label.contains(&text) {
                    node.label.push(text);
                }
            }
        }
        if let Some(count) = row.get("instcount").and_then(SparqlTerm::as_count) {
            if let Some(node) = nodes.get_mut(&id) {
                node.count = Some(node.count.unwrap_or(0).max(count));
            }
        }
        if let Some(parent) = row.get("parent").and_then(SparqlTerm::as_iri) {
            let parent_id = ElementTypeIri::new(parent);
            ensure_node(&mut nodes, &mut order, &parent_id);
            if let Some(parent_node) = nodes.get_mut(&parent_id) {
                if !parent_node.children.contains(&id) && parent_id != id {
                    parent_node.children.push(id.clone());
                }
            }
        }
    }

    // Aggregate counts upward once, cycle-guarded.
    let mut resolved: FxHashMap<ElementTypeIri, Option<u64>> = FxHashMap::default();
    for id in &order {
        let mut visiting = FxHashSet::default();
        resolve_count(id, &nodes, &mut resolved, &mut visiting);
    }

    // Anything that is some node's child leaves the top level.
    let mut child_ids: FxHashSet<ElementTypeIri> = FxHashSet::default();
    for node in nodes.values() {
        for child in &node.children {
            child_ids.insert(child.clone());
        }
    }

    let mut forest = Vec::new();
    for id in &order {
        if child_ids.contains(id) {
            continue;
        }
        let mut on_path = FxHashSet::default();
        forest.push(build_class(id, &nodes, &resolved, &mut on_path));
    }
    forest
}

/// Effective count of `id`: its own explicit count plus the sum of resolved
/// child counts. `None` is "no information" and only coalesces to 0 when a
/// sibling contributes a defined count.
fn resolve_count(
    id: &ElementTypeIri,
    nodes: &FxHashMap<ElementTypeIri, ClassNode>,
    resolved: &mut FxHashMap<ElementTypeIri, Option<u64>>,
    visiting: &mut FxHashSet<ElementTypeIri>,
) -> Option<u64> {
    if let Some(count) = resolved.get(id) {
        return *count;
    }
    if !visiting.insert(id.clone()) {
        return None;
    }
    let node = match nodes.get(id) {
        Some(n) => n,
        None => return None,
    };
    let mut total = node.count;
    for child in &node.children {
        let child_count = resolve_count(child, nodes, resolved, visiting);
        total = combine_counts(total, child_count);
    }
    visiting.remove(id);
    resolved.insert(id.clone(), total);
    total
}

/// `None` + `None` stays unknown; otherwise missing sides coalesce to 0.
pub fn combine_counts(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        _ => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

fn build_class(
    id: &ElementTypeIri,
    nodes: &FxHashMap<ElementTypeIri, ClassNode>,
    resolved: &FxHashMap<ElementTypeIri, Option<u64>>,
    on_path: &mut FxHashSet<ElementTypeIri>,
) -> ClassModel {
    let mut model = ClassModel::empty(id.clone());
    if let Some(node) = nodes.get(id) {
        model.label = node.label.clone();
        model.count = resolved.get(id).copied().flatten();
        if on_path.insert(id.clone()) {
            for child in &node.children {
                if on_path.contains(child) {
                    continue;
                }
                model.children.push(build_class(child, nodes, resolved, on_path));
            }
            on_path.remove(id);
        }
    }
    model
}

/// Build flat class records from `class`/`label`/`instcount` rows.
pub fn class_info(response: &SelectResponse) -> Vec<ClassModel> {
    let mut by_id: FxHashMap<ElementTypeIri, ClassModel> = FxHashMap::default();
    let mut order = Vec::new();
    for row in &response.results.bindings {
        let Some(class) = row.get("class").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = ElementTypeIri::new(class);
        let model = by_id.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            ClassModel::empty(id.clone())
        });
        if let Some(SparqlTerm::Literal {
            value,
            lang,
            datatype,
        }) = row.get("label")
        {
            let text = literal_to_localized(value, lang, datatype);
            if !model.label.contains(&text) {
                model.label.push(text);
            }
        }
        if let Some(count) = row.get("instcount").and_then(SparqlTerm::as_count) {
            model.count = combine_counts(model.count, Some(count));
        }
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

/// Build link-type records from `link`/`label`/`instcount` rows.
pub fn link_types(response: &SelectResponse) -> Vec<LinkTypeModel> {
    let mut by_id: FxHashMap<LinkTypeIri, LinkTypeModel> = FxHashMap::default();
    let mut order = Vec::new();
    for row in &response.results.bindings {
        let Some(link) = row.get("link").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = LinkTypeIri::new(link);
        let model = by_id.entry(id.clone()).or_insert_with(|| {
            order.push(id.clone());
            LinkTypeModel {
                id: id.clone(),
                label: Vec::new(),
                count: None,
            }
        });
        if let Some(SparqlTerm::Literal {
            value,
            lang,
            datatype,
        }) = row.get("label")
        {
            let text = literal_to_localized(value, lang, datatype);
            if !model.label.contains(&text) {
                model.label.push(text);
            }
        }
        if let Some(count) = row.get("instcount").and_then(SparqlTerm::as_count) {
            model.count = combine_counts(model.count, Some(count));
        }
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

/// Build property records from `property`/`label` rows.
pub fn property_info(response: &SelectResponse) -> HashMap<PropertyTypeIri, PropertyModel> {
    let mut result: HashMap<PropertyTypeIri, PropertyModel> = HashMap::new();
    for row in &response.results.bindings {
        let Some(property) = row.get("property").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = PropertyTypeIri::new(property);
        let model = result.entry(id.clone()).or_insert_with(|| PropertyModel {
            id: id.clone(),
            label: Vec::new(),
        });
        if let Some(SparqlTerm::Literal {
            value,
            lang,
            datatype,
        }) = row.get("label")
        {
            let text = literal_to_localized(value, lang, datatype);
            if !model.label.contains(&text) {
                model.label.push(text);
            }
        }
    }
    result
}

/// Candidate link-type ids from `link` rows.
pub fn link_type_ids(response: &SelectResponse) -> Vec<LinkTypeIri> {
    let mut seen = FxHashSet::default();
    let mut ids = Vec::new();
    for row in &response.results.bindings {
        if let Some(link) = row.get("link").and_then(SparqlTerm::as_iri) {
            let id = LinkTypeIri::new(link);
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

/// One incident-statistics row (`link`/`inCount`/`outCount`) per query.
pub fn link_count(response: &SelectResponse) -> Option<LinkCount> {
    let row = response.results.bindings.first()?;
    let link = row.get("link").and_then(SparqlTerm::as_iri)?;
    Some(LinkCount {
        id: LinkTypeIri::new(link),
        in_count: row.get("inCount").and_then(SparqlTerm::as_count).unwrap_or(0),
        out_count: row.get("outCount").and_then(SparqlTerm::as_count).unwrap_or(0),
    })
}

/// Build minimal element models from filter rows
/// (`inst`/`class`/`label`/`extractedLabel`).
pub fn filtered_elements(
    response: &SelectResponse,
    use_extracted_label: bool,
) -> HashMap<ElementIri, ElementModel> {
    let mut elements: HashMap<ElementIri, ElementModel> = HashMap::new();
    for row in &response.results.bindings {
        let Some(inst) = row.get("inst").and_then(SparqlTerm::as_iri) else {
            continue;
        };
        let id = ElementIri::new(inst);
        let element = elements
            .entry(id.clone())
            .or_insert_with(|| ElementModel::empty(id.clone()));
        if let Some(class) = row.get("class").and_then(SparqlTerm::as_iri) {
            element.add_type(ElementTypeIri::new(class));
        }
        let label_var = if use_extracted_label { "extractedLabel" } else { "label" };
        if let Some(SparqlTerm::Literal {
            value,
            lang,
            datatype,
        }) = row.get(label_var).or_else(|| row.get("label"))
        {
            element.add_label(literal_to_localized(value, lang, datatype));
        }
    }
    elements
}
