//! Pure merge functions over per-source results
//!
//! All functions here are order-insensitive where the data allows it:
//! unioned sets do not depend on source order, contested tree placements
//! resolve by a deterministic rule, and re-merging an already merged result
//! changes nothing. Label lists keep first-seen order, so they are the one
//! place source order remains visible.

use ontogram_core::{
    ClassModel, ElementIri, ElementModel, ElementTypeIri, LinkCount, LinkIdentity, LinkModel,
    LinkTypeIri, LinkTypeModel, LocalizedString, Property, PropertyModel, PropertyTypeIri,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Synthetic property recording which sources contributed to a merged
/// element.
pub const SOURCE_PROPERTY: &str = "urn:ontogram:source";

/// `None` + `None` stays unknown; otherwise missing sides coalesce to 0.
fn combine_counts(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (None, None) => None,
        _ => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

fn merge_labels(into: &mut Vec<LocalizedString>, from: &[LocalizedString]) {
    for label in from {
        if !into.contains(label) {
            into.push(label.clone());
        }
    }
}

fn merge_properties(
    into: &mut HashMap<PropertyTypeIri, Property>,
    from: &HashMap<PropertyTypeIri, Property>,
) {
    for (key, property) in from {
        match into.get_mut(key) {
            Some(existing) => existing.merge(property),
            None => {
                into.insert(key.clone(), property.clone());
            }
        }
    }
}

fn tag_source(element: &mut ElementModel, source: &str) {
    if !element.sources.iter().any(|s| s == source) {
        element.sources.push(source.to_string());
    }
    let key = PropertyTypeIri::new(SOURCE_PROPERTY);
    let value = Property::Literal {
        values: vec![LocalizedString::plain(source)],
    };
    match element.properties.get_mut(&key) {
        Some(existing) => existing.merge(&value),
        None => {
            element.properties.insert(key, value);
        }
    }
}

/// Merge per-source element maps into one, unioning types, labels, and
/// properties, keeping the first image found, and tagging provenance both
/// in `sources` and under [`SOURCE_PROPERTY`].
pub fn merge_elements(
    results: Vec<(String, HashMap<ElementIri, ElementModel>)>,
) -> HashMap<ElementIri, ElementModel> {
    let mut merged: HashMap<ElementIri, ElementModel> = HashMap::new();
    for (source, elements) in results {
        for (id, element) in elements {
            match merged.get_mut(&id) {
                Some(existing) => {
                    for t in &element.types {
                        existing.add_type(t.clone());
                    }
                    merge_labels(&mut existing.label, &element.label);
                    if existing.image.is_none() {
                        existing.image = element.image.clone();
                    }
                    merge_properties(&mut existing.properties, &element.properties);
                    tag_source(existing, &source);
                }
                None => {
                    let mut element = element;
                    tag_source(&mut element, &source);
                    merged.insert(id, element);
                }
            }
        }
    }
    merged
}

/// Concatenate per-source link lists, de-duplicating by the
/// (type, source, target) identity and merging incidental properties.
pub fn merge_links(results: Vec<Vec<LinkModel>>) -> Vec<LinkModel> {
    let mut by_identity: HashMap<LinkIdentity, usize> = HashMap::new();
    let mut merged: Vec<LinkModel> = Vec::new();
    for links in results {
        for link in links {
            match by_identity.get(&link.identity()) {
                Some(&i) => merge_properties(&mut merged[i].properties, &link.properties),
                None => {
                    by_identity.insert(link.identity(), merged.len());
                    merged.push(link);
                }
            }
        }
    }
    merged
}

/// Merge per-source link-type lists by id, unioning labels and combining
/// counts.
pub fn merge_link_types(results: Vec<Vec<LinkTypeModel>>) -> Vec<LinkTypeModel> {
    let mut by_id: HashMap<LinkTypeIri, usize> = HashMap::new();
    let mut merged: Vec<LinkTypeModel> = Vec::new();
    for types in results {
        for link_type in types {
            match by_id.get(&link_type.id) {
                Some(&i) => {
                    merge_labels(&mut merged[i].label, &link_type.label);
                    merged[i].count = combine_counts(merged[i].count, link_type.count);
                }
                None => {
                    by_id.insert(link_type.id.clone(), merged.len());
                    merged.push(link_type);
                }
            }
        }
    }
    merged
}

/// Merge flat class lists (from `class_info`) by id.
pub fn merge_class_info(results: Vec<Vec<ClassModel>>) -> Vec<ClassModel> {
    let mut by_id: HashMap<ElementTypeIri, usize> = HashMap::new();
    let mut merged: Vec<ClassModel> = Vec::new();
    for classes in results {
        for class in classes {
            match by_id.get(&class.id) {
                Some(&i) => {
                    merge_labels(&mut merged[i].label, &class.label);
                    merged[i].count = combine_counts(merged[i].count, class.count);
                }
                None => {
                    by_id.insert(class.id.clone(), merged.len());
                    merged.push(class);
                }
            }
        }
    }
    merged
}

/// Merge per-source property maps by id, unioning labels.
pub fn merge_property_info(
    results: Vec<HashMap<PropertyTypeIri, PropertyModel>>,
) -> HashMap<PropertyTypeIri, PropertyModel> {
    let mut merged: HashMap<PropertyTypeIri, PropertyModel> = HashMap::new();
    for properties in results {
        for (id, property) in properties {
            match merged.get_mut(&id) {
                Some(existing) => merge_labels(&mut existing.label, &property.label),
                None => {
                    merged.insert(id, property);
                }
            }
        }
    }
    merged
}

/// Merge incident-link statistics by link type, summing both directions.
pub fn merge_link_counts(results: Vec<Vec<LinkCount>>) -> Vec<LinkCount> {
    let mut by_id: HashMap<LinkTypeIri, usize> = HashMap::new();
    let mut merged: Vec<LinkCount> = Vec::new();
    for counts in results {
        for count in counts {
            match by_id.get(&count.id) {
                Some(&i) => {
                    merged[i].in_count += count.in_count;
                    merged[i].out_count += count.out_count;
                }
                None => {
                    by_id.insert(count.id.clone(), merged.len());
                    merged.push(count);
                }
            }
        }
    }
    merged
}

struct FlatClass {
    label: Vec<LocalizedString>,
    count: Option<u64>,
}

/// Merge per-source class forests into one.
///
/// Forests are flattened to nodes plus parent candidates, then rebuilt.
/// Invariants of the result:
/// - each class id appears exactly once
/// - a contested child (different parents across sources) goes under the
///   lexicographically smallest candidate parent, which keeps the merge
///   independent of source order
/// - a node placed under a parent never also appears at the top level
pub fn merge_class_tree(results: Vec<Vec<ClassModel>>) -> Vec<ClassModel> {
    let mut nodes: HashMap<ElementTypeIri, FlatClass> = HashMap::new();
    let mut order: Vec<ElementTypeIri> = Vec::new();
    let mut parent_candidates: HashMap<ElementTypeIri, BTreeSet<ElementTypeIri>> = HashMap::new();

    fn flatten(
        class: &ClassModel,
        parent: Option<&ElementTypeIri>,
        nodes: &mut HashMap<ElementTypeIri, FlatClass>,
        order: &mut Vec<ElementTypeIri>,
        parent_candidates: &mut HashMap<ElementTypeIri, BTreeSet<ElementTypeIri>>,
    ) {
        match nodes.get_mut(&class.id) {
            Some(existing) => {
                merge_labels(&mut existing.label, &class.label);
                existing.count = combine_counts(existing.count, class.count);
            }
            None => {
                nodes.insert(
                    class.id.clone(),
                    FlatClass {
                        label: class.label.clone(),
                        count: class.count,
                    },
                );
                order.push(class.id.clone());
            }
        }
        if let Some(parent) = parent {
            if parent != &class.id {
                parent_candidates
                    .entry(class.id.clone())
                    .or_default()
                    .insert(parent.clone());
            }
        }
        for child in &class.children {
            flatten(child, Some(&class.id), nodes, order, parent_candidates);
        }
    }

    for forest in &results {
        for class in forest {
            flatten(class, None, &mut nodes, &mut order, &mut parent_candidates);
        }
    }

    // Pick one parent per contested child; BTreeSet iteration gives the
    // smallest id first.
    let chosen_parent: HashMap<ElementTypeIri, ElementTypeIri> = parent_candidates
        .into_iter()
        .filter_map(|(child, parents)| {
            parents.into_iter().next().map(|parent| (child, parent))
        })
        .collect();

    // Sibling and root order is sorted by id so the merged forest does not
    // depend on which source was consulted first.
    let mut children_of: HashMap<ElementTypeIri, Vec<ElementTypeIri>> = HashMap::new();
    for id in &order {
        if let Some(parent) = chosen_parent.get(id) {
            children_of.entry(parent.clone()).or_default().push(id.clone());
        }
    }
    for children in children_of.values_mut() {
        children.sort();
    }

    fn build(
        id: &ElementTypeIri,
        nodes: &HashMap<ElementTypeIri, FlatClass>,
        children_of: &HashMap<ElementTypeIri, Vec<ElementTypeIri>>,
        on_path: &mut HashSet<ElementTypeIri>,
    ) -> ClassModel {
        let mut model = ClassModel::empty(id.clone());
        if let Some(node) = nodes.get(id) {
            model.label = node.label.clone();
            model.count = node.count;
        }
        if on_path.insert(id.clone()) {
            if let Some(children) = children_of.get(id) {
                // Counts arrive already aggregated per source; only the
                // per-node sums matter here, never re-aggregation.
                for child in children {
                    if on_path.contains(child) {
                        continue;
                    }
                    model.children.push(build(child, nodes, children_of, on_path));
                }
            }
            on_path.remove(id);
        }
        model
    }

    let mut roots: Vec<&ElementTypeIri> = order
        .iter()
        .filter(|id| !chosen_parent.contains_key(*id))
        .collect();
    roots.sort();

    let mut forest = Vec::new();
    for id in roots {
        let mut on_path = HashSet::new();
        forest.push(build(id, &nodes, &children_of, &mut on_path));
    }
    forest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: &str, count: Option<u64>, children: Vec<ClassModel>) -> ClassModel {
        ClassModel {
            id: ElementTypeIri::new(id),
            label: Vec::new(),
            count,
            children,
        }
    }

    #[test]
    fn contested_child_goes_under_smallest_parent() {
        let forest_a = vec![class(
            "http://example.org/A",
            None,
            vec![class("http://example.org/C", None, vec![])],
        )];
        let forest_b = vec![class(
            "http://example.org/B",
            None,
            vec![class("http://example.org/C", None, vec![])],
        )];

        let forward = merge_class_tree(vec![forest_a.clone(), forest_b.clone()]);
        let backward = merge_class_tree(vec![forest_b, forest_a]);
        assert_eq!(forward, backward, "merge must not depend on source order");

        let a = forward
            .iter()
            .find(|c| c.id.as_str() == "http://example.org/A")
            .unwrap();
        assert_eq!(a.children.len(), 1, "C belongs under A, the smaller id");
        let b = forward
            .iter()
            .find(|c| c.id.as_str() == "http://example.org/B")
            .unwrap();
        assert!(b.children.is_empty());
    }

    #[test]
    fn class_tree_merge_is_idempotent() {
        let forest = vec![class(
            "http://example.org/A",
            Some(2),
            vec![class("http://example.org/B", Some(3), vec![])],
        )];
        let once = merge_class_tree(vec![forest]);
        let twice = merge_class_tree(vec![once.clone()]);
        assert_eq!(once, twice, "re-merging a merged forest changes nothing");
    }

    #[test]
    fn unknown_counts_survive_merging() {
        let a = vec![class("http://example.org/A", None, vec![])];
        let b = vec![class("http://example.org/A", None, vec![])];
        let merged = merge_class_info(vec![a, b]);
        assert_eq!(merged[0].count, None);
    }

    #[test]
    fn link_merge_deduplicates_across_sources() {
        let link = LinkModel {
            link_type_id: LinkTypeIri::new("http://example.org/knows"),
            source_id: ElementIri::new("http://example.org/alice"),
            target_id: ElementIri::new("http://example.org/bob"),
            properties: HashMap::new(),
        };
        let merged = merge_links(vec![vec![link.clone()], vec![link]]);
        assert_eq!(merged.len(), 1);
    }
}
