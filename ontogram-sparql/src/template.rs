//! Query text templating and path-union construction
//!
//! Queries are assembled from configuration-supplied templates with
//! `${name}` placeholders. Resolution is permissive by design: templates mix
//! optional fragments, so missing keys and surplus keys are never errors,
//! and an empty-string value leaves its token untouched so optional
//! fragments can vanish cleanly.

use crate::settings::{LinkConfiguration, PropertyConfiguration};
use ontogram_core::{LinkDirection, LinkTypeIri};
use std::collections::HashMap;

/// Expand `${name}` tokens in `template` from `substitutions`.
///
/// - every token whose key maps to a non-empty value is replaced everywhere
/// - tokens absent from the map, or mapped to an empty string, are left as-is
/// - surplus keys not present in the template are ignored
pub fn resolve_template(template: &str, substitutions: &HashMap<&str, String>) -> String {
    let mut resolved = template.to_string();
    for (name, value) in substitutions {
        if value.is_empty() {
            continue;
        }
        let token = format!("${{{name}}}");
        if resolved.contains(&token) {
            resolved = resolved.replace(&token, value);
        }
    }
    resolved
}

/// Format an IRI for inclusion in query text.
pub fn enclose_iri(iri: &str) -> String {
    format!("<{iri}>")
}

/// Format a list of IRIs as a space-separated run of `<iri>` tokens,
/// suitable for `VALUES` blocks.
pub fn format_iri_list<I, S>(iris: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    iris.into_iter()
        .map(|iri| enclose_iri(iri.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substitute the endpoint tokens of a link path pattern.
pub(crate) fn instantiate_link_path(path: &str, source: &str, target: &str) -> String {
    path.replace("?source", source).replace("?target", target)
}

/// Substitute the endpoint tokens of a property path pattern.
fn instantiate_property_path(path: &str, inst: &str, value: &str) -> String {
    path.replace("?value", value).replace("?inst", inst)
}

/// One union clause binding the configured logical id to `bind_var`.
fn union_clause(pattern: &str, id: &str, bind_var: &str) -> String {
    format!("{{ {pattern} BIND({} AS {bind_var}) }}", enclose_iri(id))
}

/// Build a union over link configurations matching `?source`/`?target`
/// patterns, binding the logical link id to `type_var`.
///
/// A final fallback clause matching an arbitrary predicate is appended iff
/// at least one configuration is direct-predicate or `open_world` is set:
/// with no fallback, links outside the configuration are silently dropped.
pub fn link_union(configs: &[LinkConfiguration], type_var: &str, open_world: bool) -> String {
    let mut clauses = Vec::new();
    let mut any_direct = false;
    for config in configs {
        if config.is_direct() {
            any_direct = true;
            let pattern = format!("?source {} ?target .", enclose_iri(&config.path));
            clauses.push(union_clause(&pattern, config.id.as_str(), type_var));
        } else {
            let pattern = instantiate_link_path(&config.path, "?source", "?target");
            clauses.push(union_clause(&pattern, config.id.as_str(), type_var));
        }
    }
    if any_direct || open_world {
        clauses.push(format!("{{ ?source {type_var} ?target . }}"));
    }
    clauses.join("\nUNION\n")
}

/// Build a union over property configurations matching `?inst`/`?value`
/// patterns, binding the logical property id to `prop_var` and the value to
/// `value_var`.
pub fn property_union(
    configs: &[PropertyConfiguration],
    prop_var: &str,
    value_var: &str,
    open_world: bool,
) -> String {
    let mut clauses = Vec::new();
    let mut any_direct = false;
    for config in configs {
        if config.is_direct() {
            any_direct = true;
            let pattern = format!("?inst {} {value_var} .", enclose_iri(&config.path));
            clauses.push(union_clause(&pattern, config.id.as_str(), prop_var));
        } else {
            let pattern = instantiate_property_path(&config.path, "?inst", value_var);
            clauses.push(union_clause(&pattern, config.id.as_str(), prop_var));
        }
    }
    if any_direct || open_world {
        clauses.push(format!("{{ ?inst {prop_var} {value_var} . }}"));
    }
    clauses.join("\nUNION\n")
}

/// Build the union of link patterns incident to a fixed reference element,
/// binding the link id to `?link` and the far endpoint to `?inst`.
///
/// `link_id`, when given, restricts the union to configurations with that
/// id; the fallback clause then uses the id itself as the predicate.
/// `direction` keeps only the forward (`Out`) or backward (`In`) branches;
/// `None` emits both.
pub fn ref_element_union(
    configs: &[LinkConfiguration],
    ref_element: &str,
    link_id: Option<&LinkTypeIri>,
    direction: Option<LinkDirection>,
    open_world: bool,
) -> String {
    let ref_iri = enclose_iri(ref_element);
    let mut clauses = Vec::new();
    let mut any_direct = false;

    let selected: Vec<&LinkConfiguration> = configs
        .iter()
        .filter(|c| link_id.map_or(true, |id| &c.id == id))
        .collect();

    for config in &selected {
        if config.is_direct() {
            any_direct = true;
        }
        if direction != Some(LinkDirection::In) {
            let pattern = if config.is_direct() {
                format!("{ref_iri} {} ?inst .", enclose_iri(&config.path))
            } else {
                instantiate_link_path(&config.path, &ref_iri, "?inst")
            };
            clauses.push(union_clause(&pattern, config.id.as_str(), "?link"));
        }
        if direction != Some(LinkDirection::Out) {
            let pattern = if config.is_direct() {
                format!("?inst {} {ref_iri} .", enclose_iri(&config.path))
            } else {
                instantiate_link_path(&config.path, "?inst", &ref_iri)
            };
            clauses.push(union_clause(&pattern, config.id.as_str(), "?link"));
        }
    }

    // Arbitrary-predicate fallback: configured-direct or open-world only.
    if any_direct || open_world {
        match link_id {
            Some(id) => {
                let pred = enclose_iri(id.as_str());
                if direction != Some(LinkDirection::In) {
                    clauses.push(union_clause(
                        &format!("{ref_iri} {pred} ?inst ."),
                        id.as_str(),
                        "?link",
                    ));
                }
                if direction != Some(LinkDirection::Out) {
                    clauses.push(union_clause(
                        &format!("?inst {pred} {ref_iri} ."),
                        id.as_str(),
                        "?link",
                    ));
                }
            }
            None => {
                if direction != Some(LinkDirection::In) {
                    clauses.push(format!("{{ {ref_iri} ?link ?inst . }}"));
                }
                if direction != Some(LinkDirection::Out) {
                    clauses.push(format!("{{ ?inst ?link {ref_iri} . }}"));
                }
            }
        }
    }

    clauses.join("\nUNION\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn replaces_all_occurrences() {
        let out = resolve_template(
            "SELECT ?c WHERE { ?c a ${class} . ?x a ${class} }",
            &subs(&[("class", "<http://example.org/Person>")]),
        );
        assert_eq!(
            out,
            "SELECT ?c WHERE { ?c a <http://example.org/Person> . ?x a <http://example.org/Person> }"
        );
    }

    #[test]
    fn missing_keys_leave_token_untouched() {
        let out = resolve_template("WHERE { ${pattern} }", &subs(&[("other", "x")]));
        assert_eq!(out, "WHERE { ${pattern} }");
    }

    #[test]
    fn empty_value_suppresses_substitution() {
        let out = resolve_template("WHERE { ${restriction} }", &subs(&[("restriction", "")]));
        assert_eq!(out, "WHERE { ${restriction} }");
    }

    #[test]
    fn surplus_keys_are_ignored() {
        let out = resolve_template("ASK {}", &subs(&[("unused", "value")]));
        assert_eq!(out, "ASK {}");
    }

    #[test]
    fn link_union_direct_config_gets_fallback() {
        let configs = vec![LinkConfiguration::direct(
            "http://example.org/knows",
            "http://example.org/knows",
        )];
        let union = link_union(&configs, "?type", false);
        assert!(union.contains("?source <http://example.org/knows> ?target"));
        assert!(union.contains("?source ?type ?target"), "fallback clause expected");
    }

    #[test]
    fn link_union_path_only_closed_world_has_no_fallback() {
        let configs = vec![LinkConfiguration::path(
            "http://example.org/worksWith",
            "?source <http://example.org/member> ?g . ?g <http://example.org/member> ?target .",
        )];
        let union = link_union(&configs, "?type", false);
        assert!(!union.contains("?source ?type ?target ."));
        assert!(union.contains("<http://example.org/member>"));
    }

    #[test]
    fn ref_element_union_unconfigured_link_has_both_branches() {
        // A link id with no restricting configuration must still produce
        // both the forward and the backward branch.
        let union = ref_element_union(
            &[],
            "http://example.org/alice",
            Some(&"http://example.org/knows".into()),
            None,
            true,
        );
        assert!(union.contains("<http://example.org/alice> <http://example.org/knows> ?inst"));
        assert!(union.contains("?inst <http://example.org/knows> <http://example.org/alice>"));
    }

    #[test]
    fn ref_element_union_respects_direction() {
        let union = ref_element_union(
            &[],
            "http://example.org/alice",
            None,
            Some(LinkDirection::Out),
            true,
        );
        assert!(union.contains("<http://example.org/alice> ?link ?inst"));
        assert!(!union.contains("?inst ?link <http://example.org/alice>"));
    }
}
