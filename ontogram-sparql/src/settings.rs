//! Provider settings: endpoint description, query templates, and the
//! declarative link/property configuration rules
//!
//! Settings are immutable, explicitly constructed values passed at provider
//! construction time. They are never mutated after creation and never shared
//! as implicit ambient state; presets return fresh values.

use ontogram_core::{ElementTypeIri, LinkTypeIri, PropertyTypeIri};
use serde::{Deserialize, Serialize};

/// A declarative link rule.
///
/// `path` is either a direct predicate IRI (no variables) or a path pattern
/// containing `?source`/`?target` placeholders. Which of the two it is gets
/// decided structurally, not by a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfiguration {
    /// Logical link type id surfaced to the diagram
    pub id: LinkTypeIri,
    /// Direct predicate IRI or `?source`/`?target` path pattern
    pub path: String,
    /// Subject types this rule applies to; empty means any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<ElementTypeIri>,
}

impl LinkConfiguration {
    /// A rule mapping a direct predicate to a logical link id.
    pub fn direct(id: impl Into<LinkTypeIri>, predicate: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: predicate.into(),
            domain: Vec::new(),
        }
    }

    /// A rule matching a `?source`/`?target` path pattern.
    pub fn path(id: impl Into<LinkTypeIri>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: pattern.into(),
            domain: Vec::new(),
        }
    }

    /// Restrict the rule to the given subject types.
    pub fn with_domain<I, S>(mut self, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ElementTypeIri>,
    {
        self.domain = domain.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `path` is a direct predicate IRI rather than a path pattern.
    pub fn is_direct(&self) -> bool {
        !self.path.contains("?source") && !self.path.contains("?target")
    }

    /// The raw predicate this rule is keyed under: the path itself when
    /// direct, the logical id otherwise.
    pub fn effective_predicate(&self) -> &str {
        if self.is_direct() {
            &self.path
        } else {
            self.id.as_str()
        }
    }
}

/// A declarative property rule; `?inst`/`?value` play the role that
/// `?source`/`?target` play for links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfiguration {
    /// Logical property type id surfaced to the diagram
    pub id: PropertyTypeIri,
    /// Direct predicate IRI or `?inst`/`?value` path pattern
    pub path: String,
    /// Subject types this rule applies to; empty means any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<ElementTypeIri>,
}

impl PropertyConfiguration {
    /// A rule mapping a direct predicate to a logical property id.
    pub fn direct(id: impl Into<PropertyTypeIri>, predicate: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: predicate.into(),
            domain: Vec::new(),
        }
    }

    /// A rule matching an `?inst`/`?value` path pattern.
    pub fn path(id: impl Into<PropertyTypeIri>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: pattern.into(),
            domain: Vec::new(),
        }
    }

    /// Restrict the rule to the given subject types.
    pub fn with_domain<I, S>(mut self, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ElementTypeIri>,
    {
        self.domain = domain.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `path` is a direct predicate IRI rather than a path pattern.
    pub fn is_direct(&self) -> bool {
        !self.path.contains("?inst") && !self.path.contains("?value")
    }

    /// The raw predicate this rule is keyed under.
    pub fn effective_predicate(&self) -> &str {
        if self.is_direct() {
            &self.path
        } else {
            self.id.as_str()
        }
    }
}

/// Full-text search fragment set.
///
/// `query_pattern` must bind `?inst` and `?score` and may use the `${text}`
/// token; `prefix` is prepended to the query prefixes when the fragment is
/// used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextSearchSettings {
    /// Extra prefix declarations required by the pattern
    pub prefix: String,
    /// Pattern binding `?inst` and `?score` from `${text}`
    pub query_pattern: String,
    /// Whether the pattern binds `?extractedLabel` that should be used
    /// as the element label
    #[serde(default)]
    pub extract_label: bool,
}

/// All templates and rules describing one SPARQL endpoint dialect.
///
/// Templates use `${name}` tokens resolved by
/// [`crate::template::resolve_template`]; see each preset for the token
/// vocabulary of every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparqlDataProviderSettings {
    /// `PREFIX` block prepended to every query
    pub default_prefixes: String,
    /// Label predicate (or path) for schema entities: classes, link types,
    /// property types
    pub schema_label_property: String,
    /// Label predicate (or path) for data entities
    pub data_label_property: String,
    /// Full-text search fragments
    pub full_text_search: FullTextSearchSettings,

    /// Class forest query; vars: `?class ?label ?parent ?instcount`
    pub class_tree_query: String,
    /// Class lookup by ids; vars: `?class ?label ?instcount`
    pub class_info_query: String,
    /// All link types; vars: `?link ?label ?instcount`
    pub link_types_query: String,
    /// Link-type lookup by ids; vars: `?link ?label ?instcount`
    pub link_types_info_query: String,
    /// Candidate incident link types of one element; vars: `?link`
    pub link_types_of_query: String,
    /// Per-type incident statistics; vars: `?link ?inCount ?outCount`
    pub link_types_statistics_query: String,
    /// Element info as a graph (CONSTRUCT) query
    pub element_info_query: String,
    /// Links among elements; vars: `?source ?type ?target`
    /// and optionally `?propType ?propValue`
    pub links_info_query: String,
    /// Batched type lookup; vars: `?inst ?class`
    pub element_types_query: String,
    /// Property-type lookup by ids; vars: `?property ?label`
    pub property_info_query: String,
    /// Image lookup pattern; vars: `?inst ?image`, token `${ids}` and
    /// `${imageProps}`
    pub image_query_pattern: String,
    /// Type-restriction pattern for filter queries (`${elementTypeIri}`)
    pub filter_type_pattern: String,
    /// Pattern decorating found `?inst` rows with `?class` and `?label`
    pub filter_element_info_pattern: String,
    /// Extra restriction appended to every filter query; may be empty
    pub filter_additional_restriction: String,

    /// Declarative link rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_configurations: Vec<LinkConfiguration>,
    /// Surface links not covered by `link_configurations`.
    /// `None` derives the open-world default: true iff no rules exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_links: Option<bool>,
    /// Declarative property rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_configurations: Vec<PropertyConfiguration>,
    /// Surface properties not covered by `property_configurations`.
    /// `None` derives the open-world default: true iff no rules exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_properties: Option<bool>,
}

impl Default for SparqlDataProviderSettings {
    fn default() -> Self {
        Self::owl_stats()
    }
}

impl SparqlDataProviderSettings {
    /// Generic RDFS/OWL preset with instance-count statistics, suitable for
    /// most stores with standard vocabulary usage.
    pub fn owl_stats() -> Self {
        Self {
            default_prefixes: "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
PREFIX owl: <http://www.w3.org/2002/07/owl#>\n\
PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n"
                .to_string(),
            schema_label_property: "rdfs:label".to_string(),
            data_label_property: "rdfs:label".to_string(),
            full_text_search: FullTextSearchSettings {
                prefix: String::new(),
                query_pattern: "\
?inst ${dataLabelProperty} ?searchLabel .\n\
FILTER REGEX(STR(?searchLabel), \"${text}\", \"i\")\n\
BIND(0 AS ?score)\n"
                    .to_string(),
                extract_label: false,
            },
            class_tree_query: "\
SELECT ?class ?label ?parent ?instcount WHERE {\n\
  {\n\
    SELECT ?class (COUNT(?inst) AS ?instcount) WHERE {\n\
      { ?class a rdfs:Class } UNION { ?class a owl:Class } UNION { ?inst a ?class }\n\
    } GROUP BY ?class\n\
  }\n\
  OPTIONAL { ?class ${schemaLabelProperty} ?label }\n\
  OPTIONAL { ?class rdfs:subClassOf ?parent }\n\
}\n"
            .to_string(),
            class_info_query: "\
SELECT ?class ?label ?instcount WHERE {\n\
  VALUES ?class { ${ids} }\n\
  OPTIONAL { ?class ${schemaLabelProperty} ?label }\n\
}\n"
            .to_string(),
            link_types_query: "\
SELECT ?link ?label ?instcount WHERE {\n\
  { ?link a rdf:Property } UNION { ?link a owl:ObjectProperty }\n\
  OPTIONAL { ?link ${schemaLabelProperty} ?label }\n\
}\n"
            .to_string(),
            link_types_info_query: "\
SELECT ?link ?label ?instcount WHERE {\n\
  VALUES ?link { ${ids} }\n\
  OPTIONAL { ?link ${schemaLabelProperty} ?label }\n\
}\n"
            .to_string(),
            link_types_of_query: "\
SELECT DISTINCT ?link WHERE {\n\
${linkUnion}\n\
}\n"
            .to_string(),
            link_types_statistics_query: "\
SELECT ?link (COUNT(DISTINCT ?outObject) AS ?outCount) (COUNT(DISTINCT ?inObject) AS ?inCount)\n\
WHERE {\n\
  BIND(${linkId} AS ?link)\n\
  { ${outPattern} } UNION { ${inPattern} }\n\
} GROUP BY ?link\n"
                .to_string(),
            element_info_query: "\
CONSTRUCT {\n\
  ?inst rdf:type ?class .\n\
  ?inst rdfs:label ?label .\n\
  ?inst ?propType ?propValue .\n\
} WHERE {\n\
  VALUES ?inst { ${ids} }\n\
  OPTIONAL { ?inst a ?class }\n\
  OPTIONAL { ?inst ${dataLabelProperty} ?label }\n\
  OPTIONAL {\n\
${propertyPatterns}\n\
    FILTER (isLiteral(?propValue) || isIRI(?propValue))\n\
  }\n\
}\n"
            .to_string(),
            links_info_query: "\
SELECT ?source ?type ?target WHERE {\n\
${linkPatterns}\n\
  VALUES ?source { ${ids} }\n\
  VALUES ?target { ${ids} }\n\
  ${linkTypeRestriction}\n\
}\n"
            .to_string(),
            element_types_query: "\
SELECT ?inst ?class WHERE {\n\
  VALUES ?inst { ${ids} }\n\
  ?inst a ?class .\n\
}\n"
            .to_string(),
            property_info_query: "\
SELECT ?property ?label WHERE {\n\
  VALUES ?property { ${ids} }\n\
  OPTIONAL { ?property ${schemaLabelProperty} ?label }\n\
}\n"
            .to_string(),
            image_query_pattern: "\
SELECT ?inst ?image WHERE {\n\
  VALUES ?inst { ${ids} }\n\
  VALUES ?imageProp { ${imageProps} }\n\
  ?inst ?imageProp ?image .\n\
}\n"
            .to_string(),
            filter_type_pattern: "?inst a ${elementTypeIri} . BIND(0 AS ?score)\n".to_string(),
            filter_element_info_pattern: "\
OPTIONAL { ?inst a ?foundClass }\n\
BIND(COALESCE(?foundClass, owl:Thing) AS ?class)\n\
OPTIONAL { ?inst ${dataLabelProperty} ?label }\n"
                .to_string(),
            filter_additional_restriction: String::new(),
            link_configurations: Vec::new(),
            open_world_links: None,
            property_configurations: Vec::new(),
            open_world_properties: None,
        }
    }

    /// Wikidata-flavoured preset: truthy-statement predicates, Blazegraph
    /// label service for schema labels, and the Blazegraph full-text index
    /// for search.
    pub fn wikidata() -> Self {
        let mut settings = Self::owl_stats();
        settings.default_prefixes = "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
PREFIX owl: <http://www.w3.org/2002/07/owl#>\n\
PREFIX wd: <http://www.wikidata.org/entity/>\n\
PREFIX wdt: <http://www.wikidata.org/prop/direct/>\n\
PREFIX bds: <http://www.bigdata.com/rdf/search#>\n"
            .to_string();
        settings.schema_label_property = "rdfs:label".to_string();
        settings.data_label_property = "rdfs:label".to_string();
        settings.full_text_search = FullTextSearchSettings {
            prefix: "PREFIX bds: <http://www.bigdata.com/rdf/search#>\n".to_string(),
            query_pattern: "\
?searchLabel bds:search \"${text}*\" .\n\
?searchLabel bds:relevance ?score .\n\
?inst ${dataLabelProperty} ?searchLabel .\n"
                .to_string(),
            extract_label: true,
        };
        settings.class_tree_query = "\
SELECT ?class ?label ?parent ?instcount WHERE {\n\
  { ?class wdt:P279 ?parent } UNION { ?parent wdt:P279 ?class }\n\
  OPTIONAL { ?class ${schemaLabelProperty} ?label . FILTER(LANG(?label) = \"en\") }\n\
}\n"
        .to_string();
        settings.filter_type_pattern =
            "?inst wdt:P31 ${elementTypeIri} . BIND(0 AS ?score)\n".to_string();
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_vs_path_is_structural() {
        let direct = LinkConfiguration::direct("http://example.org/knows", "http://example.org/knows");
        assert!(direct.is_direct());
        assert_eq!(direct.effective_predicate(), "http://example.org/knows");

        let pathy = LinkConfiguration::path(
            "http://example.org/worksWith",
            "?source <http://example.org/member>/<http://example.org/memberOf> ?target .",
        );
        assert!(!pathy.is_direct());
        assert_eq!(pathy.effective_predicate(), "http://example.org/worksWith");
    }

    #[test]
    fn property_rule_structural_detection() {
        let direct = PropertyConfiguration::direct("http://example.org/name", "http://example.org/name");
        assert!(direct.is_direct());
        let pathy = PropertyConfiguration::path(
            "http://example.org/fullName",
            "?inst <http://example.org/person>/<http://example.org/name> ?value .",
        );
        assert!(!pathy.is_direct());
    }

    #[test]
    fn presets_are_fresh_values() {
        let mut a = SparqlDataProviderSettings::owl_stats();
        a.schema_label_property = "skos:prefLabel".to_string();
        let b = SparqlDataProviderSettings::owl_stats();
        assert_ne!(a.schema_label_property, b.schema_label_property);
    }
}
