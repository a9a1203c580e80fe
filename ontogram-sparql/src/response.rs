//! SPARQL 1.1 Query Results JSON types
//!
//! W3C standard format with type metadata:
//! ```json
//! {
//!   "head": {"vars": ["inst", "label"]},
//!   "results": {"bindings": [{
//!     "inst": {"type": "uri", "value": "http://example.org/alice"},
//!     "label": {"type": "literal", "value": "Alice", "xml:lang": "en"}
//!   }]}
//! }
//! ```
//!
//! Each bound term is `{"type": "uri|literal|bnode", "value": "...",
//! "datatype"?: "...", "xml:lang"?: "..."}`; unbound variables are simply
//! absent from the row. Graph (CONSTRUCT) results are represented as
//! [`Triple`]s produced by a pluggable parser upstream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One RDF term in a result row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SparqlTerm {
    /// A named node
    Uri {
        /// Full IRI
        value: String,
    },
    /// A literal, possibly tagged or typed
    #[serde(alias = "typed-literal")]
    Literal {
        /// Lexical form
        value: String,
        /// Language tag
        #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        /// Datatype IRI
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
    /// A blank node with its store-local label
    Bnode {
        /// Store-assigned label; not stable across query executions
        value: String,
    },
}

impl SparqlTerm {
    /// Construct a named-node term.
    pub fn uri(value: impl Into<String>) -> Self {
        SparqlTerm::Uri { value: value.into() }
    }

    /// Construct a plain literal term.
    pub fn literal(value: impl Into<String>) -> Self {
        SparqlTerm::Literal {
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    /// Construct a language-tagged literal term.
    pub fn literal_lang(value: impl Into<String>, lang: impl Into<String>) -> Self {
        SparqlTerm::Literal {
            value: value.into(),
            lang: Some(lang.into()),
            datatype: None,
        }
    }

    /// Construct a blank-node term.
    pub fn bnode(label: impl Into<String>) -> Self {
        SparqlTerm::Bnode { value: label.into() }
    }

    /// The lexical value regardless of term kind.
    pub fn value(&self) -> &str {
        match self {
            SparqlTerm::Uri { value }
            | SparqlTerm::Literal { value, .. }
            | SparqlTerm::Bnode { value } => value,
        }
    }

    /// The IRI, if this is a named node.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            SparqlTerm::Uri { value } => Some(value),
            _ => None,
        }
    }

    /// Whether this term is a blank node.
    pub fn is_bnode(&self) -> bool {
        matches!(self, SparqlTerm::Bnode { .. })
    }

    /// Parse the literal value as an unsigned count; `None` for non-literals
    /// or non-numeric text.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            SparqlTerm::Literal { value, .. } => value.parse().ok(),
            _ => None,
        }
    }
}

/// One result row: variable name to bound term.
pub type SparqlRow = HashMap<String, SparqlTerm>;

/// `head` section of a SELECT response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectHead {
    /// Projected variable names, without `?` prefix
    pub vars: Vec<String>,
}

/// `results` section of a SELECT response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResults {
    /// Result rows
    pub bindings: Vec<SparqlRow>,
}

/// A complete SELECT response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResponse {
    /// Projected variables
    pub head: SelectHead,
    /// Result rows
    pub results: SelectResults,
}

impl SelectResponse {
    /// An empty response with no variables and no rows.
    pub fn empty() -> Self {
        Self {
            head: SelectHead { vars: Vec::new() },
            results: SelectResults { bindings: Vec::new() },
        }
    }

    /// Build a response from rows, deriving `head.vars` from the first row.
    pub fn from_rows(bindings: Vec<SparqlRow>) -> Self {
        let vars = bindings
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            head: SelectHead { vars },
            results: SelectResults { bindings },
        }
    }
}

/// One triple of a graph (CONSTRUCT) result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject: named or blank node
    pub subject: SparqlTerm,
    /// Predicate: always a named node
    pub predicate: SparqlTerm,
    /// Object: any term kind
    pub object: SparqlTerm,
}

impl Triple {
    /// Construct a triple.
    pub fn new(subject: SparqlTerm, predicate: SparqlTerm, object: SparqlTerm) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// Convert graph triples into element-info rows with the conventional
/// variable names `inst` / `propType` / `propValue`, so graph results and
/// tabular results flow through the same mapper.
pub fn triples_to_element_rows(triples: &[Triple]) -> Vec<SparqlRow> {
    triples
        .iter()
        .map(|t| {
            let mut row = SparqlRow::new();
            row.insert("inst".to_string(), t.subject.clone());
            row.insert("propType".to_string(), t.predicate.clone());
            row.insert("propValue".to_string(), t.object.clone());
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_json() {
        let json = r#"{
            "head": {"vars": ["inst", "label"]},
            "results": {"bindings": [
                {"inst": {"type": "uri", "value": "http://example.org/alice"},
                 "label": {"type": "literal", "value": "Alice", "xml:lang": "en"}},
                {"inst": {"type": "bnode", "value": "b0"}}
            ]}
        }"#;
        let response: SelectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.head.vars, vec!["inst", "label"]);
        assert_eq!(response.results.bindings.len(), 2);
        let first = &response.results.bindings[0];
        assert_eq!(first["inst"].as_iri(), Some("http://example.org/alice"));
        assert!(matches!(
            &first["label"],
            SparqlTerm::Literal { lang: Some(l), .. } if l == "en"
        ));
        assert!(response.results.bindings[1]["inst"].is_bnode());
    }

    #[test]
    fn parses_typed_literal_alias() {
        let json = r#"{"type": "typed-literal", "value": "5",
                       "datatype": "http://www.w3.org/2001/XMLSchema#integer"}"#;
        let term: SparqlTerm = serde_json::from_str(json).unwrap();
        assert_eq!(term.as_count(), Some(5));
    }

    #[test]
    fn triples_become_element_rows() {
        let triples = vec![Triple::new(
            SparqlTerm::uri("http://example.org/alice"),
            SparqlTerm::uri(ontogram_vocab::rdfs::LABEL),
            SparqlTerm::literal_lang("Alice", "en"),
        )];
        let rows = triples_to_element_rows(&triples);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["propType"].as_iri(), Some(ontogram_vocab::rdfs::LABEL));
    }
}
