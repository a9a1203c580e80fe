//! Model value types for diagram content
//!
//! All types here are plain values created fresh per request/response cycle.
//! Merge code builds new values rather than mutating inputs in place, since
//! the same inputs can be consumed by several concurrent merges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! iri_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an IRI string.
            pub fn new(iri: impl Into<String>) -> Self {
                Self(iri.into())
            }

            /// The underlying IRI text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper, returning the IRI text.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(iri: &str) -> Self {
                Self(iri.to_string())
            }
        }

        impl From<String> for $name {
            fn from(iri: String) -> Self {
                Self(iri)
            }
        }
    };
}

iri_type! {
    /// IRI identifying an element (instance) on the diagram.
    ///
    /// May also hold an encoded blank-node identifier; see the blank-node
    /// codec in `ontogram-sparql`.
    ElementIri
}
iri_type! {
    /// IRI identifying an element type (class).
    ElementTypeIri
}
iri_type! {
    /// IRI identifying a link type (predicate or configured logical link).
    LinkTypeIri
}
iri_type! {
    /// IRI identifying a property type.
    PropertyTypeIri
}

/// A literal value with a language tag and optional datatype.
///
/// Label sets are lists of these; equality for de-duplication is the
/// (value, language) pair, the datatype carries no identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizedString {
    /// Lexical value
    pub value: String,
    /// Language tag (empty for plain literals)
    pub language: String,
    /// Datatype IRI, if the literal is typed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl LocalizedString {
    /// Create a plain (untyped, untagged) literal.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: String::new(),
            datatype: None,
        }
    }

    /// Create a language-tagged literal.
    pub fn tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: language.into(),
            datatype: None,
        }
    }
}

impl PartialEq for LocalizedString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.language == other.language
    }
}

impl Eq for LocalizedString {}

/// Append `text` to a label set unless an equal (value, language) pair is
/// already present.
pub(crate) fn push_label(labels: &mut Vec<LocalizedString>, text: LocalizedString) {
    if !labels.contains(&text) {
        labels.push(text);
    }
}

/// One property value set: either IRI-valued or literal-valued.
///
/// A property map binds each property-type IRI to exactly one `Property`;
/// mixing kinds under one key is not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Property {
    /// IRI (object) values
    Iri {
        /// De-duplicated value list
        values: Vec<ElementIri>,
    },
    /// Literal values
    Literal {
        /// De-duplicated value list
        values: Vec<LocalizedString>,
    },
}

impl Property {
    /// Merge `other` into `self`, de-duplicating values.
    ///
    /// When the kinds differ, `self` wins and `other` is discarded: a
    /// property key holds exactly one kind.
    pub fn merge(&mut self, other: &Property) {
        match (self, other) {
            (Property::Iri { values }, Property::Iri { values: incoming }) => {
                for v in incoming {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
            }
            (Property::Literal { values }, Property::Literal { values: incoming }) => {
                for v in incoming {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

/// An element (instance) as shown on the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementModel {
    /// Element IRI (or encoded blank-node id)
    pub id: ElementIri,
    /// Declared types; unique, unordered
    pub types: Vec<ElementTypeIri>,
    /// Label set, de-duplicated by (value, language)
    pub label: Vec<LocalizedString>,
    /// Image URL, if one was resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Property map; one `Property` per property type
    pub properties: HashMap<PropertyTypeIri, Property>,
    /// Names of the federated sources that contributed data, in merge order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ElementModel {
    /// An empty element with the given id.
    pub fn empty(id: ElementIri) -> Self {
        Self {
            id,
            types: Vec::new(),
            label: Vec::new(),
            image: None,
            properties: HashMap::new(),
            sources: Vec::new(),
        }
    }

    /// Add a type unless already present.
    pub fn add_type(&mut self, type_iri: ElementTypeIri) {
        if !self.types.contains(&type_iri) {
            self.types.push(type_iri);
        }
    }

    /// Add a label unless an equal (value, language) pair is present.
    pub fn add_label(&mut self, text: LocalizedString) {
        push_label(&mut self.label, text);
    }
}

/// Identity key of a link: the (type, source, target) triple.
///
/// Properties are not part of link identity; two bindings with the same
/// triple but different incidental properties merge into one link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkIdentity {
    pub link_type_id: LinkTypeIri,
    pub source_id: ElementIri,
    pub target_id: ElementIri,
}

/// A link between two elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkModel {
    /// Link type IRI
    pub link_type_id: LinkTypeIri,
    /// Source element IRI
    pub source_id: ElementIri,
    /// Target element IRI
    pub target_id: ElementIri,
    /// Optional link properties (not part of identity)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<PropertyTypeIri, Property>,
}

impl LinkModel {
    /// The de-duplication key for this link.
    pub fn identity(&self) -> LinkIdentity {
        LinkIdentity {
            link_type_id: self.link_type_id.clone(),
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
        }
    }
}

/// A class in the class tree.
///
/// Invariants after a merge:
/// - no class id appears as a child under two different parents
/// - a node that is some other node's child does not also appear at the
///   top level of the forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    /// Class IRI
    pub id: ElementTypeIri,
    /// Label set
    pub label: Vec<LocalizedString>,
    /// Instance count; `None` means "no information", which is distinct
    /// from an explicit zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Subclasses
    pub children: Vec<ClassModel>,
}

impl ClassModel {
    /// A leaf class with no label or count.
    pub fn empty(id: ElementTypeIri) -> Self {
        Self {
            id,
            label: Vec::new(),
            count: None,
            children: Vec::new(),
        }
    }
}

/// A link type with an optional usage count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTypeModel {
    /// Link type IRI
    pub id: LinkTypeIri,
    /// Label set
    pub label: Vec<LocalizedString>,
    /// Usage count across the store; `None` means unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// A property type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyModel {
    /// Property type IRI
    pub id: PropertyTypeIri,
    /// Label set
    pub label: Vec<LocalizedString>,
}

/// Incident-link statistics for one element and one link type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCount {
    /// Link type IRI
    pub id: LinkTypeIri,
    /// Number of incoming links of this type
    pub in_count: u64,
    /// Number of outgoing links of this type
    pub out_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localized_string_identity_ignores_datatype() {
        let a = LocalizedString {
            value: "Alice".into(),
            language: "en".into(),
            datatype: None,
        };
        let b = LocalizedString {
            value: "Alice".into(),
            language: "en".into(),
            datatype: Some("http://www.w3.org/2001/XMLSchema#string".into()),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn label_push_deduplicates() {
        let mut labels = vec![LocalizedString::tagged("Alice", "en")];
        push_label(&mut labels, LocalizedString::tagged("Alice", "en"));
        push_label(&mut labels, LocalizedString::tagged("Алиса", "ru"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn property_merge_keeps_one_kind() {
        let mut p = Property::Literal {
            values: vec![LocalizedString::plain("x")],
        };
        p.merge(&Property::Iri {
            values: vec![ElementIri::new("http://example.org/y")],
        });
        assert!(matches!(&p, Property::Literal { values } if values.len() == 1));
    }

    #[test]
    fn link_identity_excludes_properties() {
        let mut a = LinkModel {
            link_type_id: "http://example.org/knows".into(),
            source_id: "http://example.org/alice".into(),
            target_id: "http://example.org/bob".into(),
            properties: HashMap::new(),
        };
        let b = a.clone();
        a.properties.insert(
            "http://example.org/since".into(),
            Property::Literal {
                values: vec![LocalizedString::plain("2020")],
            },
        );
        assert_eq!(a.identity(), b.identity());
    }
}
