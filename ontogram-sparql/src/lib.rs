//! SPARQL data provider for Ontogram diagrams
//!
//! Connects the diagram's [`DataProvider`](ontogram_core::DataProvider)
//! contract to a SPARQL 1.1 endpoint. The endpoint dialect is described
//! declaratively by [`SparqlDataProviderSettings`]: query templates with
//! `${name}` tokens plus link/property configuration rules that map raw
//! predicates (or path patterns) onto the logical ids the diagram shows.
//!
//! Anonymous (blank) nodes are optionally surfaced under stable structural
//! identifiers; see the [`blank`] module.

pub mod blank;
pub mod executor;
pub mod mapper;
pub mod provider;
pub mod response;
pub mod settings;
pub mod template;

pub use executor::{GraphParser, HttpExecutor, QueryMethod, SparqlExecutor};
pub use provider::{ImagePreparer, SparqlDataProvider, SparqlDataProviderOptions};
pub use response::{SelectResponse, SparqlTerm, Triple};
pub use settings::{
    FullTextSearchSettings, LinkConfiguration, PropertyConfiguration, SparqlDataProviderSettings,
};
