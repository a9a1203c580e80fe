//! # Ontogram Core
//!
//! Model types and the `DataProvider` contract for the Ontogram graph data
//! layer.
//!
//! This crate defines:
//! - Value types for diagram content: elements, links, classes, link types,
//!   properties, and localized label sets
//! - The identity rules used for de-duplication (labels by (value, language),
//!   links by the (type, source, target) triple)
//! - The async [`DataProvider`] trait implemented by both the single-source
//!   SPARQL provider and the federated provider
//! - [`FilterParams`] with fail-fast validation of parameter combinations
//!
//! ## Quick Start
//!
//! ```ignore
//! use ontogram_core::{DataProvider, FilterParams};
//!
//! async fn roots(provider: &dyn DataProvider) -> ontogram_core::Result<()> {
//!     let tree = provider.class_tree().await?;
//!     for class in &tree {
//!         println!("{} ({} children)", class.id, class.children.len());
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod model;
mod provider;

pub use error::{DataError, Result};
pub use model::{
    ClassModel, ElementIri, ElementModel, ElementTypeIri, LinkCount, LinkIdentity, LinkModel,
    LinkTypeIri, LinkTypeModel, LocalizedString, Property, PropertyModel, PropertyTypeIri,
};
pub use provider::{DataProvider, FilterParams, LinkDirection};
