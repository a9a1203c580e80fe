//! Federated data provider for Ontogram diagrams
//!
//! Combines several [`DataProvider`](ontogram_core::DataProvider) members
//! behind the same contract the diagram already speaks, merging their
//! results deterministically and tagging merged elements with provenance.

pub mod merge;
pub mod provider;

pub use merge::SOURCE_PROPERTY;
pub use provider::{FederatedDataProvider, FederatedSource, MergeMode};
