//! The `DataProvider` contract and filter parameters
//!
//! Every data source behind the diagram, whether a single SPARQL endpoint or
//! a federation of several, implements [`DataProvider`] identically. The
//! diagram layer never learns which kind it is talking to.

use crate::error::{DataError, Result};
use crate::model::{
    ClassModel, ElementIri, ElementModel, ElementTypeIri, LinkCount, LinkModel, LinkTypeIri,
    LinkTypeModel, PropertyModel, PropertyTypeIri,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a link relative to a reference element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    /// Links pointing at the reference element
    In,
    /// Links leaving the reference element
    Out,
}

/// Parameters for [`DataProvider::filter`].
///
/// The four query shapes are mutually exclusive in practice:
/// by element type, by (reference element + link id) with direction, by
/// reference element alone, or by free-text search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterParams {
    /// Restrict results to instances of this type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type_id: Option<ElementTypeIri>,
    /// Free-text search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reference element for link-based lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_element_id: Option<ElementIri>,
    /// Restrict link-based lookups to this link type.
    /// Requires `ref_element_id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_element_link_id: Option<LinkTypeIri>,
    /// Direction of the link relative to the reference element;
    /// `None` means both directions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_direction: Option<LinkDirection>,
    /// Page size
    pub limit: usize,
    /// Page offset
    pub offset: usize,
    /// Preferred language for labels
    pub language_code: String,
}

impl FilterParams {
    /// An empty parameter set with the given page bounds.
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            element_type_id: None,
            text: None,
            ref_element_id: None,
            ref_element_link_id: None,
            link_direction: None,
            limit,
            offset,
            language_code: "en".to_string(),
        }
    }

    /// Fail-fast validation of parameter combinations.
    ///
    /// Runs synchronously before any query is issued; a link-id filter
    /// without a reference element is a usage error.
    pub fn validate(&self) -> Result<()> {
        if self.ref_element_link_id.is_some() && self.ref_element_id.is_none() {
            return Err(DataError::Usage(
                "filter: refElementLinkId requires refElementId".to_string(),
            ));
        }
        Ok(())
    }
}

/// The uniform contract of every Ontogram data source.
///
/// Absent entities simply do not appear as keys in returned maps;
/// missing data is not an error condition.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// The class forest, with per-class instance counts where known.
    async fn class_tree(&self) -> Result<Vec<ClassModel>>;

    /// Class records for the given ids.
    async fn class_info(&self, class_ids: &[ElementTypeIri]) -> Result<Vec<ClassModel>>;

    /// Property records for the given ids.
    async fn property_info(
        &self,
        property_ids: &[PropertyTypeIri],
    ) -> Result<HashMap<PropertyTypeIri, PropertyModel>>;

    /// All known link types.
    async fn link_types(&self) -> Result<Vec<LinkTypeModel>>;

    /// Link-type records for the given ids.
    async fn link_types_info(&self, link_type_ids: &[LinkTypeIri])
        -> Result<Vec<LinkTypeModel>>;

    /// Element records for the given ids.
    async fn element_info(
        &self,
        element_ids: &[ElementIri],
    ) -> Result<HashMap<ElementIri, ElementModel>>;

    /// Links among `element_ids`, restricted to `link_type_ids` when
    /// non-empty.
    async fn links_info(
        &self,
        element_ids: &[ElementIri],
        link_type_ids: &[LinkTypeIri],
    ) -> Result<Vec<LinkModel>>;

    /// Incident-link statistics for one element.
    async fn link_types_of(&self, element_id: &ElementIri) -> Result<Vec<LinkCount>>;

    /// Elements connected to `element_id`, optionally through `link_id`
    /// in `direction`, paginated.
    async fn link_elements(
        &self,
        element_id: &ElementIri,
        link_id: Option<&LinkTypeIri>,
        limit: usize,
        offset: usize,
        direction: Option<LinkDirection>,
    ) -> Result<HashMap<ElementIri, ElementModel>>;

    /// Element lookup by type, connectivity, or free text.
    async fn filter(&self, params: &FilterParams)
        -> Result<HashMap<ElementIri, ElementModel>>;
}
