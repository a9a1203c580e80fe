//! The composite provider
//!
//! [`FederatedDataProvider`] exposes several [`DataProvider`]s behind the
//! same contract. Two strategies exist: `FetchAll` queries every source
//! concurrently and merges, `Sequential` walks sources in order and, for
//! id-keyed lookups, only forwards the ids still unanswered. A failing
//! source is logged and contributes nothing; federation degrades rather
//! than fails.

use crate::merge;
use async_trait::async_trait;
use futures::future::join_all;
use ontogram_core::{
    ClassModel, DataProvider, ElementIri, ElementModel, ElementTypeIri, FilterParams, LinkCount,
    LinkDirection, LinkModel, LinkTypeIri, LinkTypeModel, PropertyModel, PropertyTypeIri, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// One member of a federation.
#[derive(Clone)]
pub struct FederatedSource {
    /// Name surfaced in element provenance
    pub name: String,
    /// The underlying provider
    pub provider: Arc<dyn DataProvider>,
}

impl FederatedSource {
    /// Wrap `provider` under `name`.
    pub fn new(name: impl Into<String>, provider: Arc<dyn DataProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

/// How member sources are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// All sources concurrently, results merged
    #[default]
    FetchAll,
    /// Sources in declaration order; id-keyed lookups narrow to the ids
    /// still missing and stop early once all are answered
    Sequential,
}

/// A [`DataProvider`] over several member sources.
pub struct FederatedDataProvider {
    sources: Vec<FederatedSource>,
    mode: MergeMode,
}

impl FederatedDataProvider {
    /// Federate `sources` under the given strategy.
    pub fn new(sources: Vec<FederatedSource>, mode: MergeMode) -> Self {
        Self { sources, mode }
    }

    /// Run `op` against every source (concurrently or in order, per mode),
    /// downgrading per-source failures to warnings.
    async fn query_all<T, F, Fut>(&self, op: F) -> Vec<(String, T)>
    where
        T: Default,
        F: Fn(Arc<dyn DataProvider>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.mode {
            MergeMode::FetchAll => {
                let futures = self
                    .sources
                    .iter()
                    .map(|source| op(source.provider.clone()));
                self.sources
                    .iter()
                    .zip(join_all(futures).await)
                    .map(|(source, result)| (source.name.clone(), settle(source, result)))
                    .collect()
            }
            MergeMode::Sequential => {
                let mut results = Vec::with_capacity(self.sources.len());
                for source in &self.sources {
                    let result = op(source.provider.clone()).await;
                    results.push((source.name.clone(), settle(source, result)));
                }
                results
            }
        }
    }

    /// Id-keyed lookup: under `Sequential`, each source only sees the ids
    /// the previous sources left unanswered.
    async fn query_keyed<K, V, F, Fut>(
        &self,
        ids: &[K],
        op: F,
    ) -> Vec<(String, HashMap<K, V>)>
    where
        K: Clone + Eq + std::hash::Hash,
        F: Fn(Arc<dyn DataProvider>, Vec<K>) -> Fut,
        Fut: std::future::Future<Output = Result<HashMap<K, V>>>,
    {
        match self.mode {
            MergeMode::FetchAll => {
                let futures = self
                    .sources
                    .iter()
                    .map(|source| op(source.provider.clone(), ids.to_vec()));
                self.sources
                    .iter()
                    .zip(join_all(futures).await)
                    .map(|(source, result)| (source.name.clone(), settle(source, result)))
                    .collect()
            }
            MergeMode::Sequential => {
                let mut remaining: Vec<K> = ids.to_vec();
                let mut results = Vec::new();
                for source in &self.sources {
                    if remaining.is_empty() {
                        break;
                    }
                    let result = op(source.provider.clone(), remaining.clone()).await;
                    let found = settle(source, result);
                    remaining.retain(|id| !found.contains_key(id));
                    results.push((source.name.clone(), found));
                }
                results
            }
        }
    }
    /// Like [`Self::query_keyed`], for lookups returning a list of records
    /// carrying their own id.
    async fn query_listed<K, T, F, Fut>(
        &self,
        ids: &[K],
        key: impl Fn(&T) -> &K,
        op: F,
    ) -> Vec<Vec<T>>
    where
        K: Clone + PartialEq,
        F: Fn(Arc<dyn DataProvider>, Vec<K>) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>>>,
    {
        match self.mode {
            MergeMode::FetchAll => {
                let futures = self
                    .sources
                    .iter()
                    .map(|source| op(source.provider.clone(), ids.to_vec()));
                self.sources
                    .iter()
                    .zip(join_all(futures).await)
                    .map(|(source, result)| settle(source, result))
                    .collect()
            }
            MergeMode::Sequential => {
                let mut remaining: Vec<K> = ids.to_vec();
                let mut results = Vec::new();
                for source in &self.sources {
                    if remaining.is_empty() {
                        break;
                    }
                    let result = op(source.provider.clone(), remaining.clone()).await;
                    let found = settle(source, result);
                    remaining.retain(|id| !found.iter().any(|record| key(record) == id));
                    results.push(found);
                }
                results
            }
        }
    }
}

fn settle<T: Default>(source: &FederatedSource, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(source = %source.name, error = %e, "federated source failed");
            T::default()
        }
    }
}

fn drop_names<T>(results: Vec<(String, T)>) -> Vec<T> {
    results.into_iter().map(|(_, result)| result).collect()
}

#[async_trait]
impl DataProvider for FederatedDataProvider {
    async fn class_tree(&self) -> Result<Vec<ClassModel>> {
        let results = self
            .query_all(|provider| async move { provider.class_tree().await })
            .await;
        Ok(merge::merge_class_tree(drop_names(results)))
    }

    async fn class_info(&self, class_ids: &[ElementTypeIri]) -> Result<Vec<ClassModel>> {
        let results = self
            .query_listed(class_ids, |class: &ClassModel| &class.id, |provider, ids| {
                async move { provider.class_info(&ids).await }
            })
            .await;
        Ok(merge::merge_class_info(results))
    }

    async fn property_info(
        &self,
        property_ids: &[PropertyTypeIri],
    ) -> Result<HashMap<PropertyTypeIri, PropertyModel>> {
        let results = self
            .query_keyed(property_ids, |provider, ids| async move {
                provider.property_info(&ids).await
            })
            .await;
        Ok(merge::merge_property_info(drop_names(results)))
    }

    async fn link_types(&self) -> Result<Vec<LinkTypeModel>> {
        let results = self
            .query_all(|provider| async move { provider.link_types().await })
            .await;
        Ok(merge::merge_link_types(drop_names(results)))
    }

    async fn link_types_info(&self, link_type_ids: &[LinkTypeIri]) -> Result<Vec<LinkTypeModel>> {
        let results = self
            .query_listed(
                link_type_ids,
                |link_type: &LinkTypeModel| &link_type.id,
                |provider, ids| async move { provider.link_types_info(&ids).await },
            )
            .await;
        Ok(merge::merge_link_types(results))
    }

    async fn element_info(
        &self,
        element_ids: &[ElementIri],
    ) -> Result<HashMap<ElementIri, ElementModel>> {
        let results = self
            .query_keyed(element_ids, |provider, ids| async move {
                provider.element_info(&ids).await
            })
            .await;
        Ok(merge::merge_elements(results))
    }

    async fn links_info(
        &self,
        element_ids: &[ElementIri],
        link_type_ids: &[LinkTypeIri],
    ) -> Result<Vec<LinkModel>> {
        let results = self
            .query_all(|provider| {
                let ids = element_ids.to_vec();
                let types = link_type_ids.to_vec();
                async move { provider.links_info(&ids, &types).await }
            })
            .await;
        Ok(merge::merge_links(drop_names(results)))
    }

    async fn link_types_of(&self, element_id: &ElementIri) -> Result<Vec<LinkCount>> {
        let results = self
            .query_all(|provider| {
                let id = element_id.clone();
                async move { provider.link_types_of(&id).await }
            })
            .await;
        Ok(merge::merge_link_counts(drop_names(results)))
    }

    async fn link_elements(
        &self,
        element_id: &ElementIri,
        link_id: Option<&LinkTypeIri>,
        limit: usize,
        offset: usize,
        direction: Option<LinkDirection>,
    ) -> Result<HashMap<ElementIri, ElementModel>> {
        let results = self
            .query_all(|provider| {
                let id = element_id.clone();
                let link = link_id.cloned();
                async move {
                    provider
                        .link_elements(&id, link.as_ref(), limit, offset, direction)
                        .await
                }
            })
            .await;
        Ok(merge::merge_elements(results))
    }

    async fn filter(&self, params: &FilterParams) -> Result<HashMap<ElementIri, ElementModel>> {
        params.validate()?;
        let results = self
            .query_all(|provider| {
                let params = params.clone();
                async move { provider.filter(&params).await }
            })
            .await;
        Ok(merge::merge_elements(results))
    }
}
