use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, join_all};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::aggregator::SearchGroup;
use super::common::{IndexStatistics, ResultDocument, SearchRequest, SearchResult};
use super::handle::IndexHandle;
use super::local_index::LocalIndex;
use crate::config::RouterConfig;
use crate::crawl::IndexDocument;
use crate::error::{GroupFailure, IndexError, IndexResult};

/// Named collection of indexes that routes operations to one or all of them.
///
/// Unnamed operations are broadcast to every index; one index failing does
/// not stop the others, and all failures come back together. Named
/// operations silently do nothing when the name is unknown, except
/// [`IndexGroup::search_index`] which needs its target to exist.
///
/// The group is itself an [`IndexHandle`], so groups can be nested.
pub struct IndexGroup {
    name: String,
    indices: RwLock<IndexMap<String, Arc<dyn IndexHandle>>>,
    search_timeout: Duration,
}

impl std::fmt::Debug for IndexGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGroup")
            .field("name", &self.name)
            .field("indices", &self.names())
            .field("search_timeout", &self.search_timeout)
            .finish()
    }
}

impl IndexGroup {
    /// Create an empty group
    pub fn new(name: &str, search_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            indices: RwLock::new(IndexMap::new()),
            search_timeout,
        }
    }

    /// Open every configured index. Any failure aborts start-up.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        config.validate().context("Invalid router configuration")?;

        info!(
            "Initializing index group '{}' with {} indices",
            config.name,
            config.indices.len()
        );

        let data_dir = config.data_dir();
        let group = Self::new(&config.name, config.search_timeout());
        for index_config in &config.indices {
            info!("Loading index: {}", index_config.name);
            let index = LocalIndex::from_config(index_config, &data_dir)
                .with_context(|| format!("Failed to open index '{}'", index_config.name))?;
            group.insert(Arc::new(index));
        }
        Ok(group)
    }

    /// Add a handle; an existing handle with the same name is replaced in place
    pub fn insert(&self, handle: Arc<dyn IndexHandle>) -> Option<Arc<dyn IndexHandle>> {
        let name = handle.name().to_string();
        let previous = self.indices.write().insert(name.clone(), handle);
        if previous.is_some() {
            info!("Replaced index '{}' in group '{}'", name, self.name);
        }
        previous
    }

    /// Remove a handle, keeping the order of the others
    pub fn remove(&self, name: &str) -> Option<Arc<dyn IndexHandle>> {
        self.indices.write().shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IndexHandle>> {
        self.indices.read().get(name).cloned()
    }

    /// Index names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.indices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.read().is_empty()
    }

    /// Point-in-time copy of the handles; the map lock is released on return
    pub fn handles(&self) -> Vec<Arc<dyn IndexHandle>> {
        self.indices.read().values().cloned().collect()
    }

    /// Run `operation` on every handle in parallel and collect the failures
    async fn broadcast<'a>(
        &self,
        action: &str,
        operation: impl Fn(Arc<dyn IndexHandle>) -> BoxFuture<'a, IndexResult<()>>,
    ) -> IndexResult<()> {
        let handles = self.handles();
        let outcomes = join_all(handles.iter().cloned().map(operation)).await;

        let mut failure = GroupFailure::default();
        for (handle, outcome) in handles.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!("{} failed for index '{}': {}", action, handle.name(), e);
                failure.push(handle.name(), e);
            }
        }
        failure.into_result()
    }

    pub async fn update_document_in(&self, name: &str, document: &IndexDocument) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.update_document(document).await,
            None => Ok(()),
        }
    }

    pub async fn update_documents_in(
        &self,
        name: &str,
        documents: &[IndexDocument],
    ) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.update_documents(documents).await,
            None => Ok(()),
        }
    }

    pub async fn delete_document_in(&self, name: &str, unique_key: &str) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.delete_document(unique_key).await,
            None => Ok(()),
        }
    }

    pub async fn delete_documents_in(&self, name: &str, unique_keys: &[String]) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.delete_documents(unique_keys).await,
            None => Ok(()),
        }
    }

    pub async fn optimize_index(&self, name: &str, force_local: bool) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.optimize(force_local).await,
            None => Ok(()),
        }
    }

    pub async fn swap_index(&self, name: &str, version: u64, delete_old: bool) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.swap(version, delete_old).await,
            None => Ok(()),
        }
    }

    pub async fn reload_index(&self, name: &str) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.reload().await,
            None => Ok(()),
        }
    }

    /// Search exactly one index; an unknown name is an error here
    pub async fn search_index(&self, name: &str, request: &SearchRequest) -> IndexResult<SearchResult> {
        let handle = self
            .get(name)
            .ok_or_else(|| IndexError::NoSuchIndex(name.to_string()))?;
        handle.search(request).await
    }

    /// Store a replicated file into the named index
    pub async fn receive_into(
        &self,
        name: &str,
        version: u64,
        file_name: &str,
        reader: &mut (dyn Read + Send),
    ) -> IndexResult<()> {
        match self.get(name) {
            Some(handle) => handle.receive(version, file_name, reader).await,
            None => Ok(()),
        }
    }

    /// Replicate one named index, or every index under its own name when
    /// `name` is `None`
    pub async fn push_from(&self, name: Option<&str>, destination: &Url) -> IndexResult<()> {
        match name {
            Some(name) => match self.get(name) {
                Some(handle) => handle.push(name, destination).await,
                None => Ok(()),
            },
            None => {
                self.broadcast("Push", |handle| {
                    async move { handle.push(handle.name(), destination).await }.boxed()
                })
                .await
            }
        }
    }

    pub fn is_online_index(&self, name: &str) -> bool {
        self.get(name).is_some_and(|handle| handle.is_online())
    }

    pub fn is_read_only_index(&self, name: &str) -> bool {
        self.get(name).is_some_and(|handle| handle.is_read_only())
    }

    pub fn set_online_index(&self, name: &str, online: bool) {
        if let Some(handle) = self.get(name) {
            handle.set_online(online);
        }
    }

    pub fn set_read_only_index(&self, name: &str, read_only: bool) {
        if let Some(handle) = self.get(name) {
            handle.set_read_only(read_only);
        }
    }

    /// Version of the named index, 0 when unknown
    pub fn version_of(&self, name: &str) -> u64 {
        self.get(name).map_or(0, |handle| handle.version())
    }

    /// Document frequency of a term over every index.
    ///
    /// Summing per-index counts stands in for a true global count when
    /// scoring across indexes.
    pub async fn global_doc_freq(&self, field: &str, text: &str) -> IndexResult<u64> {
        let handles = self.handles();
        let outcomes = join_all(handles.iter().map(|handle| handle.doc_freq(field, text))).await;

        let mut total = 0;
        let mut failure = GroupFailure::default();
        for (handle, outcome) in handles.iter().zip(outcomes) {
            match outcome {
                Ok(freq) => total += freq,
                Err(e) => failure.push(handle.name(), e),
            }
        }
        failure.into_result()?;
        Ok(total)
    }
}

#[async_trait]
impl IndexHandle for IndexGroup {
    fn name(&self) -> &str {
        &self.name
    }

    async fn update_document(&self, document: &IndexDocument) -> IndexResult<()> {
        self.broadcast("Update", |handle| {
            async move { handle.update_document(document).await }.boxed()
        })
        .await
    }

    async fn update_documents(&self, documents: &[IndexDocument]) -> IndexResult<()> {
        self.broadcast("Update", |handle| {
            async move { handle.update_documents(documents).await }.boxed()
        })
        .await
    }

    async fn delete_documents(&self, unique_keys: &[String]) -> IndexResult<()> {
        self.broadcast("Delete", |handle| {
            async move { handle.delete_documents(unique_keys).await }.boxed()
        })
        .await
    }

    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        let handles = self.handles();
        let group = SearchGroup::new(&handles, self.search_timeout);
        if let [single] = handles.as_slice() {
            // Fast path: keeps the index's own ranking untouched
            debug!("Group '{}' delegating search to '{}'", self.name, single.name());
            return group.search_single(request).await;
        }
        group.search(request).await
    }

    async fn documents(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>> {
        let handles = self.handles();
        SearchGroup::new(&handles, self.search_timeout)
            .documents(unique_keys)
            .await
    }

    async fn doc_freq(&self, field: &str, text: &str) -> IndexResult<u64> {
        self.global_doc_freq(field, text).await
    }

    async fn optimize(&self, force_local: bool) -> IndexResult<()> {
        self.broadcast("Optimize", |handle| {
            async move { handle.optimize(force_local).await }.boxed()
        })
        .await
    }

    async fn statistics(&self) -> IndexResult<IndexStatistics> {
        let handles = self.handles();
        let outcomes = join_all(handles.iter().map(|handle| handle.statistics())).await;

        let mut stats = IndexStatistics::default();
        let mut failure = GroupFailure::default();
        for (handle, outcome) in handles.iter().zip(outcomes) {
            match outcome {
                Ok(index_stats) => stats += index_stats,
                Err(e) => failure.push(handle.name(), e),
            }
        }
        failure.into_result()?;
        Ok(stats)
    }

    /// Highest version among the indexes
    fn version(&self) -> u64 {
        self.handles()
            .iter()
            .map(|handle| handle.version())
            .max()
            .unwrap_or(0)
    }

    async fn swap(&self, version: u64, delete_old: bool) -> IndexResult<()> {
        self.broadcast("Swap", |handle| {
            async move { handle.swap(version, delete_old).await }.boxed()
        })
        .await
    }

    async fn reload(&self) -> IndexResult<()> {
        self.broadcast("Reload", |handle| async move { handle.reload().await }.boxed())
            .await
    }

    /// The stream is read once and replayed to every index
    async fn receive(
        &self,
        version: u64,
        file_name: &str,
        reader: &mut (dyn Read + Send),
    ) -> IndexResult<()> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let content = &content;
        self.broadcast("Receive", |handle| {
            async move {
                let mut replay: &[u8] = content;
                handle.receive(version, file_name, &mut replay).await
            }
            .boxed()
        })
        .await
    }

    /// Every index is pushed under its own name
    async fn push(&self, _target_name: &str, destination: &Url) -> IndexResult<()> {
        self.push_from(None, destination).await
    }

    fn is_online(&self) -> bool {
        let handles = self.handles();
        !handles.is_empty() && handles.iter().all(|handle| handle.is_online())
    }

    fn is_read_only(&self) -> bool {
        let handles = self.handles();
        !handles.is_empty() && handles.iter().all(|handle| handle.is_read_only())
    }

    fn set_online(&self, online: bool) {
        for handle in self.handles() {
            handle.set_online(online);
        }
    }

    fn set_read_only(&self, read_only: bool) {
        for handle in self.handles() {
            handle.set_read_only(read_only);
        }
    }
}
