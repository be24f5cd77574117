use async_trait::async_trait;
use std::fmt::Debug;
use std::io::Read;
use url::Url;

use super::common::{IndexStatistics, ResultDocument, SearchRequest, SearchResult};
use crate::crawl::IndexDocument;
use crate::error::IndexResult;

/// Capabilities shared by a single physical index and a group of indexes
#[async_trait]
pub trait IndexHandle: Send + Sync + Debug {
    /// Unique name of this handle
    fn name(&self) -> &str;

    /// Upsert one document by unique key
    async fn update_document(&self, document: &IndexDocument) -> IndexResult<()>;

    /// Upsert a batch of documents; applied atomically per handle
    async fn update_documents(&self, documents: &[IndexDocument]) -> IndexResult<()>;

    /// Delete by unique key. Absent keys are ignored.
    async fn delete_document(&self, unique_key: &str) -> IndexResult<()> {
        self.delete_documents(&[unique_key.to_string()]).await
    }

    async fn delete_documents(&self, unique_keys: &[String]) -> IndexResult<()>;

    /// Execute search
    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult>;

    /// Fetch stored documents by unique key
    async fn documents(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>>;

    /// Number of documents containing `text` in `field`
    async fn doc_freq(&self, field: &str, text: &str) -> IndexResult<u64>;

    async fn optimize(&self, force_local: bool) -> IndexResult<()>;

    async fn statistics(&self) -> IndexResult<IndexStatistics>;

    fn version(&self) -> u64;

    /// Switch to another stored version, optionally deleting the current one
    async fn swap(&self, version: u64, delete_old: bool) -> IndexResult<()>;

    /// Make the latest committed changes visible to searches
    async fn reload(&self) -> IndexResult<()>;

    /// Store one replicated file for `version`
    async fn receive(
        &self,
        version: u64,
        file_name: &str,
        reader: &mut (dyn Read + Send),
    ) -> IndexResult<()>;

    /// Replicate the current version to `destination` under `target_name`
    async fn push(&self, target_name: &str, destination: &Url) -> IndexResult<()>;

    fn is_online(&self) -> bool;

    fn is_read_only(&self) -> bool;

    fn set_online(&self, online: bool);

    fn set_read_only(&self, read_only: bool);
}
