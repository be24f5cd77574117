use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
    collector::{Count, TopDocs},
    query::{AllQuery, Query, QueryParser, TermQuery},
    schema::IndexRecordOption,
};
use tracing::{debug, info, warn};
use url::Url;

use super::common::{
    DEFAULT_WRITER_HEAP_SIZE, IndexStatistics, MIN_WRITER_HEAP_SIZE, ResultDocument,
    SearchRequest, SearchResult, doc_to_fields, fields_to_doc,
};
use super::handle::IndexHandle;
use super::schema::FileSchema;
use crate::config::IndexConfig;
use crate::crawl::IndexDocument;
use crate::error::{IndexError, IndexResult};

/// Index metadata file name
pub const INDEX_METADATA_FILE: &str = "meta.json";

/// Files owned by a live writer; never replicated
const LOCK_FILE_PREFIX: &str = ".tantivy-";

/// One opened version of the index
struct IndexState {
    version: u64,
    dir: PathBuf,
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    /// Set under the writer lock once a swap replaced this version
    retired: AtomicBool,
}

impl IndexState {
    fn create(dir: PathBuf, version: u64, schema: &FileSchema) -> IndexResult<Self> {
        fs::create_dir_all(&dir)?;
        let index = Index::create_in_dir(&dir, schema.schema.clone())?;
        Self::with_index(dir, version, index)
    }

    fn open(dir: PathBuf, version: u64) -> IndexResult<Self> {
        let index = Index::open_in_dir(&dir)?;
        Self::with_index(dir, version, index)
    }

    fn with_index(dir: PathBuf, version: u64, index: Index) -> IndexResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            version,
            dir,
            index,
            reader,
            writer: Mutex::new(None),
            retired: AtomicBool::new(false),
        })
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Run `f` with the writer kept in `slot` (created on first use), then
    /// commit and reload. Uncommitted work is rolled back when `f` fails.
    fn apply<T>(
        &self,
        slot: &mut Option<IndexWriter>,
        heap_size: usize,
        f: impl FnOnce(&IndexState, &mut IndexWriter) -> IndexResult<T>,
    ) -> IndexResult<T> {
        let writer: IndexWriter = match slot.take() {
            Some(writer) => writer,
            None => self.index.writer(heap_size.max(MIN_WRITER_HEAP_SIZE))?,
        };
        let writer = slot.insert(writer);

        match f(self, writer) {
            Ok(value) => {
                writer.commit()?;
                self.reader.reload()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = writer.rollback() {
                    warn!("Rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }
}

/// Shared part of a [`LocalIndex`], moved onto blocking threads
struct IndexCore {
    name: String,
    root: PathBuf,
    schema: FileSchema,
    writer_heap_size: usize,
    online: AtomicBool,
    read_only: AtomicBool,
    state: RwLock<Option<Arc<IndexState>>>,
}

impl IndexCore {
    fn current(&self) -> IndexResult<Arc<IndexState>> {
        self.state
            .read()
            .clone()
            .ok_or_else(|| IndexError::Unavailable(self.name.clone()))
    }

    fn version(&self) -> u64 {
        self.state
            .read()
            .as_ref()
            .map(|state| state.version)
            .unwrap_or(0)
    }

    fn check_online(&self) -> IndexResult<()> {
        if self.online.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(IndexError::Offline(self.name.clone()))
        }
    }

    fn check_writable(&self) -> IndexResult<()> {
        self.check_online()?;
        if self.read_only.load(Ordering::Relaxed) {
            return Err(IndexError::ReadOnly(self.name.clone()));
        }
        Ok(())
    }

    fn unique_term(&self, key: &str) -> Term {
        Term::from_field_text(self.schema.path, key)
    }

    /// Write into the live version. A writer that waited on a version being
    /// swapped out retries on its replacement.
    fn write<T>(
        &self,
        f: impl FnOnce(&IndexState, &mut IndexWriter) -> IndexResult<T>,
    ) -> IndexResult<T> {
        loop {
            let state = self.current()?;
            let mut slot = state.writer.lock();
            if state.is_retired() {
                debug!("Version {} of '{}' retired, retrying", state.version, self.name);
                continue;
            }
            return state.apply(&mut slot, self.writer_heap_size, f);
        }
    }

    fn update_documents(&self, documents: &[IndexDocument]) -> IndexResult<()> {
        self.check_writable()?;
        let unique_key = self.schema.unique_key();

        // Resolve every key before touching the writer so a bad batch changes nothing
        let mut prepared: Vec<(Term, TantivyDocument)> = Vec::with_capacity(documents.len());
        for document in documents {
            let key = document
                .get_first(unique_key)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| IndexError::MissingUniqueKey(unique_key.to_string()))?;
            prepared.push((self.unique_term(key), fields_to_doc(document, &self.schema)));
        }

        self.write(|_, writer| {
            for (term, doc) in prepared {
                writer.delete_term(term);
                writer.add_document(doc)?;
            }
            Ok(())
        })?;

        debug!("Updated {} document(s) in '{}'", documents.len(), self.name);
        Ok(())
    }

    fn delete_documents(&self, unique_keys: &[String]) -> IndexResult<()> {
        self.check_writable()?;
        self.write(|_, writer| {
            for key in unique_keys {
                writer.delete_term(self.unique_term(key));
            }
            Ok(())
        })?;

        debug!("Deleted {} key(s) from '{}'", unique_keys.len(), self.name);
        Ok(())
    }

    /// Main search function
    fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        debug!(
            "LocalIndex::search '{}' called with query: '{}', start: {}, rows: {}",
            self.name, request.query, request.start, request.rows
        );
        self.check_online()?;
        let state = self.current()?;
        let searcher = state.reader.searcher();

        let query: Box<dyn Query> = {
            let text = request.query.trim();
            if text.is_empty() || text == "*:*" {
                Box::new(AllQuery)
            } else {
                let parser =
                    QueryParser::for_index(&state.index, self.schema.default_search_fields());
                parser.parse_query(text)?
            }
        };

        // Collect from the top so max_score does not depend on the window
        let window_end = request.window_end();
        let (top_docs, num_found) = if window_end == 0 {
            (Vec::new(), searcher.search(&query, &Count)?)
        } else {
            // TopDocs reserves its whole limit up front
            let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
            let limit = window_end.min(num_docs).max(1);
            searcher.search(&query, &(TopDocs::with_limit(limit), Count))?
        };

        let max_score = top_docs.first().map(|(score, _)| *score).unwrap_or(0.0);

        let mut documents = Vec::new();
        for (rank, (score, doc_address)) in top_docs.into_iter().enumerate().skip(request.start) {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            documents.push(ResultDocument {
                index: self.name.clone(),
                score,
                rank,
                fields: doc_to_fields(&doc, &self.schema),
            });
        }

        Ok(SearchResult {
            documents,
            num_found: num_found as u64,
            max_score,
        })
    }

    fn documents(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>> {
        self.check_online()?;
        let state = self.current()?;
        let searcher = state.reader.searcher();

        let mut documents = Vec::new();
        for (rank, key) in unique_keys.iter().enumerate() {
            let query = TermQuery::new(self.unique_term(key), IndexRecordOption::Basic);
            let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;
            if let Some((_score, doc_address)) = top_docs.into_iter().next() {
                let doc: TantivyDocument = searcher.doc(doc_address)?;
                documents.push(ResultDocument {
                    index: self.name.clone(),
                    score: 0.0,
                    rank,
                    fields: doc_to_fields(&doc, &self.schema),
                });
            }
        }
        Ok(documents)
    }

    fn doc_freq(&self, field: &str, text: &str) -> IndexResult<u64> {
        let Some(field) = self.schema.field(field) else {
            return Ok(0);
        };
        let state = self.current()?;
        let searcher = state.reader.searcher();
        Ok(searcher.doc_freq(&Term::from_field_text(field, text))?)
    }

    /// Merge all searchable segments into one
    fn optimize(&self) -> IndexResult<()> {
        if self.read_only.load(Ordering::Relaxed) {
            debug!("Skipping optimize of read-only index '{}'", self.name);
            return Ok(());
        }
        self.check_online()?;
        if self.current()?.index.searchable_segment_ids()?.len() < 2 {
            debug!("Index '{}' already optimized", self.name);
            return Ok(());
        }

        self.write(|state, writer| {
            let segment_ids = state.index.searchable_segment_ids()?;
            if segment_ids.len() > 1 {
                info!("Merging {} segments of '{}'", segment_ids.len(), self.name);
                writer.merge(&segment_ids).wait()?;
                writer.garbage_collect_files().wait()?;
            }
            Ok(())
        })
    }

    /// Get index statistics
    fn statistics(&self) -> IndexResult<IndexStatistics> {
        let state = self.current()?;
        let searcher = state.reader.searcher();

        let mut stats = IndexStatistics {
            size_bytes: calculate_index_size(&state.dir)?,
            ..IndexStatistics::default()
        };
        for segment_reader in searcher.segment_readers() {
            stats.max_doc += u64::from(segment_reader.max_doc());
            stats.num_docs += u64::from(segment_reader.num_docs());
            stats.num_deleted_docs += u64::from(segment_reader.num_deleted_docs());
        }
        Ok(stats)
    }

    fn swap(&self, version: u64, delete_old: bool) -> IndexResult<()> {
        let current = self.current()?;
        if current.version == version {
            debug!("Index '{}' already at version {}", self.name, version);
            return Ok(());
        }

        // Open before taking any lock; searches keep using the current state meanwhile
        let next = Arc::new(IndexState::open(self.root.join(version.to_string()), version)?);

        // Wait for an in-flight write, then retire the old version under its writer lock
        let mut old_writer = current.writer.lock();
        if current.is_retired() {
            // Lost a race with another swap
            drop(old_writer);
            return self.swap(version, delete_old);
        }
        current.retired.store(true, Ordering::Release);
        *self.state.write() = Some(next);
        old_writer.take();
        drop(old_writer);

        info!(
            "Index '{}' swapped from version {} to {}",
            self.name, current.version, version
        );

        if delete_old {
            fs::remove_dir_all(&current.dir)?;
            debug!("Deleted old version directory {:?}", current.dir);
        }
        Ok(())
    }

    /// Reload the searcher to see new changes
    fn reload(&self) -> IndexResult<()> {
        let state = self.current()?;
        state.reader.reload()?;
        Ok(())
    }

    fn receive(&self, version: u64, file_name: &str, content: &[u8]) -> IndexResult<()> {
        check_plain_name(file_name)?;
        let dir = self.root.join(version.to_string());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(file_name), content)?;
        debug!(
            "Received {} ({} bytes) for '{}' version {}",
            file_name,
            content.len(),
            self.name,
            version
        );
        Ok(())
    }

    fn push(&self, target_name: &str, destination: &Url) -> IndexResult<()> {
        check_plain_name(target_name)?;
        if destination.scheme() != "file" {
            return Err(IndexError::UnsupportedDestination(destination.to_string()));
        }
        let dest_root = destination
            .to_file_path()
            .map_err(|_| IndexError::UnsupportedDestination(destination.to_string()))?;

        let state = self.current()?;
        // Hold the writer so no commit or swap lands mid-copy
        let _writer = state.writer.lock();
        if state.is_retired() {
            return Err(IndexError::Unavailable(self.name.clone()));
        }

        let target = dest_root
            .join(target_name)
            .join(state.version.to_string());
        fs::create_dir_all(&target)?;

        let mut copied = 0;
        for entry in fs::read_dir(&state.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let is_lock = file_name.to_string_lossy().starts_with(LOCK_FILE_PREFIX);
            if entry.metadata()?.is_file() && !is_lock {
                fs::copy(entry.path(), target.join(&file_name))?;
                copied += 1;
            }
        }

        info!(
            "Pushed {} file(s) of '{}' version {} to {:?}",
            copied, self.name, state.version, target
        );
        Ok(())
    }
}

/// Tantivy-backed physical index stored as `<root>/<version>/`.
///
/// The `*_sync` methods block on tantivy and the file system; the
/// [`IndexHandle`] methods run the same work on tokio's blocking pool.
pub struct LocalIndex {
    core: Arc<IndexCore>,
}

impl std::fmt::Debug for LocalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIndex")
            .field("name", &self.core.name)
            .field("root", &self.core.root)
            .field("version", &self.core.version())
            .field("online", &self.core.online.load(Ordering::Relaxed))
            .field("read_only", &self.core.read_only.load(Ordering::Relaxed))
            .finish()
    }
}

impl LocalIndex {
    /// Open the newest version under `root`, creating a first version if none exists
    pub fn open(name: &str, root: impl AsRef<Path>) -> IndexResult<Self> {
        Self::open_with_heap(name, root, DEFAULT_WRITER_HEAP_SIZE)
    }

    /// Open from configuration
    pub fn from_config(config: &IndexConfig, default_root: &Path) -> IndexResult<Self> {
        let root = config
            .path
            .clone()
            .unwrap_or_else(|| default_root.join(&config.name));
        let index = Self::open_with_heap(&config.name, root, config.writer_heap_size)?;
        index.set_online(config.online);
        index.set_read_only(config.read_only);
        Ok(index)
    }

    fn open_with_heap(name: &str, root: impl AsRef<Path>, heap_size: usize) -> IndexResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let schema = FileSchema::new();

        let state = match latest_version(&root)? {
            Some(version) => {
                info!("Using existing index '{}' version {}", name, version);
                IndexState::open(root.join(version.to_string()), version)?
            }
            None => {
                let version = new_version();
                info!("Creating new index '{}' version {}", name, version);
                IndexState::create(root.join(version.to_string()), version, &schema)?
            }
        };

        Ok(Self {
            core: Arc::new(IndexCore {
                name: name.to_string(),
                root,
                schema,
                writer_heap_size: heap_size,
                online: AtomicBool::new(true),
                read_only: AtomicBool::new(false),
                state: RwLock::new(Some(Arc::new(state))),
            }),
        })
    }

    /// Directory holding every version of this index
    pub fn root(&self) -> &Path {
        &self.core.root
    }

    /// Release the index; later calls fail with `Unavailable`
    pub fn close(&self) {
        if self.core.state.write().take().is_some() {
            info!("Index '{}' closed", self.core.name);
        }
    }

    pub fn update_documents_sync(&self, documents: &[IndexDocument]) -> IndexResult<()> {
        self.core.update_documents(documents)
    }

    pub fn delete_documents_sync(&self, unique_keys: &[String]) -> IndexResult<()> {
        self.core.delete_documents(unique_keys)
    }

    pub fn search_sync(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        self.core.search(request)
    }

    pub fn documents_sync(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>> {
        self.core.documents(unique_keys)
    }

    pub fn doc_freq_sync(&self, field: &str, text: &str) -> IndexResult<u64> {
        self.core.doc_freq(field, text)
    }

    pub fn optimize_sync(&self) -> IndexResult<()> {
        self.core.optimize()
    }

    pub fn statistics_sync(&self) -> IndexResult<IndexStatistics> {
        self.core.statistics()
    }

    pub fn swap_sync(&self, version: u64, delete_old: bool) -> IndexResult<()> {
        self.core.swap(version, delete_old)
    }

    pub fn reload_sync(&self) -> IndexResult<()> {
        self.core.reload()
    }

    pub fn receive_sync(
        &self,
        version: u64,
        file_name: &str,
        reader: &mut (dyn Read + Send),
    ) -> IndexResult<()> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.core.receive(version, file_name, &content)
    }

    pub fn push_sync(&self, target_name: &str, destination: &Url) -> IndexResult<()> {
        self.core.push(target_name, destination)
    }

    /// Run blocking index work off the async worker threads
    async fn blocking<T, F>(&self, f: F) -> IndexResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&IndexCore) -> IndexResult<T> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || f(&core)).await?
    }
}

#[async_trait]
impl IndexHandle for LocalIndex {
    fn name(&self) -> &str {
        &self.core.name
    }

    async fn update_document(&self, document: &IndexDocument) -> IndexResult<()> {
        let documents = vec![document.clone()];
        self.blocking(move |core| core.update_documents(&documents))
            .await
    }

    async fn update_documents(&self, documents: &[IndexDocument]) -> IndexResult<()> {
        let documents = documents.to_vec();
        self.blocking(move |core| core.update_documents(&documents))
            .await
    }

    async fn delete_documents(&self, unique_keys: &[String]) -> IndexResult<()> {
        let unique_keys = unique_keys.to_vec();
        self.blocking(move |core| core.delete_documents(&unique_keys))
            .await
    }

    async fn search(&self, request: &SearchRequest) -> IndexResult<SearchResult> {
        let request = request.clone();
        self.blocking(move |core| core.search(&request)).await
    }

    async fn documents(&self, unique_keys: &[String]) -> IndexResult<Vec<ResultDocument>> {
        let unique_keys = unique_keys.to_vec();
        self.blocking(move |core| core.documents(&unique_keys))
            .await
    }

    async fn doc_freq(&self, field: &str, text: &str) -> IndexResult<u64> {
        let (field, text) = (field.to_string(), text.to_string());
        self.blocking(move |core| core.doc_freq(&field, &text))
            .await
    }

    // A local index has no remote side, so `force_local` changes nothing
    async fn optimize(&self, _force_local: bool) -> IndexResult<()> {
        self.blocking(|core| core.optimize()).await
    }

    async fn statistics(&self) -> IndexResult<IndexStatistics> {
        self.blocking(|core| core.statistics()).await
    }

    fn version(&self) -> u64 {
        self.core.version()
    }

    async fn swap(&self, version: u64, delete_old: bool) -> IndexResult<()> {
        self.blocking(move |core| core.swap(version, delete_old))
            .await
    }

    async fn reload(&self) -> IndexResult<()> {
        self.blocking(|core| core.reload()).await
    }

    /// The stream is drained on the caller's task; only the write is offloaded
    async fn receive(
        &self,
        version: u64,
        file_name: &str,
        reader: &mut (dyn Read + Send),
    ) -> IndexResult<()> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let file_name = file_name.to_string();
        self.blocking(move |core| core.receive(version, &file_name, &content))
            .await
    }

    async fn push(&self, target_name: &str, destination: &Url) -> IndexResult<()> {
        let (target_name, destination) = (target_name.to_string(), destination.clone());
        self.blocking(move |core| core.push(&target_name, &destination))
            .await
    }

    fn is_online(&self) -> bool {
        self.core.online.load(Ordering::Relaxed)
    }

    fn is_read_only(&self) -> bool {
        self.core.read_only.load(Ordering::Relaxed)
    }

    fn set_online(&self, online: bool) {
        self.core.online.store(online, Ordering::Relaxed);
    }

    fn set_read_only(&self, read_only: bool) {
        self.core.read_only.store(read_only, Ordering::Relaxed);
    }
}

/// Newest complete version directory under `root`
fn latest_version(root: &Path) -> IndexResult<Option<u64>> {
    let mut latest = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Some(version) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        else {
            continue;
        };
        if entry.path().join(INDEX_METADATA_FILE).exists() {
            latest = latest.max(Some(version));
        }
    }
    Ok(latest)
}

fn new_version() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

fn check_plain_name(name: &str) -> IndexResult<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some();
    if plain {
        Ok(())
    } else {
        Err(IndexError::InvalidFileName(name.to_string()))
    }
}

/// Calculate index directory size
fn calculate_index_size(path: &Path) -> IndexResult<u64> {
    let mut total_size = 0u64;

    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                total_size += metadata.len();
            }
        }
    }

    Ok(total_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{DocumentRecord, IndexStatus};
    use crate::search::SearchGroup;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_index() -> (LocalIndex, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalIndex::open("test", temp_dir.path()).unwrap();
        (index, temp_dir)
    }

    fn create_test_document(path: &str, content: &str) -> IndexDocument {
        let mut record = DocumentRecord::create(path, path, 1, 2);
        record.set_index_status(IndexStatus::Indexed);
        let mut doc = record.to_index_fields();
        doc.set("content", content);
        doc
    }

    #[test]
    fn test_update_is_upsert_by_path() {
        let (index, _temp) = create_test_index();
        index
            .update_documents_sync(&[
                create_test_document("/a", "alpha words"),
                create_test_document("/b", "beta words"),
            ])
            .unwrap();
        index
            .update_documents_sync(&[create_test_document("/a", "alpha again")])
            .unwrap();

        let stats = index.statistics_sync().unwrap();
        assert_eq!(stats.num_docs, 2);

        let result = index.search_sync(&SearchRequest::new("again")).unwrap();
        assert_eq!(result.num_found, 1);
        assert_eq!(result.documents[0].fields.get_first("path"), Some("/a"));
        assert_eq!(result.documents[0].index, "test");
    }

    #[test]
    fn test_missing_unique_key_changes_nothing() {
        let (index, _temp) = create_test_index();
        let mut keyless = IndexDocument::new();
        keyless.set("content", "orphan");

        let result = index.update_documents_sync(&[create_test_document("/a", "x"), keyless]);
        assert!(matches!(result, Err(IndexError::MissingUniqueKey(_))));
        assert_eq!(index.statistics_sync().unwrap().num_docs, 0);
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let (index, _temp) = create_test_index();
        index
            .update_documents_sync(&[create_test_document("/a", "alpha")])
            .unwrap();
        index
            .delete_documents_sync(&["/missing".to_string()])
            .unwrap();
        assert_eq!(index.statistics_sync().unwrap().num_docs, 1);

        index.delete_documents_sync(&["/a".to_string()]).unwrap();
        assert_eq!(index.statistics_sync().unwrap().num_docs, 0);
    }

    #[test]
    fn test_read_only_and_offline_reject_writes() {
        let (index, _temp) = create_test_index();
        index.set_read_only(true);
        assert!(matches!(
            index.update_documents_sync(&[create_test_document("/a", "x")]),
            Err(IndexError::ReadOnly(_))
        ));

        index.set_read_only(false);
        index.set_online(false);
        assert!(matches!(
            index.delete_documents_sync(&["/a".to_string()]),
            Err(IndexError::Offline(_))
        ));
        assert!(matches!(
            index.search_sync(&SearchRequest::default()),
            Err(IndexError::Offline(_))
        ));
    }

    #[test]
    fn test_empty_query_matches_all_and_window() {
        let (index, _temp) = create_test_index();
        let docs: Vec<_> = (0..5)
            .map(|i| create_test_document(&format!("/doc/{i}"), "same text"))
            .collect();
        index.update_documents_sync(&docs).unwrap();

        let all = index.search_sync(&SearchRequest::new("").with_rows(10)).unwrap();
        assert_eq!(all.num_found, 5);
        assert_eq!(all.documents.len(), 5);

        let page = index
            .search_sync(&SearchRequest::new("").with_start(3).with_rows(10))
            .unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].rank, 3);
        assert_eq!(page.documents[0], all.documents[3]);

        let count_only = index
            .search_sync(&SearchRequest::new("text").with_rows(0))
            .unwrap();
        assert_eq!(count_only.num_found, 5);
        assert!(count_only.documents.is_empty());
    }

    #[test]
    fn test_records_rebuilt_from_results() {
        let (index, _temp) = create_test_index();
        let mut record = DocumentRecord::create("/share/a.txt", "/share/a.txt", 7, 8);
        record.set_content_length(Some(512)).unwrap();
        index
            .update_documents_sync(&[record.to_index_fields()])
            .unwrap();

        let found = index.documents_sync(&["/share/a.txt".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
        let rebuilt = DocumentRecord::from_index_fields(&found[0].fields).unwrap();
        assert_eq!(rebuilt, record);
    }

    #[test]
    fn test_doc_freq() {
        let (index, _temp) = create_test_index();
        index
            .update_documents_sync(&[
                create_test_document("/a", "rust search"),
                create_test_document("/b", "rust index"),
                create_test_document("/c", "python"),
            ])
            .unwrap();

        assert_eq!(index.doc_freq_sync("content", "rust").unwrap(), 2);
        assert_eq!(index.doc_freq_sync("path", "/c").unwrap(), 1);
        assert_eq!(index.doc_freq_sync("nope", "rust").unwrap(), 0);
    }

    #[test]
    fn test_optimize_merges_segments() {
        let (index, _temp) = create_test_index();
        for i in 0..3 {
            index
                .update_documents_sync(&[create_test_document(&format!("/{i}"), "text")])
                .unwrap();
        }
        index.optimize_sync().unwrap();

        let state = index.core.current().unwrap();
        assert_eq!(state.index.searchable_segment_ids().unwrap().len(), 1);
        assert_eq!(index.statistics_sync().unwrap().num_docs, 3);
    }

    #[test]
    fn test_close_makes_index_unavailable() {
        let (index, _temp) = create_test_index();
        index.close();
        assert_eq!(index.version(), 0);
        assert!(matches!(
            index.search_sync(&SearchRequest::default()),
            Err(IndexError::Unavailable(_))
        ));
    }

    #[test]
    fn test_reopen_uses_latest_version() {
        let temp_dir = TempDir::new().unwrap();
        let version = {
            let index = LocalIndex::open("persist", temp_dir.path()).unwrap();
            index
                .update_documents_sync(&[create_test_document("/a", "kept")])
                .unwrap();
            index.version()
        };

        let reopened = LocalIndex::open("persist", temp_dir.path()).unwrap();
        assert_eq!(reopened.version(), version);
        assert_eq!(reopened.statistics_sync().unwrap().num_docs, 1);
    }

    #[test]
    fn test_plain_name_check() {
        assert!(check_plain_name("meta.json").is_ok());
        assert!(check_plain_name("../meta.json").is_err());
        assert!(check_plain_name("a/b").is_err());
        assert!(check_plain_name("..").is_err());
        assert!(check_plain_name("").is_err());
    }

    #[test]
    fn test_push_rejects_remote_destination() {
        let (index, _temp) = create_test_index();
        let destination = Url::parse("http://replica.example.com/indexes").unwrap();
        assert!(matches!(
            index.push_sync("test", &destination),
            Err(IndexError::UnsupportedDestination(_))
        ));
    }

    #[test]
    fn test_oversized_window_is_bounded_by_index() {
        let (index, _temp) = create_test_index();
        index
            .update_documents_sync(&[create_test_document("/a", "lonely")])
            .unwrap();

        let wide = index
            .search_sync(&SearchRequest::new("lonely").with_rows(1usize << 40))
            .unwrap();
        assert_eq!(wide.num_found, 1);
        assert_eq!(wide.documents.len(), 1);

        let far = index
            .search_sync(
                &SearchRequest::new("lonely")
                    .with_start(usize::MAX)
                    .with_rows(usize::MAX),
            )
            .unwrap();
        assert_eq!(far.num_found, 1);
        assert!(far.documents.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_index_times_out_in_group() {
        let (index, _temp) = create_test_index();
        let index = Arc::new(index);
        let handles: Vec<Arc<dyn IndexHandle>> = vec![index.clone()];

        // A held state lock stalls the index on the blocking pool
        let stall = index.core.state.write();
        let result = SearchGroup::new(&handles, Duration::from_millis(50))
            .search(&SearchRequest::default())
            .await;
        drop(stall);

        assert_eq!(result.unwrap(), SearchResult::default());
        assert!(index.search(&SearchRequest::default()).await.is_ok());
    }

    #[test]
    fn test_swap_waits_for_inflight_write() {
        let (index, temp) = create_test_index();
        let index = Arc::new(index);
        let old = index.core.current().unwrap();
        let next_version = old.version + 1;
        IndexState::create(
            temp.path().join(next_version.to_string()),
            next_version,
            &index.core.schema,
        )
        .unwrap();

        let writer = old.writer.lock();
        let swapping = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || index.swap_sync(next_version, true))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(index.version(), old.version);
        assert!(!old.is_retired());
        assert!(old.dir.exists());

        drop(writer);
        swapping.join().unwrap().unwrap();

        assert!(old.is_retired());
        assert!(!old.dir.exists());
        assert_eq!(index.version(), next_version);

        index
            .update_documents_sync(&[create_test_document("/a", "after swap")])
            .unwrap();
        assert_eq!(index.statistics_sync().unwrap().num_docs, 1);
        assert_eq!(index.core.current().unwrap().version, next_version);
    }
}
