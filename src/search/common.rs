use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use tantivy::{TantivyDocument, schema::Value};
use tracing::debug;

use super::schema::FileSchema;
use crate::crawl::IndexDocument;

// ============================================================================
// Constants
// ============================================================================

/// Default heap size for index writer (50MB)
pub const DEFAULT_WRITER_HEAP_SIZE: usize = 50_000_000;

/// Minimum heap size for tantivy 0.24 (15MB)
pub const MIN_WRITER_HEAP_SIZE: usize = 15_000_000;

/// Default number of rows returned by a search
pub const DEFAULT_ROWS: usize = 10;

/// Default per-index search timeout for group searches
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5_000;

/// Search request addressed to one handle or a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query string; empty matches every document
    pub query: String,
    /// Offset of the first returned document
    pub start: usize,
    /// Number of documents to return
    pub rows: usize,
}

impl SearchRequest {
    /// Create new search request with a query
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            start: 0,
            rows: DEFAULT_ROWS,
        }
    }

    /// Set start offset
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Set row count
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Exclusive end of the result window
    pub fn window_end(&self) -> usize {
        self.start.saturating_add(self.rows)
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self::new("")
    }
}

/// One hit, tagged with the index that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub index: String,
    pub score: f32,
    /// Position within the producing index's own ranking
    pub rank: usize,
    pub fields: IndexDocument,
}

/// Search result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub documents: Vec<ResultDocument>,
    /// Total matches, before windowing
    pub num_found: u64,
    pub max_score: f32,
}

/// Index statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub max_doc: u64,
    pub num_docs: u64,
    pub num_deleted_docs: u64,
    pub size_bytes: u64,
}

impl AddAssign for IndexStatistics {
    fn add_assign(&mut self, other: Self) {
        self.max_doc += other.max_doc;
        self.num_docs += other.num_docs;
        self.num_deleted_docs += other.num_deleted_docs;
        self.size_bytes += other.size_bytes;
    }
}

impl Add for IndexStatistics {
    type Output = IndexStatistics;

    fn add(mut self, other: Self) -> Self::Output {
        self += other;
        self
    }
}

impl Sum for IndexStatistics {
    fn sum<I: Iterator<Item = IndexStatistics>>(iter: I) -> Self {
        iter.fold(IndexStatistics::default(), Add::add)
    }
}

/// Common stored document to index fields conversion
pub fn doc_to_fields(doc: &TantivyDocument, schema: &FileSchema) -> IndexDocument {
    let mut fields = IndexDocument::new();
    for (name, field) in schema.stored_fields() {
        for value in doc.get_all(field) {
            if let Some(text) = value.as_str() {
                fields.add(name, text);
            }
        }
    }
    fields
}

/// Build a tantivy document, skipping fields the schema does not know
pub fn fields_to_doc(fields: &IndexDocument, schema: &FileSchema) -> TantivyDocument {
    let mut doc = TantivyDocument::new();
    for (name, values) in fields.iter() {
        match schema.field(name) {
            Some(field) => {
                for value in values {
                    doc.add_text(field, value);
                }
            }
            None => debug!("Skipping field '{}' unknown to the schema", name),
        }
    }
    doc
}
