use std::fmt;
use thiserror::Error;

/// Errors raised while building or reconstructing a document record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The value parsed as an integer but is not a known status code
    #[error("unknown {kind} status code {code}")]
    InvalidStatus { kind: &'static str, code: i64 },

    #[error("malformed value '{value}' for field {field}")]
    MalformedField { field: &'static str, value: String },

    #[error("value {value} does not fit the fixed width of field {field}")]
    OutOfRange { field: &'static str, value: u64 },
}

/// Errors raised by an index handle or a group of handles
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index '{0}' is read-only")]
    ReadOnly(String),

    #[error("index '{0}' is offline")]
    Offline(String),

    /// Transient: the handle is closed or between versions
    #[error("index '{0}' is unavailable")]
    Unavailable(String),

    #[error("document has no value for unique key '{0}'")]
    MissingUniqueKey(String),

    #[error("invalid replication file name '{0}'")]
    InvalidFileName(String),

    #[error("unsupported push destination '{0}'")]
    UnsupportedDestination(String),

    #[error("no index named '{0}'")]
    NoSuchIndex(String),

    #[error("search on index '{0}' timed out")]
    Timeout(String),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Query parser error: {0}")]
    QueryParser(#[from] tantivy::query::QueryParserError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Group(GroupFailure),
}

impl IndexError {
    /// Whether the handle may serve again shortly without intervention
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Offline(_) | IndexError::Unavailable(_) | IndexError::Timeout(_) => true,
            IndexError::Group(failure) => failure.failures.iter().all(|(_, e)| e.is_transient()),
            _ => false,
        }
    }
}

/// Per-handle failures collected during a broadcast
#[derive(Debug, Default)]
pub struct GroupFailure {
    pub failures: Vec<(String, IndexError)>,
}

impl GroupFailure {
    pub fn push(&mut self, index_name: impl Into<String>, error: IndexError) {
        self.failures.push((index_name.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the handles that failed, in handle order
    pub fn index_names(&self) -> Vec<&str> {
        self.failures.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// `Ok(())` when nothing failed, otherwise the combined error
    pub fn into_result(self) -> Result<(), IndexError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(IndexError::Group(self))
        }
    }
}

impl fmt::Display for GroupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} index(es) failed:", self.failures.len())?;
        for (name, error) in &self.failures {
            write!(f, " [{name}: {error}]")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("index name must not be empty")]
    EmptyIndexName,

    #[error("index '{0}' is configured more than once")]
    DuplicateIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;
