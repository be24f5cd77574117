pub mod config;
pub mod crawl;
pub mod error;
pub mod search;

pub use config::{IndexConfig, RouterConfig};
pub use error::{ConfigError, GroupFailure, IndexError, IndexResult, RecordError};
