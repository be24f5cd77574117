// Module declarations
pub mod aggregator;
pub mod common;
pub mod group;
pub mod handle;
pub mod local_index;
pub mod schema;

// Re-export public APIs
pub use aggregator::{SearchGroup, merge_results};
pub use common::{IndexStatistics, ResultDocument, SearchRequest, SearchResult};
pub use group::IndexGroup;
pub use handle::IndexHandle;
pub use local_index::LocalIndex;
pub use schema::FileSchema;
