// Module declarations
pub mod fields;
pub mod file_item;
pub mod status;

// Re-export public APIs
pub use fields::{CONTENT_FIELD, FileItemField, IndexDocument};
pub use file_item::DocumentRecord;
pub use status::{FetchStatus, IndexStatus, InjectionStatus, ParserStatus};
