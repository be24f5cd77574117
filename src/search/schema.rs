use tantivy::schema::{Field, STORED, STRING, Schema, TEXT};

use crate::crawl::{CONTENT_FIELD, FileItemField};

/// Crawled file index schema definition
#[derive(Clone, Debug)]
pub struct FileSchema {
    pub schema: Schema,
    /// Unique key used for upserts and deletes
    pub path: Field,
    /// Parsed text (indexed, not stored)
    pub content: Field,
    stored: Vec<(FileItemField, Field)>,
}

impl FileSchema {
    /// Create a new file schema
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        // Every record attribute is stored verbatim so records can be rebuilt
        // from search results; STRING keeps the fixed-width values sortable.
        let path = builder.add_text_field(FileItemField::Path.name(), STRING | STORED);
        let mut stored = vec![(FileItemField::Path, path)];
        for field in FileItemField::ALL {
            if field != FileItemField::Path {
                stored.push((field, builder.add_text_field(field.name(), STRING | STORED)));
            }
        }

        let content = builder.add_text_field(CONTENT_FIELD, TEXT);

        let schema = builder.build();

        Self {
            schema,
            path,
            content,
            stored,
        }
    }

    /// Stored fields with their index document names
    pub fn stored_fields(&self) -> impl Iterator<Item = (&'static str, Field)> + '_ {
        self.stored.iter().map(|(field, handle)| (field.name(), *handle))
    }

    /// Resolve an index document field name
    pub fn field(&self, name: &str) -> Option<Field> {
        self.schema.get_field(name).ok()
    }

    /// Name of the unique key field
    pub fn unique_key(&self) -> &'static str {
        FileItemField::Path.name()
    }

    /// Fields searched when a query names none
    pub fn default_search_fields(&self) -> Vec<Field> {
        vec![self.content]
    }
}

impl Default for FileSchema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let schema = FileSchema::new();

        // Verify all fields exist
        for field in FileItemField::ALL {
            assert!(schema.schema.get_field(field.name()).is_ok());
        }
        assert!(schema.schema.get_field("content").is_ok());
        assert_eq!(schema.stored_fields().count(), FileItemField::ALL.len());
    }

    #[test]
    fn test_unique_key_is_path() {
        let schema = FileSchema::new();
        assert_eq!(schema.unique_key(), "path");
        assert_eq!(schema.field("path"), Some(schema.path));
        assert_eq!(schema.field("nope"), None);
    }

    #[test]
    fn test_default_search_fields() {
        let schema = FileSchema::new();
        assert_eq!(schema.default_search_fields(), vec![schema.content]);
    }
}
