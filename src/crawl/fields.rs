use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width of the zero-padded content length stored in the index
pub const CONTENT_LENGTH_WIDTH: usize = 14;

/// Largest content length that fits [`CONTENT_LENGTH_WIDTH`] digits
pub const MAX_CONTENT_LENGTH: u64 = 99_999_999_999_999;

/// Stored format of the `when` field (14 characters)
pub const WHEN_FORMAT: &str = "%Y%m%d%H%M%S";

/// Free text field filled by the parser stage
pub const CONTENT_FIELD: &str = "content";

/// Stored fields of a crawled file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileItemField {
    Path,
    OriginalPath,
    When,
    CrawlDate,
    FileSystemDate,
    ResponseCode,
    ContentBaseType,
    ContentTypeCharset,
    ContentLength,
    ContentEncoding,
    Lang,
    LangMethod,
    FetchStatus,
    ParserStatus,
    IndexStatus,
}

impl FileItemField {
    pub const ALL: [FileItemField; 15] = [
        FileItemField::Path,
        FileItemField::OriginalPath,
        FileItemField::When,
        FileItemField::CrawlDate,
        FileItemField::FileSystemDate,
        FileItemField::ResponseCode,
        FileItemField::ContentBaseType,
        FileItemField::ContentTypeCharset,
        FileItemField::ContentLength,
        FileItemField::ContentEncoding,
        FileItemField::Lang,
        FileItemField::LangMethod,
        FileItemField::FetchStatus,
        FileItemField::ParserStatus,
        FileItemField::IndexStatus,
    ];

    /// Field name used in index documents
    pub fn name(self) -> &'static str {
        match self {
            FileItemField::Path => "path",
            FileItemField::OriginalPath => "originalPath",
            FileItemField::When => "when",
            FileItemField::CrawlDate => "crawlDate",
            FileItemField::FileSystemDate => "fileSystemDate",
            FileItemField::ResponseCode => "responseCode",
            FileItemField::ContentBaseType => "contentBaseType",
            FileItemField::ContentTypeCharset => "contentTypeCharset",
            FileItemField::ContentLength => "contentLength",
            FileItemField::ContentEncoding => "contentEncoding",
            FileItemField::Lang => "lang",
            FileItemField::LangMethod => "langMethod",
            FileItemField::FetchStatus => "fetchStatus",
            FileItemField::ParserStatus => "parserStatus",
            FileItemField::IndexStatus => "indexStatus",
        }
    }
}

/// Flat field -> values mapping exchanged with the index layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    fields: BTreeMap<String, Vec<String>>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `field` with `value`
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), vec![value.into()]);
    }

    /// Append a value to `field`
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(value.into());
    }

    pub fn get_first(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Format a content length as a fixed-width decimal (lexicographic order == numeric order).
/// `None` above [`MAX_CONTENT_LENGTH`].
pub fn format_content_length(length: u64) -> Option<String> {
    (length <= MAX_CONTENT_LENGTH)
        .then(|| format!("{:0width$}", length, width = CONTENT_LENGTH_WIDTH))
}

pub fn parse_content_length(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|length| *length <= MAX_CONTENT_LENGTH)
}

pub fn format_when(when: &DateTime<Utc>) -> String {
    when.format(WHEN_FORMAT).to_string()
}

pub fn parse_when(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), WHEN_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
