use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use tracing::warn;
use url::Url;

use super::fields::{
    FileItemField, IndexDocument, MAX_CONTENT_LENGTH, format_content_length, format_when,
    parse_content_length, parse_when,
};
use super::status::{FetchStatus, IndexStatus, InjectionStatus, ParserStatus};
use crate::error::RecordError;

/// Lazily resolved `file://` form of the record path
#[derive(Debug, Default, Clone)]
struct UriCache {
    dirty: bool,
    uri: Option<Url>,
}

/// A crawled file and the state of its fetch, parse and index stages
#[derive(Debug, Serialize)]
pub struct DocumentRecord {
    path: String,
    original_path: String,
    content_base_type: Option<String>,
    content_type_charset: Option<String>,
    content_length: Option<u64>,
    content_encoding: Option<String>,
    lang: Option<String>,
    lang_method: Option<String>,
    when: DateTime<Utc>,
    fetch_status: FetchStatus,
    response_code: Option<i32>,
    parser_status: ParserStatus,
    index_status: IndexStatus,
    file_system_date: i64,
    crawl_date: i64,
    status: InjectionStatus,
    #[serde(skip)]
    canonical: Mutex<UriCache>,
}

impl DocumentRecord {
    /// Create a record at discovery time
    pub fn create(
        path: impl Into<String>,
        original_path: impl Into<String>,
        crawl_date: i64,
        file_system_date: i64,
    ) -> Self {
        Self {
            path: path.into(),
            original_path: original_path.into(),
            content_base_type: None,
            content_type_charset: None,
            content_length: None,
            content_encoding: None,
            lang: None,
            lang_method: None,
            when: now(),
            fetch_status: FetchStatus::default(),
            response_code: None,
            parser_status: ParserStatus::default(),
            index_status: IndexStatus::default(),
            file_system_date,
            crawl_date,
            status: InjectionStatus::default(),
            canonical: Mutex::new(UriCache {
                dirty: true,
                uri: None,
            }),
        }
    }

    /// Rebuild a record from its stored index fields.
    ///
    /// Malformed values are logged and left at their defaults. A status that
    /// parses as an integer but is not a known code is an error.
    pub fn from_index_fields(doc: &IndexDocument) -> Result<Self, RecordError> {
        let text = |field: FileItemField| doc.get_first(field.name()).map(str::to_string);

        let mut record = Self::create(
            text(FileItemField::Path).unwrap_or_default(),
            text(FileItemField::OriginalPath).unwrap_or_default(),
            0,
            0,
        );

        record.content_base_type = text(FileItemField::ContentBaseType);
        record.content_type_charset = text(FileItemField::ContentTypeCharset);
        record.content_encoding = text(FileItemField::ContentEncoding);
        record.lang = text(FileItemField::Lang);
        record.lang_method = text(FileItemField::LangMethod);

        if let Some(value) = doc.get_first(FileItemField::ContentLength.name()) {
            if !value.is_empty() {
                match parse_content_length(value) {
                    Some(length) => record.content_length = Some(length),
                    None => log_malformed(FileItemField::ContentLength, value),
                }
            }
        }

        if let Some(value) = doc.get_first(FileItemField::When.name()) {
            match parse_when(value) {
                Some(when) => record.when = when,
                None => log_malformed(FileItemField::When, value),
            }
        }

        if let Some(value) = doc.get_first(FileItemField::ResponseCode.name()) {
            match value.trim().parse::<i32>() {
                Ok(code) => record.response_code = Some(code),
                Err(_) => log_malformed(FileItemField::ResponseCode, value),
            }
        }

        if let Some(date) = parse_long(doc, FileItemField::CrawlDate) {
            record.crawl_date = date;
        }
        if let Some(date) = parse_long(doc, FileItemField::FileSystemDate) {
            record.file_system_date = date;
        }

        if let Some(code) = parse_long(doc, FileItemField::FetchStatus) {
            record.fetch_status = FetchStatus::from_code(code)?;
        }
        if let Some(code) = parse_long(doc, FileItemField::ParserStatus) {
            record.parser_status = ParserStatus::from_code(code)?;
        }
        if let Some(code) = parse_long(doc, FileItemField::IndexStatus) {
            record.index_status = IndexStatus::from_code(code)?;
        }

        Ok(record)
    }

    /// Flatten the record into index fields. Unset optional fields are omitted.
    pub fn to_index_fields(&self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        doc.set(FileItemField::Path.name(), &self.path);
        doc.set(FileItemField::OriginalPath.name(), &self.original_path);
        doc.set(FileItemField::When.name(), format_when(&self.when));
        doc.set(FileItemField::CrawlDate.name(), self.crawl_date.to_string());
        doc.set(
            FileItemField::FileSystemDate.name(),
            self.file_system_date.to_string(),
        );

        if let Some(code) = self.response_code {
            doc.set(FileItemField::ResponseCode.name(), code.to_string());
        }
        if let Some(length) = self.content_length.and_then(format_content_length) {
            doc.set(FileItemField::ContentLength.name(), length);
        }

        let optional = [
            (FileItemField::ContentBaseType, &self.content_base_type),
            (FileItemField::ContentTypeCharset, &self.content_type_charset),
            (FileItemField::ContentEncoding, &self.content_encoding),
            (FileItemField::Lang, &self.lang),
            (FileItemField::LangMethod, &self.lang_method),
        ];
        for (field, value) in optional {
            if let Some(value) = value {
                doc.set(field.name(), value);
            }
        }

        doc.set(
            FileItemField::FetchStatus.name(),
            self.fetch_status.code().to_string(),
        );
        doc.set(
            FileItemField::ParserStatus.name(),
            self.parser_status.code().to_string(),
        );
        doc.set(
            FileItemField::IndexStatus.name(),
            self.index_status.code().to_string(),
        );
        doc
    }

    /// `file://` URI of the path, computed once per path assignment
    pub fn resolved_canonical_path(&self) -> Option<Url> {
        let mut cache = self.canonical.lock();
        if cache.dirty {
            cache.uri = file_uri(&self.path);
            cache.dirty = false;
        }
        cache.uri.clone()
    }

    /// All three pipeline stages reached their terminal state
    pub fn is_complete(&self) -> bool {
        self.fetch_status == FetchStatus::Fetched
            && self.parser_status == ParserStatus::Parsed
            && self.index_status == IndexStatus::Indexed
    }

    /// Language followed by the detection method, e.g. `en(ngram)`
    pub fn full_lang(&self) -> String {
        let mut full = self.lang.clone().unwrap_or_default();
        if let Some(method) = &self.lang_method {
            full.push('(');
            full.push_str(method);
            full.push(')');
        }
        full
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
        let cache = self.canonical.get_mut();
        cache.dirty = true;
        cache.uri = None;
    }

    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn set_original_path(&mut self, original_path: impl Into<String>) {
        self.original_path = original_path.into();
    }

    pub fn content_base_type(&self) -> Option<&str> {
        self.content_base_type.as_deref()
    }

    pub fn set_content_base_type(&mut self, value: Option<String>) {
        self.content_base_type = value;
    }

    pub fn content_type_charset(&self) -> Option<&str> {
        self.content_type_charset.as_deref()
    }

    pub fn set_content_type_charset(&mut self, value: Option<String>) {
        self.content_type_charset = value;
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Lengths above [`MAX_CONTENT_LENGTH`] do not fit the stored width
    pub fn set_content_length(&mut self, value: Option<u64>) -> Result<(), RecordError> {
        if let Some(length) = value.filter(|length| *length > MAX_CONTENT_LENGTH) {
            return Err(RecordError::OutOfRange {
                field: FileItemField::ContentLength.name(),
                value: length,
            });
        }
        self.content_length = value;
        Ok(())
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn set_content_encoding(&mut self, value: Option<String>) {
        self.content_encoding = value;
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn set_lang(&mut self, value: Option<String>) {
        self.lang = value;
    }

    pub fn lang_method(&self) -> Option<&str> {
        self.lang_method.as_deref()
    }

    pub fn set_lang_method(&mut self, value: Option<String>) {
        self.lang_method = value;
    }

    pub fn when(&self) -> DateTime<Utc> {
        self.when
    }

    /// Stored with second precision to match the persisted format
    pub fn set_when(&mut self, when: DateTime<Utc>) {
        self.when = when.trunc_subsecs(0);
    }

    pub fn set_when_now(&mut self) {
        self.when = now();
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.fetch_status
    }

    pub fn set_fetch_status(&mut self, status: FetchStatus) {
        self.fetch_status = status;
    }

    pub fn set_fetch_status_code(&mut self, code: i64) -> Result<(), RecordError> {
        self.fetch_status = FetchStatus::from_code(code)?;
        Ok(())
    }

    pub fn response_code(&self) -> Option<i32> {
        self.response_code
    }

    pub fn set_response_code(&mut self, value: Option<i32>) {
        self.response_code = value;
    }

    pub fn parser_status(&self) -> ParserStatus {
        self.parser_status
    }

    pub fn set_parser_status(&mut self, status: ParserStatus) {
        self.parser_status = status;
    }

    pub fn set_parser_status_code(&mut self, code: i64) -> Result<(), RecordError> {
        self.parser_status = ParserStatus::from_code(code)?;
        Ok(())
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index_status
    }

    pub fn set_index_status(&mut self, status: IndexStatus) {
        self.index_status = status;
    }

    pub fn set_index_status_code(&mut self, code: i64) -> Result<(), RecordError> {
        self.index_status = IndexStatus::from_code(code)?;
        Ok(())
    }

    pub fn file_system_date(&self) -> i64 {
        self.file_system_date
    }

    pub fn set_file_system_date(&mut self, date: i64) {
        self.file_system_date = date;
    }

    pub fn crawl_date(&self) -> i64 {
        self.crawl_date
    }

    pub fn set_crawl_date(&mut self, date: i64) {
        self.crawl_date = date;
    }

    pub fn status(&self) -> InjectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: InjectionStatus) {
        self.status = status;
    }
}

impl Clone for DocumentRecord {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            original_path: self.original_path.clone(),
            content_base_type: self.content_base_type.clone(),
            content_type_charset: self.content_type_charset.clone(),
            content_length: self.content_length,
            content_encoding: self.content_encoding.clone(),
            lang: self.lang.clone(),
            lang_method: self.lang_method.clone(),
            when: self.when,
            fetch_status: self.fetch_status,
            response_code: self.response_code,
            parser_status: self.parser_status,
            index_status: self.index_status,
            file_system_date: self.file_system_date,
            crawl_date: self.crawl_date,
            status: self.status,
            canonical: Mutex::new(self.canonical.lock().clone()),
        }
    }
}

// The URI cache is derived state and takes no part in equality.
impl PartialEq for DocumentRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.original_path == other.original_path
            && self.content_base_type == other.content_base_type
            && self.content_type_charset == other.content_type_charset
            && self.content_length == other.content_length
            && self.content_encoding == other.content_encoding
            && self.lang == other.lang
            && self.lang_method == other.lang_method
            && self.when == other.when
            && self.fetch_status == other.fetch_status
            && self.response_code == other.response_code
            && self.parser_status == other.parser_status
            && self.index_status == other.index_status
            && self.file_system_date == other.file_system_date
            && self.crawl_date == other.crawl_date
            && self.status == other.status
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn file_uri(path: &str) -> Option<Url> {
    let absolute = std::path::absolute(Path::new(path)).ok()?;
    Url::from_file_path(absolute).ok()
}

fn log_malformed(field: FileItemField, value: &str) {
    let error = RecordError::MalformedField {
        field: field.name(),
        value: value.to_string(),
    };
    warn!("Keeping default while rebuilding record: {}", error);
}

fn parse_long(doc: &IndexDocument, field: FileItemField) -> Option<i64> {
    let value = doc.get_first(field.name())?;
    match value.trim().parse::<i64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log_malformed(field, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn create_full_record() -> DocumentRecord {
        let mut record = DocumentRecord::create(
            "/srv/share/report.pdf",
            "/srv/share/./report.pdf",
            1_700_000_000_000,
            1_690_000_000_000,
        );
        record.set_content_base_type(Some("application/pdf".to_string()));
        record.set_content_type_charset(Some("UTF-8".to_string()));
        record.set_content_length(Some(48_213)).unwrap();
        record.set_content_encoding(Some("gzip".to_string()));
        record.set_lang(Some("en".to_string()));
        record.set_lang_method(Some("ngram".to_string()));
        record.set_when(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap());
        record.set_fetch_status(FetchStatus::Fetched);
        record.set_response_code(Some(200));
        record.set_parser_status(ParserStatus::Parsed);
        record.set_index_status(IndexStatus::Indexed);
        record
    }

    #[test]
    fn test_create_defaults() {
        let record = DocumentRecord::create("/a", "/a", 10, 20);
        assert_eq!(record.fetch_status(), FetchStatus::UnFetched);
        assert_eq!(record.parser_status(), ParserStatus::NotParsed);
        assert_eq!(record.index_status(), IndexStatus::NotIndexed);
        assert_eq!(record.status(), InjectionStatus::Undefined);
        assert_eq!(record.crawl_date(), 10);
        assert_eq!(record.file_system_date(), 20);
        assert!(!record.is_complete());
    }

    #[test]
    fn test_is_complete_requires_all_stages() {
        let mut record = DocumentRecord::create("/a", "/a", 0, 0);
        record.set_fetch_status(FetchStatus::Fetched);
        record.set_parser_status(ParserStatus::Parsed);
        assert!(!record.is_complete());
        record.set_index_status(IndexStatus::Indexed);
        assert!(record.is_complete());
    }

    #[test]
    fn test_index_fields_round_trip() {
        let record = create_full_record();
        let fields = record.to_index_fields();

        assert_eq!(fields.get_first("contentLength"), Some("00000000048213"));
        assert_eq!(fields.get_first("when"), Some("20240501123045"));
        assert_eq!(fields.get_first("fetchStatus"), Some("1"));

        let rebuilt = DocumentRecord::from_index_fields(&fields).unwrap();
        assert_eq!(rebuilt, record);
        assert_eq!(rebuilt.to_index_fields(), fields);
    }

    #[test]
    fn test_round_trip_of_fresh_record() {
        let record = DocumentRecord::create("relative/file.txt", "file.txt", 5, 6);
        let rebuilt = DocumentRecord::from_index_fields(&record.to_index_fields()).unwrap();
        assert_eq!(rebuilt, record);
    }

    #[test]
    fn test_unset_optional_fields_are_omitted() {
        let record = DocumentRecord::create("/a", "/b", 0, 0);
        let fields = record.to_index_fields();
        assert!(!fields.contains("contentLength"));
        assert!(!fields.contains("responseCode"));
        assert!(!fields.contains("lang"));
        assert!(fields.contains("path"));
        assert!(fields.contains("indexStatus"));
    }

    #[test]
    fn test_content_length_limited_to_stored_width() {
        let mut record = create_full_record();
        record.set_content_length(Some(99_999_999_999_999)).unwrap();
        let fields = record.to_index_fields();
        assert_eq!(fields.get_first("contentLength"), Some("99999999999999"));

        assert_eq!(
            record.set_content_length(Some(100_000_000_000_000)),
            Err(RecordError::OutOfRange {
                field: "contentLength",
                value: 100_000_000_000_000
            })
        );
        assert!(record.set_content_length(Some(123_456_789_012_345_678)).is_err());
        // rejected values leave the previous length in place
        assert_eq!(record.content_length(), Some(99_999_999_999_999));

        let mut oversized = fields;
        oversized.set("contentLength", "123456789012345678");
        let rebuilt = DocumentRecord::from_index_fields(&oversized).unwrap();
        assert_eq!(rebuilt.content_length(), None);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let mut fields = create_full_record().to_index_fields();
        fields.set("contentLength", "12ab");
        fields.set("crawlDate", "yesterday");
        fields.set("fetchStatus", "fetched");
        fields.set("responseCode", "OK");

        let rebuilt = DocumentRecord::from_index_fields(&fields).unwrap();
        assert_eq!(rebuilt.content_length(), None);
        assert_eq!(rebuilt.crawl_date(), 0);
        assert_eq!(rebuilt.fetch_status(), FetchStatus::UnFetched);
        assert_eq!(rebuilt.response_code(), None);
        // untouched fields survive
        assert_eq!(rebuilt.parser_status(), ParserStatus::Parsed);
        assert_eq!(rebuilt.lang(), Some("en"));
    }

    #[test]
    fn test_unknown_status_code_is_distinct_error() {
        let mut fields = create_full_record().to_index_fields();
        fields.set("indexStatus", "99");

        let error = DocumentRecord::from_index_fields(&fields).unwrap_err();
        assert_eq!(
            error,
            RecordError::InvalidStatus {
                kind: "index",
                code: 99
            }
        );
    }

    #[test]
    fn test_status_code_setters() {
        let mut record = DocumentRecord::create("/a", "/a", 0, 0);
        record.set_parser_status_code(2).unwrap();
        assert_eq!(record.parser_status(), ParserStatus::ParserError);

        assert!(record.set_fetch_status_code(42).is_err());
        assert_eq!(record.fetch_status(), FetchStatus::UnFetched);
        assert!(record.set_index_status_code(-3).is_err());
    }

    #[test]
    fn test_full_lang() {
        let mut record = DocumentRecord::create("/a", "/a", 0, 0);
        assert_eq!(record.full_lang(), "");
        record.set_lang(Some("fr".to_string()));
        assert_eq!(record.full_lang(), "fr");
        record.set_lang_method(Some("meta".to_string()));
        assert_eq!(record.full_lang(), "fr(meta)");
    }

    #[test]
    fn test_canonical_path_recomputed_after_set_path() {
        let mut record = DocumentRecord::create("/data/old.txt", "/data/old.txt", 0, 0);
        let first = record.resolved_canonical_path().unwrap();
        assert!(first.as_str().ends_with("/data/old.txt"));
        assert_eq!(first.scheme(), "file");

        record.set_path("/data/new file.txt");
        let second = record.resolved_canonical_path().unwrap();
        assert!(second.as_str().ends_with("/data/new%20file.txt"));
    }

    #[test]
    fn test_canonical_path_concurrent_readers() {
        let record = Arc::new(DocumentRecord::create("/var/crawl/a.html", "/a", 0, 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let record = Arc::clone(&record);
                std::thread::spawn(move || record.resolved_canonical_path())
            })
            .collect();

        let expected = record.resolved_canonical_path();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
