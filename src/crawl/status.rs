use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RecordError;

/// Fetch stage of a crawled document.
///
/// The integer codes are persisted in index documents and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FetchStatus {
    #[default]
    UnFetched,
    Fetched,
    FetchFirst,
    NotAllowed,
    RedirTemp,
    RedirPerm,
    Error,
    Gone,
    HttpError,
    UrlError,
    SizeExceed,
}

impl FetchStatus {
    pub fn code(self) -> i32 {
        match self {
            FetchStatus::UnFetched => 0,
            FetchStatus::Fetched => 1,
            FetchStatus::FetchFirst => 2,
            FetchStatus::NotAllowed => 3,
            FetchStatus::RedirTemp => 4,
            FetchStatus::RedirPerm => 5,
            FetchStatus::Error => 6,
            FetchStatus::Gone => 7,
            FetchStatus::HttpError => 8,
            FetchStatus::UrlError => 9,
            FetchStatus::SizeExceed => 10,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, RecordError> {
        Ok(match code {
            0 => FetchStatus::UnFetched,
            1 => FetchStatus::Fetched,
            2 => FetchStatus::FetchFirst,
            3 => FetchStatus::NotAllowed,
            4 => FetchStatus::RedirTemp,
            5 => FetchStatus::RedirPerm,
            6 => FetchStatus::Error,
            7 => FetchStatus::Gone,
            8 => FetchStatus::HttpError,
            9 => FetchStatus::UrlError,
            10 => FetchStatus::SizeExceed,
            _ => return Err(RecordError::InvalidStatus { kind: "fetch", code }),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FetchStatus::UnFetched => "Unfetched",
            FetchStatus::Fetched => "Fetched",
            FetchStatus::FetchFirst => "Fetch first",
            FetchStatus::NotAllowed => "Not allowed",
            FetchStatus::RedirTemp => "Temporary redirect",
            FetchStatus::RedirPerm => "Permanent redirect",
            FetchStatus::Error => "Error",
            FetchStatus::Gone => "Gone",
            FetchStatus::HttpError => "HTTP error",
            FetchStatus::UrlError => "URL error",
            FetchStatus::SizeExceed => "Size exceeded",
        }
    }
}

/// Parse stage of a crawled document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParserStatus {
    #[default]
    NotParsed,
    Parsed,
    ParserError,
    NoParser,
}

impl ParserStatus {
    pub fn code(self) -> i32 {
        match self {
            ParserStatus::NotParsed => 0,
            ParserStatus::Parsed => 1,
            ParserStatus::ParserError => 2,
            ParserStatus::NoParser => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, RecordError> {
        Ok(match code {
            0 => ParserStatus::NotParsed,
            1 => ParserStatus::Parsed,
            2 => ParserStatus::ParserError,
            3 => ParserStatus::NoParser,
            _ => return Err(RecordError::InvalidStatus { kind: "parser", code }),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ParserStatus::NotParsed => "Not parsed",
            ParserStatus::Parsed => "Parsed",
            ParserStatus::ParserError => "Parser error",
            ParserStatus::NoParser => "No parser",
        }
    }
}

/// Index stage of a crawled document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexStatus {
    #[default]
    NotIndexed,
    Indexed,
    MetaNoIndex,
    IndexError,
    PluginRejected,
    NothingToIndex,
}

impl IndexStatus {
    pub fn code(self) -> i32 {
        match self {
            IndexStatus::NotIndexed => 0,
            IndexStatus::Indexed => 1,
            IndexStatus::MetaNoIndex => 2,
            IndexStatus::IndexError => 3,
            IndexStatus::PluginRejected => 4,
            IndexStatus::NothingToIndex => 5,
        }
    }

    pub fn from_code(code: i64) -> Result<Self, RecordError> {
        Ok(match code {
            0 => IndexStatus::NotIndexed,
            1 => IndexStatus::Indexed,
            2 => IndexStatus::MetaNoIndex,
            3 => IndexStatus::IndexError,
            4 => IndexStatus::PluginRejected,
            5 => IndexStatus::NothingToIndex,
            _ => return Err(RecordError::InvalidStatus { kind: "index", code }),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            IndexStatus::NotIndexed => "Not indexed",
            IndexStatus::Indexed => "Indexed",
            IndexStatus::MetaNoIndex => "Meta no index",
            IndexStatus::IndexError => "Index error",
            IndexStatus::PluginRejected => "Rejected by plugin",
            IndexStatus::NothingToIndex => "Nothing to index",
        }
    }
}

/// Outcome of injecting a record into the crawl database. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InjectionStatus {
    #[default]
    Undefined,
    Injected,
    Already,
    Error,
}

impl InjectionStatus {
    pub fn name(self) -> &'static str {
        match self {
            InjectionStatus::Undefined => "Undefined",
            InjectionStatus::Injected => "Injected",
            InjectionStatus::Already => "Already injected",
            InjectionStatus::Error => "Unknown error",
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ParserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for InjectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_done() {
        assert_eq!(FetchStatus::default(), FetchStatus::UnFetched);
        assert_eq!(ParserStatus::default(), ParserStatus::NotParsed);
        assert_eq!(IndexStatus::default(), IndexStatus::NotIndexed);
        assert_eq!(InjectionStatus::default(), InjectionStatus::Undefined);
    }

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(FetchStatus::Fetched.code(), 1);
        assert_eq!(FetchStatus::SizeExceed.code(), 10);
        assert_eq!(ParserStatus::NoParser.code(), 3);
        assert_eq!(IndexStatus::NothingToIndex.code(), 5);

        assert_eq!(FetchStatus::from_code(8).unwrap(), FetchStatus::HttpError);
        assert_eq!(ParserStatus::from_code(1).unwrap(), ParserStatus::Parsed);
        assert_eq!(IndexStatus::from_code(4).unwrap(), IndexStatus::PluginRejected);
    }

    #[test]
    fn test_unknown_code_is_invalid_status() {
        assert_eq!(
            IndexStatus::from_code(99),
            Err(RecordError::InvalidStatus {
                kind: "index",
                code: 99
            })
        );
        assert!(matches!(
            FetchStatus::from_code(-1),
            Err(RecordError::InvalidStatus { kind: "fetch", .. })
        ));
        assert!(matches!(
            ParserStatus::from_code(4),
            Err(RecordError::InvalidStatus { kind: "parser", .. })
        ));
    }

    #[test]
    fn test_display_uses_human_name() {
        assert_eq!(FetchStatus::RedirPerm.to_string(), "Permanent redirect");
        assert_eq!(InjectionStatus::Already.to_string(), "Already injected");
    }
}
