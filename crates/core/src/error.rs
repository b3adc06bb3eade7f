use reqwest::StatusCode;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the upstream scanner endpoint.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("scanner request timed out after {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("scanner request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("scanner returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("scanner response is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid request header {0:?}")]
    InvalidHeader(String),

    #[error("failed to encode scanner request: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The upstream body parsed but does not carry usable rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("missing data key")]
    MissingData,

    #[error("data is not an array")]
    DataNotArray,

    #[error("empty data")]
    EmptyData,

    #[error("no row data")]
    NoRowData,

    #[error("row {index} has {values} values but the schema declares {columns} columns")]
    RowTooLong {
        index: usize,
        values: usize,
        columns: usize,
    },

    #[error("row {index} has no ticker name")]
    MissingTicker { index: usize },

    #[error("duplicate ticker {name} at row {index}")]
    DuplicateTicker { index: usize, name: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("load failed for {path}: {detail}")]
    Load { path: PathBuf, detail: String },

    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write cache file {path}: {detail}")]
    Write { path: PathBuf, detail: String },
}

impl CacheError {
    pub(crate) fn load(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// The caller asked for something the query layer does not support.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(
        "unsupported category {0:?}; expected one of strong_sell, sell, neutral, buy, strong_buy, unknown"
    )]
    UnsupportedCategory(String),

    #[error("at least one ticker is required")]
    NoTickers,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid scanner schema: {0}")]
    Schema(String),

    #[error("failed to build scanner http client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("upstream: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("shape: {0}")]
    Shape(#[from] ShapeError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("query: {0}")]
    Query(#[from] QueryError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Upstream,
    Shape,
    Cache,
    Query,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Upstream => "upstream",
            ErrorKind::Shape => "shape",
            ErrorKind::Cache => "cache",
            ErrorKind::Query => "query",
            ErrorKind::Config => "config",
        }
    }
}

impl ScannerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScannerError::Upstream(_) => ErrorKind::Upstream,
            ScannerError::Shape(_) => ErrorKind::Shape,
            ScannerError::Cache(_) => ErrorKind::Cache,
            ScannerError::Query(_) => ErrorKind::Query,
            ScannerError::Config(_) => ErrorKind::Config,
        }
    }

    /// True when retrying the same request cannot help; the caller must change its input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, ScannerError::Query(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_are_distinguishable_from_pipeline_failures() {
        let query: ScannerError = QueryError::UnsupportedCategory("hold".to_string()).into();
        assert_eq!(query.kind(), ErrorKind::Query);
        assert!(query.is_caller_error());

        let shape: ScannerError = ShapeError::EmptyData.into();
        assert_eq!(shape.kind(), ErrorKind::Shape);
        assert!(!shape.is_caller_error());

        let cache: ScannerError = CacheError::load("tempDir/2026-01-05.csv", "bad header").into();
        assert_eq!(cache.kind(), ErrorKind::Cache);
        assert!(!cache.is_caller_error());
    }

    #[test]
    fn shape_messages_name_the_missing_piece() {
        assert_eq!(ShapeError::MissingData.to_string(), "missing data key");
        assert_eq!(ShapeError::EmptyData.to_string(), "empty data");
        assert_eq!(ShapeError::NoRowData.to_string(), "no row data");
    }
}
