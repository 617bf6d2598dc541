use std::fmt;

use catsync_core::PathError;
use thiserror::Error;

/// Which side of the feed a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Category,
    Product,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Category => write!(f, "category"),
            RecordKind::Product => write!(f, "product"),
        }
    }
}

/// The payload is structurally unusable. Every variant is a malformed-input
/// condition; nothing here is transient.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("feed payload is empty")]
    Empty,

    #[error("feed payload is neither XML nor JSON")]
    UnknownFormat,

    #[error("feed payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("failed to read feed payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed XML at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} record #{index} is missing required field `{field}`")]
    MissingField {
        kind: RecordKind,
        index: usize,
        field: &'static str,
    },

    #[error("invalid value {value:?} for `{field}` in {kind} {external_id}")]
    InvalidValue {
        kind: RecordKind,
        external_id: String,
        field: &'static str,
        value: String,
    },
}

/// Referential or structural violations found while mapping a parsed feed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("product {product_external_id} references unknown category {category_external_id:?}")]
    UnknownCategory {
        product_external_id: String,
        category_external_id: Option<String>,
    },

    #[error("category {external_id} references unknown parent {parent_external_id}")]
    UnknownParent {
        external_id: String,
        parent_external_id: String,
    },

    #[error("category hierarchy contains a cycle through {external_id}")]
    CyclicHierarchy { external_id: String },

    #[error("duplicate {kind} external id {external_id}")]
    DuplicateExternalId {
        kind: RecordKind,
        external_id: String,
    },

    #[error("cannot derive category path: {0}")]
    InvalidPath(#[from] PathError),
}

/// Failures fetching a feed over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("feed not found: {url}")]
    NotFound { url: String },

    #[error("server error {status} from {url}")]
    ServerError { status: u16, url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

impl FetchError {
    /// `true` for conditions worth retrying: network failures, 429 and 5xx.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Http(_) | FetchError::RateLimited { .. } | FetchError::ServerError { .. }
        )
    }
}
