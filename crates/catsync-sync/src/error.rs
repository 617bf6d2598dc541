use std::fmt;

use catsync_core::{ProductTypeId, StoreError};
use catsync_feed::{MappingError, ParseError};
use serde::Serialize;
use thiserror::Error;

/// Operator-facing classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    UnknownCategory,
    EmptyImport,
    PersistenceFailure,
    Busy,
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::UnknownCategory => "unknown_category",
            ErrorKind::EmptyImport => "empty_import",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::Busy => "busy",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entity kind tripped the empty-import safeguard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Categories,
    Products,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Categories => write!(f, "categories"),
            EntityKind::Products => write!(f, "products"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("malformed feed: {0}")]
    Feed(#[from] ParseError),

    #[error("feed mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("import for product type {expected} carries product type {found}")]
    PartitionMismatch {
        expected: ProductTypeId,
        found: ProductTypeId,
    },

    #[error(
        "import for product type {product_type} has no {entity} but {persisted} are persisted; \
         refusing to soft-delete the partition"
    )]
    EmptyImport {
        product_type: ProductTypeId,
        entity: EntityKind,
        persisted: usize,
    },

    #[error("persistence failure, run rolled back: {0}")]
    Persistence(#[source] StoreError),

    #[error("a reconciliation run for product type {product_type} is already in progress")]
    RunInProgress { product_type: ProductTypeId },

    #[error("reconciliation run for product type {product_type} was cancelled before apply")]
    Cancelled { product_type: ProductTypeId },
}

impl From<StoreError> for ReconciliationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PartitionBusy { product_type } => Self::RunInProgress { product_type },
            other => Self::Persistence(other),
        }
    }
}

impl ReconciliationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Feed(_) | Self::PartitionMismatch { .. } => ErrorKind::MalformedInput,
            Self::Mapping(MappingError::UnknownCategory { .. } | MappingError::UnknownParent { .. }) => {
                ErrorKind::UnknownCategory
            }
            Self::Mapping(_) => ErrorKind::MalformedInput,
            Self::EmptyImport { .. } => ErrorKind::EmptyImport,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
            Self::RunInProgress { .. } => ErrorKind::Busy,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Only persistence failures are worth retrying with the same payload;
    /// a bad feed stays bad.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind(), ErrorKind::PersistenceFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt() -> ProductTypeId {
        ProductTypeId::new(1).unwrap()
    }

    #[test]
    fn partition_busy_maps_to_run_in_progress() {
        let err = ReconciliationError::from(StoreError::PartitionBusy { product_type: pt() });
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(!err.is_retriable());
    }

    #[test]
    fn only_persistence_failures_are_retriable() {
        let persistence = ReconciliationError::from(StoreError::Integrity("x".to_string()));
        assert!(persistence.is_retriable());

        let mapping = ReconciliationError::Mapping(MappingError::UnknownCategory {
            product_external_id: "P".to_string(),
            category_external_id: None,
        });
        assert_eq!(mapping.kind(), ErrorKind::UnknownCategory);
        assert!(!mapping.is_retriable());

        let empty = ReconciliationError::EmptyImport {
            product_type: pt(),
            entity: EntityKind::Products,
            persisted: 3,
        };
        assert_eq!(empty.kind().as_str(), "empty_import");
        assert!(!empty.is_retriable());
    }

    #[test]
    fn parse_errors_are_malformed_input() {
        let err = ReconciliationError::from(ParseError::Empty);
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
