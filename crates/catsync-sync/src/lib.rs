//! Reconciliation of mapped feeds against persisted catalog state, plus the
//! read service built on the same ports.

pub mod diff;
pub mod engine;
pub mod error;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod queries;

pub use diff::{diff_categories, diff_products, plan_changes};
pub use engine::ReconciliationEngine;
pub use error::{EntityKind, ErrorKind, ReconciliationError};
pub use locks::{PartitionGuard, PartitionLocks};
pub use memory::{FailPoint, MemoryCatalog};
pub use notify::{LogNotifier, WebhookNotifier};
pub use queries::CatalogQueries;
