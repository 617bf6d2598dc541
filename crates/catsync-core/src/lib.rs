pub mod app_config;
pub mod catalog;
pub mod config;
pub mod feeds;
pub mod import;
pub mod path;
pub mod plan;
pub mod query;
pub mod slug;
pub mod store;
pub mod tree;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use catalog::{Category, PriceEntry, PriceTypeCode, Product, ProductTypeId};
pub use config::{load_app_config, load_app_config_from_env};
pub use feeds::{load_feed_sources, FeedSourceConfig, FeedsFile};
pub use import::{
    CatalogParseResult, FeedFormat, ImportRecord, ImportSummary, MappedCategory, MappedProduct,
    OperationCounts, ParsedFeed, RawPrice,
};
pub use path::{CategoryPath, PathError, PATH_SEPARATOR};
pub use plan::{
    CategoryChanges, CategoryUpdate, PlanCounts, ProductChanges, ProductUpdate,
    ReconciliationPlan,
};
pub use query::{
    sort_rows, CategoryLocations, Page, PageInfo, Pagination, ProductFilter, ProductRow, ProductSort, SortDirection,
    SortField,
};
pub use slug::{slugify, SlugAllocator, SLUG_SEPARATOR};
pub use store::{
    CatalogReader, CatalogStore, CatalogTransaction, NotificationSink, NotifyError, StoreError,
};
pub use tree::{build_tree, find_subtree, flatten, CategoryNode};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid product type id {0}: must be a positive integer")]
    InvalidProductType(i64),
    #[error("invalid price type code {0:?}")]
    InvalidPriceType(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read feeds file {path}: {source}")]
    FeedsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse feeds file: {0}")]
    FeedsFileParse(#[from] serde_yaml::Error),

    #[error("feed configuration invalid: {0}")]
    Validation(String),
}
