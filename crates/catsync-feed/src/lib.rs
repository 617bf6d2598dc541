//! ERP feed intake: fetching exports over HTTP, parsing XML or JSON into
//! [`catsync_core::ParsedFeed`], and mapping records into the normalized
//! [`catsync_core::CatalogParseResult`].

pub mod client;
pub mod error;
pub mod map;
pub mod parse;
mod parse_helpers;
mod retry;

pub use client::FeedClient;
pub use error::{FetchError, MappingError, ParseError, RecordKind};
pub use map::{CatalogMapper, CategoryIndex};
pub use parse::{detect_format, parse_feed, parse_feed_reader};
