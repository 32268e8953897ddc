// ABOUTME: Torznab feed library: hardened XML reading and normalization of indexer items.
// ABOUTME: Pure and synchronous; all network concerns live in trawler-fetch.

pub mod attributes;
pub mod categories;
pub mod decoder;
pub mod error;
pub mod models;
pub mod time_parse;
pub mod xml;

pub use attributes::{AttributeSchema, NEWZNAB_NAMESPACE, TORZNAB_NAMESPACE};
pub use categories::{classify, CategoryFamily, CategorySelection};
pub use decoder::{decode, indexer_error, TorznabDecoder};
pub use error::{FeedError, IndexerError};
pub use models::{AttributeMap, NormalizedItem};
pub use time_parse::{parse_feed_date, parse_feed_timestamp};
pub use xml::{parse_document, parse_document_bytes, Document, Element, Node, MAX_DOCUMENT_CHARS};

/// Parses and decodes a Torznab document in one step.
pub fn decode_feed(xml: &str) -> Result<Vec<NormalizedItem>, FeedError> {
    let doc = parse_document(xml)?;
    Ok(decode(&doc))
}
