// ABOUTME: Error types for feed document parsing.
// ABOUTME: Every variant is a malformed-document failure; missing optional fields are never errors.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while reading a feed document.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The document declares a DTD. Refused before any entity is read.
    #[error("malformed document: DTD declarations are not allowed")]
    DtdProhibited,

    /// The document is longer than the accepted character ceiling.
    #[error("malformed document: {chars} characters exceeds the limit of {limit}")]
    TooLarge { chars: usize, limit: usize },

    /// The document is not well-formed XML.
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl FeedError {
    /// Creates a Malformed error from an underlying reader error.
    pub fn malformed(err: impl fmt::Display) -> Self {
        FeedError::Malformed(err.to_string())
    }

    /// Every feed error is terminal; retrying cannot fix the payload.
    pub fn is_malformed_document(&self) -> bool {
        matches!(
            self,
            FeedError::DtdProhibited | FeedError::TooLarge { .. } | FeedError::Malformed(_)
        )
    }
}

/// An indexer answered with a Torznab `<error>` document instead of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("indexer reported error {}: {description}", code_label(.code))]
pub struct IndexerError {
    pub code: Option<i64>,
    pub description: String,
}

fn code_label(code: &Option<i64>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
}
