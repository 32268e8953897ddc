// ABOUTME: Error types for outbound fetches, including the ErrorCode enum and FetchError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

/// Categories of fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Config,
    Blocked,
    Network,
    Timeout,
    Cancelled,
    Status,
    Redirected,
    MalformedDocument,
    Indexer,
    Json,
    ProxyDiscovery { probe_attempted: bool },
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Config => "invalid configuration",
            ErrorCode::Blocked => "request blocked",
            ErrorCode::Network => "network error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Status => "unexpected status",
            ErrorCode::Redirected => "unexpected redirect",
            ErrorCode::MalformedDocument => "malformed document",
            ErrorCode::Indexer => "indexer error",
            ErrorCode::Json => "invalid JSON",
            ErrorCode::ProxyDiscovery { probe_attempted: true } => {
                "indexer discovery failed after caps probe"
            }
            ErrorCode::ProxyDiscovery { probe_attempted: false } => "indexer discovery failed",
        };
        write!(f, "{}", s)
    }
}

/// The error type for every fallible fetch operation.
#[derive(Debug, thiserror::Error)]
pub struct FetchError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Blocked errors carry a complete, user-facing reason.
        if self.code == ErrorCode::Blocked {
            if let Some(ref src) = self.source {
                return write!(f, "{}", src);
            }
        }
        write!(f, "trawler: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl FetchError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Config error for settings that cannot be turned into a request.
    pub fn config(op: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::with_code(ErrorCode::Config, "", op, source)
    }

    /// Create a Blocked error.
    pub fn blocked(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Blocked, url, op, source)
    }

    /// Create a Network error.
    pub fn network(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Network, url, op, source)
    }

    /// Create a Timeout error.
    pub fn timeout(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Timeout, url, op, source)
    }

    /// Create a Cancelled error.
    pub fn cancelled(url: impl Into<String>, op: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Cancelled, url, op, None)
    }

    /// Create a Status error for an unexpected HTTP status.
    pub fn status(url: impl Into<String>, op: impl Into<String>, status: u16) -> Self {
        Self::with_code(
            ErrorCode::Status,
            url,
            op,
            Some(anyhow::anyhow!("HTTP status {}", status)),
        )
    }

    /// Create a Redirected error naming the redirect target.
    pub fn redirected(
        url: impl Into<String>,
        op: impl Into<String>,
        status: u16,
        location: Option<&str>,
    ) -> Self {
        let target = location.unwrap_or("<no location>");
        Self::with_code(
            ErrorCode::Redirected,
            url,
            op,
            Some(anyhow::anyhow!("HTTP {} redirect to {}", status, target)),
        )
    }

    /// Create a MalformedDocument error.
    pub fn malformed(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::MalformedDocument, url, op, source)
    }

    /// Create an Indexer error.
    pub fn indexer(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Indexer, url, op, source)
    }

    /// Create a Json error.
    pub fn json(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Json, url, op, source)
    }

    /// Wrap the failure that exhausted every discovery strategy.
    pub fn proxy_discovery(url: impl Into<String>, cause: FetchError, probe_attempted: bool) -> Self {
        Self::with_code(
            ErrorCode::ProxyDiscovery { probe_attempted },
            url,
            "ListIndexers",
            Some(anyhow::Error::new(cause)),
        )
    }

    /// Returns true if the SSRF guard refused the request.
    pub fn is_blocked(&self) -> bool {
        self.code == ErrorCode::Blocked
    }

    /// Returns true for failures worth another attempt: network errors and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(self.code, ErrorCode::Network | ErrorCode::Timeout)
    }

    /// Returns true if this is a Timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Returns true if the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Config error.
    pub fn is_config(&self) -> bool {
        self.code == ErrorCode::Config
    }

    /// Returns true if the document could not be parsed.
    pub fn is_malformed_document(&self) -> bool {
        self.code == ErrorCode::MalformedDocument
    }

    /// Returns true if the indexer answered with an error document.
    pub fn is_indexer(&self) -> bool {
        self.code == ErrorCode::Indexer
    }

    /// Returns true if indexer discovery gave up.
    pub fn is_proxy_discovery(&self) -> bool {
        matches!(self.code, ErrorCode::ProxyDiscovery { .. })
    }

    /// The HTTP status recorded on a Status error, if any.
    pub fn http_status(&self) -> Option<u16> {
        if self.code != ErrorCode::Status {
            return None;
        }
        let msg = self.source.as_ref()?.to_string();
        msg.strip_prefix("HTTP status ")?.parse().ok()
    }

    /// Maps a reqwest failure onto Timeout or Network.
    pub(crate) fn from_reqwest(url: impl Into<String>, op: impl Into<String>, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(url, op, Some(anyhow::Error::new(err)))
        } else {
            Self::network(url, op, Some(anyhow::Error::new(err)))
        }
    }
}
