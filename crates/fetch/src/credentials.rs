// ABOUTME: Indexer API key handling: query-string or header authentication.
// ABOUTME: Also redacts keys from URLs before they reach logs.

use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FetchError;

pub const API_KEY_PARAM: &str = "apikey";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Where the API key travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Query,
    Header,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthMode::Query => "query",
            AuthMode::Header => "header",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(AuthMode::Query),
            "header" => Ok(AuthMode::Header),
            other => Err(format!("unknown auth mode '{}' (expected query or header)", other)),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_mode: AuthMode,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("auth_mode", &self.auth_mode)
            .finish()
    }
}

impl Credentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(api_key: impl Into<String>, auth_mode: AuthMode) -> Self {
        Self {
            api_key: Some(api_key.into()),
            auth_mode,
        }
    }

    /// The key, ignoring blank values.
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Applies the key to a request target, returning the URL to send.
    pub fn apply(&self, url: &Url, headers: &mut HeaderMap) -> Result<Url, FetchError> {
        let Some(key) = self.key() else {
            return Ok(url.clone());
        };
        match self.auth_mode {
            AuthMode::Query => Ok(with_query_param(url, API_KEY_PARAM, key)),
            AuthMode::Header => {
                let value = HeaderValue::from_str(key).map_err(|e| {
                    FetchError::config(
                        "ApplyCredentials",
                        Some(anyhow::anyhow!("API key is not a valid header value: {}", e)),
                    )
                })?;
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
                Ok(url.clone())
            }
        }
    }
}

/// Sets `name=value` on the query string, replacing any existing values for `name`.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.eq_ignore_ascii_case(name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(name, value);
    }
    out
}

/// The URL as text with any API key value masked.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case(API_KEY_PARAM)) {
        return url.to_string();
    }
    let mut out = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k.eq_ignore_ascii_case(API_KEY_PARAM) {
                (k.into_owned(), "***".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    out.query_pairs_mut().clear().extend_pairs(pairs);
    out.to_string()
}
