// ABOUTME: Discovers the child indexers behind a Jackett-style proxy and builds their feed URLs.
// ABOUTME: Falls back to a caps probe of the aggregate endpoint when the indexer list is unusable.

use std::time::Duration;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, LOCATION};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{parse_http_url, send_get};
use crate::credentials::{redact_url, API_KEY_PARAM};
use crate::error::{ErrorCode, FetchError};
use crate::options::{ClientBuilder, Options};
use crate::resource::read_body;
use crate::transport::{HttpPipeline, RequestContext};

const OP: &str = "ListIndexers";

pub const AGGREGATE_ID: &str = "all";
pub const AGGREGATE_NAME: &str = "All Indexers";

/// Fragments of JSON parser messages produced when the body was not JSON at all.
const NON_JSON_SIGNATURES: &[&str] = &[
    "expected value",
    "invalid start of a value",
    "unexpected token",
    "expected ident",
    "key must be a string",
    "unexpected character",
];

static NON_JSON_MATCHER: Lazy<Option<AhoCorasick>> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(NON_JSON_SIGNATURES)
        .ok()
});

/// One feed reachable through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredIndexer {
    pub id: String,
    pub display_name: String,
    pub feed_url: String,
}

#[derive(Debug, Deserialize)]
struct IndexerEntry {
    #[serde(default)]
    id: Option<IndexerId>,
    #[serde(default, alias = "title")]
    name: Option<String>,
    #[serde(default)]
    configured: Option<Flag>,
    #[serde(default)]
    enabled: Option<Flag>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IndexerId {
    Text(String),
    Number(i64),
}

impl IndexerId {
    fn into_string(self) -> Option<String> {
        let id = match self {
            IndexerId::Text(s) => s.trim().to_string(),
            IndexerId::Number(n) => n.to_string(),
        };
        (!id.is_empty()).then_some(id)
    }
}

/// Proxies disagree on how they spell booleans.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Flag {
    fn is_false(&self) -> bool {
        match self {
            Flag::Bool(b) => !b,
            Flag::Number(n) => *n == 0.0,
            Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"),
        }
    }
}

impl IndexerEntry {
    fn is_usable(&self) -> bool {
        let disabled = |flag: &Option<Flag>| flag.as_ref().is_some_and(Flag::is_false);
        !disabled(&self.configured) && !disabled(&self.enabled)
    }
}

/// URLs derived from one proxy base URL and key.
#[derive(Debug, Clone)]
struct Endpoints {
    base: Url,
    api_key: String,
}

impl Endpoints {
    fn api_path(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| {
                FetchError::invalid_url(
                    self.base.as_str(),
                    OP,
                    Some(anyhow::anyhow!("proxy URL cannot be a base")),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn list(&self) -> Result<Url, FetchError> {
        let mut url = self.api_path(&["api", "v2.0", "indexers"])?;
        url.query_pairs_mut()
            .append_pair("configured", "true")
            .append_pair(API_KEY_PARAM, &self.api_key);
        Ok(url)
    }

    fn torznab(&self, id: &str) -> Result<Url, FetchError> {
        self.api_path(&["api", "v2.0", "indexers", id, "results", "torznab", "api"])
    }

    fn feed(&self, id: &str) -> Result<Url, FetchError> {
        let mut url = self.torznab(id)?;
        url.query_pairs_mut()
            .append_pair(API_KEY_PARAM, &self.api_key)
            .append_pair("t", "search");
        Ok(url)
    }

    fn caps_probe(&self) -> Result<Url, FetchError> {
        let mut url = self.torznab(AGGREGATE_ID)?;
        url.query_pairs_mut()
            .append_pair("t", "caps")
            .append_pair(API_KEY_PARAM, &self.api_key);
        Ok(url)
    }

    fn aggregate(&self) -> Result<DiscoveredIndexer, FetchError> {
        Ok(DiscoveredIndexer {
            id: AGGREGATE_ID.to_string(),
            display_name: AGGREGATE_NAME.to_string(),
            feed_url: self.feed(AGGREGATE_ID)?.to_string(),
        })
    }
}

/// Client for the indexer list of a Jackett-compatible proxy.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    pipeline: HttpPipeline,
    retry_delay: Duration,
    caps_probe: bool,
}

impl DiscoveryClient {
    pub fn new(opts: Options) -> Result<Self, FetchError> {
        Ok(Self {
            pipeline: opts.build_pipeline()?,
            retry_delay: opts.discovery_retry_delay,
            caps_probe: opts.discovery_caps_probe,
        })
    }

    /// Create a new ClientBuilder for custom configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Lists the usable indexers behind `proxy_base_url`.
    ///
    /// A proxy whose list endpoint answers with something other than JSON is given one
    /// more chance. If that also fails, the aggregate feed is probed. Every other failure
    /// of the first attempt, including a redirect to a login page, is returned as-is.
    pub async fn list_indexers(
        &self,
        proxy_base_url: &str,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredIndexer>, FetchError> {
        let base = parse_http_url(proxy_base_url, OP)?;
        let endpoints = Endpoints {
            base,
            api_key: api_key.trim().to_string(),
        };

        let err = match self.fetch_list(&endpoints, cancel).await {
            Ok(indexers) => return Ok(self.discovered(&endpoints, indexers)),
            Err(err) if looks_like_non_json(&err) => err,
            Err(err) => return Err(err),
        };

        tracing::debug!(error = %err, "indexer list was not JSON; retrying once");
        pause(self.retry_delay, cancel, &err.url).await?;
        let err = match self.fetch_list(&endpoints, cancel).await {
            Ok(indexers) => return Ok(self.discovered(&endpoints, indexers)),
            Err(err) if is_probe_eligible(&err) => err,
            Err(err) => return Err(err),
        };

        if !self.caps_probe {
            return Err(FetchError::proxy_discovery(err.url.clone(), err, false));
        }

        tracing::warn!(error = %err, "indexer list unusable; probing aggregate capabilities");
        match self.probe_caps(&endpoints, cancel).await {
            Ok(true) => {
                tracing::info!(proxy = %endpoints.base, "falling back to aggregate feed");
                Ok(vec![endpoints.aggregate()?])
            }
            Ok(false) => Err(FetchError::proxy_discovery(err.url.clone(), err, true)),
            Err(probe_err) if probe_err.is_cancelled() || probe_err.is_blocked() => Err(probe_err),
            Err(probe_err) => {
                tracing::debug!(error = %probe_err, "caps probe failed");
                Err(FetchError::proxy_discovery(err.url.clone(), err, true))
            }
        }
    }

    fn discovered(&self, endpoints: &Endpoints, indexers: Vec<DiscoveredIndexer>) -> Vec<DiscoveredIndexer> {
        tracing::info!(
            proxy = %endpoints.base,
            count = indexers.len(),
            "discovered indexers"
        );
        indexers
    }

    async fn fetch_list(
        &self,
        endpoints: &Endpoints,
        cancel: &CancellationToken,
    ) -> Result<Vec<DiscoveredIndexer>, FetchError> {
        let url = endpoints.list()?;
        let shown = redact_url(&url);
        let ctx = RequestContext::new(cancel.clone()).without_redirects();
        let response = send_get(&self.pipeline, url, HeaderMap::new(), &ctx, OP).await?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok());
            return Err(FetchError::redirected(&shown, OP, status.as_u16(), location));
        }
        if !status.is_success() {
            return Err(FetchError::status(&shown, OP, status.as_u16()));
        }

        let body = read_body(response, &shown, cancel).await?;
        let entries: Vec<IndexerEntry> = serde_json::from_slice(&body.body)
            .map_err(|e| FetchError::json(&shown, OP, Some(anyhow::Error::new(e))))?;

        let mut indexers = Vec::new();
        for entry in entries {
            if !entry.is_usable() {
                continue;
            }
            let Some(id) = entry.id.and_then(IndexerId::into_string) else {
                continue;
            };
            let display_name = entry
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.clone());
            indexers.push(DiscoveredIndexer {
                feed_url: endpoints.feed(&id)?.to_string(),
                display_name,
                id,
            });
        }
        Ok(indexers)
    }

    /// True when the aggregate endpoint answers with a Torznab capabilities document.
    async fn probe_caps(&self, endpoints: &Endpoints, cancel: &CancellationToken) -> Result<bool, FetchError> {
        let url = endpoints.caps_probe()?;
        let shown = redact_url(&url);
        let ctx = RequestContext::new(cancel.clone());
        let response = send_get(&self.pipeline, url, HeaderMap::new(), &ctx, "ProbeCaps").await?;
        if !response.status().is_success() {
            tracing::debug!(url = %shown, status = response.status().as_u16(), "caps probe rejected");
            return Ok(false);
        }
        let body = read_body(response, &shown, cancel).await?;
        Ok(is_caps_document(&body.text()))
    }
}

fn is_caps_document(text: &str) -> bool {
    match trawler_feed::parse_document(text) {
        Ok(doc) => doc.root().local_name.eq_ignore_ascii_case("caps"),
        Err(_) => has_caps_tag(text),
    }
}

/// Finds a `<caps` start tag, not merely a longer name such as `<capsule`.
fn has_caps_tag(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.match_indices("<caps").any(|(at, tag)| {
        matches!(
            lower.as_bytes().get(at + tag.len()),
            Some(b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
        )
    })
}

fn looks_like_non_json(err: &FetchError) -> bool {
    if err.code != ErrorCode::Json {
        return false;
    }
    let Some(matcher) = NON_JSON_MATCHER.as_ref() else {
        return false;
    };
    err.source
        .as_ref()
        .is_some_and(|src| matcher.is_match(&src.to_string()))
}

/// Failures of the retried list fetch that may just mean the list endpoint is broken
/// while feeds still work.
fn is_probe_eligible(err: &FetchError) -> bool {
    matches!(
        err.code,
        ErrorCode::Json | ErrorCode::Network | ErrorCode::Timeout | ErrorCode::Status
    )
}

async fn pause(delay: Duration, cancel: &CancellationToken, url: &str) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::cancelled(url, OP)),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> Endpoints {
        Endpoints {
            base: Url::parse(base).unwrap(),
            api_key: "k".to_string(),
        }
    }

    #[test]
    fn endpoint_paths() {
        let ep = endpoints("http://jackett.example:9117/jackett/");
        assert_eq!(
            ep.list().unwrap().as_str(),
            "http://jackett.example:9117/jackett/api/v2.0/indexers?configured=true&apikey=k"
        );
        assert_eq!(
            ep.feed("1337x").unwrap().as_str(),
            "http://jackett.example:9117/jackett/api/v2.0/indexers/1337x/results/torznab/api?apikey=k&t=search"
        );
        assert_eq!(
            ep.caps_probe().unwrap().as_str(),
            "http://jackett.example:9117/jackett/api/v2.0/indexers/all/results/torznab/api?t=caps&apikey=k"
        );
    }

    #[test]
    fn base_without_trailing_slash() {
        let ep = endpoints("http://jackett.example?x=1");
        assert_eq!(
            ep.list().unwrap().as_str(),
            "http://jackett.example/api/v2.0/indexers?configured=true&apikey=k"
        );
    }

    #[test]
    fn flags() {
        let entries: Vec<IndexerEntry> = serde_json::from_str(
            r#"[
                {"id": "a", "configured": true},
                {"id": "b", "configured": false},
                {"id": "c", "enabled": "no"},
                {"id": "d", "configured": 0},
                {"id": "e"},
                {"id": "f", "configured": "FALSE"},
                {"id": "g", "enabled": "yes", "configured": 1}
            ]"#,
        )
        .unwrap();
        let usable: Vec<bool> = entries.iter().map(IndexerEntry::is_usable).collect();
        assert_eq!(usable, vec![true, false, false, false, true, false, true]);
    }

    #[test]
    fn non_json_signatures() {
        let html = serde_json::from_str::<Vec<u8>>("<html>").unwrap_err();
        let err = FetchError::json("u", OP, Some(anyhow::Error::new(html)));
        assert!(looks_like_non_json(&err));

        let shape = serde_json::from_str::<Vec<u8>>("{}").unwrap_err();
        let err = FetchError::json("u", OP, Some(anyhow::Error::new(shape)));
        assert!(!looks_like_non_json(&err));

        let net = FetchError::network("u", OP, Some(anyhow::anyhow!("expected value")));
        assert!(!looks_like_non_json(&net));
    }

    #[test]
    fn caps_detection() {
        assert!(is_caps_document(r#"<?xml version="1.0"?><caps><server title="Jackett"/></caps>"#));
        assert!(is_caps_document("junk before <caps><broken>"));
        assert!(!is_caps_document(r#"<error code="100" description="Invalid API Key"/>"#));
        assert!(!is_caps_document("<html><body>login</body></html>"));
        assert!(is_caps_document("junk <caps\n server=\"x\">"));
        assert!(is_caps_document("junk <caps/>"));
        assert!(!is_caps_document("<html><capsule>not caps</capsule>"));
        assert!(!is_caps_document("truncated <caps"));
    }
}
