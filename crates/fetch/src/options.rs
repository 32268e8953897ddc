// ABOUTME: Configuration options for trawler clients and the ClientBuilder fluent API.
// ABOUTME: Options also know how to assemble the HTTP pipeline they describe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::client::FeedClient;
use crate::discovery::DiscoveryClient;
use crate::error::FetchError;
use crate::transport::redirect::DEFAULT_MAX_REDIRECTS;
use crate::transport::{HostResolver, HttpPipeline, RetryPolicy, SsrfGuard, SystemResolver};

pub const DEFAULT_USER_AGENT: &str = "trawler/0.1";

/// Configuration options for trawler clients.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub headers: HashMap<String, String>,
    pub retry: RetryPolicy,
    pub max_redirects: usize,
    /// Must have automatic redirects disabled.
    pub http_client: Option<reqwest::Client>,
    pub resolver: Option<Arc<dyn HostResolver>>,
    /// Pause before re-reading a proxy indexer list that was not JSON.
    pub discovery_retry_delay: Duration,
    /// Fall back to the aggregate feed when its caps endpoint answers.
    pub discovery_caps_probe: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allow_private_networks: false,
            headers: HashMap::new(),
            retry: RetryPolicy::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            http_client: None,
            resolver: None,
            discovery_retry_delay: Duration::from_millis(350),
            discovery_caps_probe: true,
        }
    }
}

impl Options {
    /// Builds the pipeline: retry, redirects, then the SSRF guard unless private networks are allowed.
    pub fn build_pipeline(&self) -> Result<HttpPipeline, FetchError> {
        let client = match &self.http_client {
            Some(client) => client.clone(),
            None => self.build_http_client()?,
        };
        let guard = if self.allow_private_networks {
            None
        } else {
            let resolver = self
                .resolver
                .clone()
                .unwrap_or_else(|| Arc::new(SystemResolver));
            Some(SsrfGuard::new(resolver))
        };
        Ok(HttpPipeline::standard(
            client,
            self.retry.clone(),
            self.max_redirects,
            guard,
        ))
    }

    fn build_http_client(&self) -> Result<reqwest::Client, FetchError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                FetchError::config("BuildClient", Some(anyhow::anyhow!("header {}: {}", key, e)))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                FetchError::config("BuildClient", Some(anyhow::anyhow!("header {}: {}", key, e)))
            })?;
            headers.insert(name, value);
        }

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::config("BuildClient", Some(anyhow::Error::new(e))))
    }
}

/// Builder for constructing FeedClient and DiscoveryClient instances.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    opts: Options,
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.opts.retry = policy;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.opts.max_redirects = max;
        self
    }

    /// Use a custom HTTP client. It must not follow redirects itself.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Resolver the SSRF guard uses for hostnames.
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.opts.resolver = Some(resolver);
        self
    }

    pub fn discovery_retry_delay(mut self, delay: Duration) -> Self {
        self.opts.discovery_retry_delay = delay;
        self
    }

    pub fn discovery_caps_probe(mut self, enabled: bool) -> Self {
        self.opts.discovery_caps_probe = enabled;
        self
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn build_feed_client(self) -> Result<FeedClient, FetchError> {
        FeedClient::new(self.opts)
    }

    pub fn build_discovery_client(self) -> Result<DiscoveryClient, FetchError> {
        DiscoveryClient::new(self.opts)
    }
}
