// ABOUTME: Hardened outbound fetching for Torznab indexers and Jackett-style proxies.
// ABOUTME: Exposes the interceptor pipeline, FeedClient, DiscoveryClient and their configuration.

pub mod client;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod options;
pub mod resource;
pub mod transport;

pub use client::FeedClient;
pub use credentials::{redact_url, AuthMode, Credentials};
pub use discovery::{DiscoveredIndexer, DiscoveryClient};
pub use error::{ErrorCode, FetchError};
pub use options::{ClientBuilder, Options};
pub use resource::{decode_body, FetchedBody, MAX_CONTENT_LENGTH};
pub use transport::{
    BlockedRequest, HostResolver, HttpPipeline, Interceptor, Next, RedirectFollower,
    RequestContext, RequestSnapshot, Retrier, RetryPolicy, SsrfGuard, SystemResolver,
};

pub use tokio_util::sync::CancellationToken;
pub use trawler_feed::NormalizedItem;
