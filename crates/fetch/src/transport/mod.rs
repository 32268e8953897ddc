// ABOUTME: Composable outbound HTTP pipeline built from an ordered list of interceptors.
// ABOUTME: Each interceptor receives the request and a Next continuation that sends the rest of the chain.

pub mod redirect;
pub mod retry;
pub mod snapshot;
pub mod ssrf;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

pub use redirect::RedirectFollower;
pub use retry::{Retrier, RetryPolicy};
pub use snapshot::RequestSnapshot;
pub use ssrf::{is_restricted, BlockedRequest, HostResolver, SsrfGuard, SystemResolver};

/// Per-call state shared by every interceptor in the chain.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub cancel: CancellationToken,
    pub follow_redirects: bool,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            follow_redirects: true,
        }
    }

    /// The same context with redirect following switched off.
    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

/// One link in the chain. Implementations may call `next` zero or more times.
pub trait Interceptor: Send + Sync + fmt::Debug {
    fn intercept<'a>(
        &'a self,
        request: Request,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, FetchError>>;
}

/// Continuation that sends a request through the interceptors after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    client: &'a reqwest::Client,
    rest: &'a [Arc<dyn Interceptor>],
}

impl<'a> Next<'a> {
    pub async fn run(self, request: Request, ctx: &'a RequestContext) -> Result<Response, FetchError> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    client: self.client,
                    rest,
                };
                head.intercept(request, ctx, next).await
            }
            None => send_raw(self.client, request, ctx).await,
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.rest.len())
            .finish()
    }
}

/// End of the chain: a single raw send, raced against cancellation.
async fn send_raw(
    client: &reqwest::Client,
    request: Request,
    ctx: &RequestContext,
) -> Result<Response, FetchError> {
    let url = request.url().to_string();
    tracing::debug!(method = %request.method(), url = %url, "sending request");
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(FetchError::cancelled(url, "Send")),
        result = client.execute(request) => {
            result.map_err(|e| FetchError::from_reqwest(url, "Send", e))
        }
    }
}

/// A reqwest client wrapped in an ordered interceptor chain, outermost first.
#[derive(Debug, Clone)]
pub struct HttpPipeline {
    client: reqwest::Client,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl HttpPipeline {
    /// The client must have automatic redirects disabled when a RedirectFollower is present.
    pub fn new(client: reqwest::Client, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            client,
            interceptors: interceptors.into(),
        }
    }

    /// Retrier, then RedirectFollower, then the optional SsrfGuard, then the raw send.
    pub fn standard(
        client: reqwest::Client,
        retry: RetryPolicy,
        max_redirects: usize,
        guard: Option<SsrfGuard>,
    ) -> Self {
        let mut chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Retrier::new(retry)),
            Arc::new(RedirectFollower::new(max_redirects)),
        ];
        if let Some(guard) = guard {
            chain.push(Arc::new(guard));
        }
        Self::new(client, chain)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn execute(
        &self,
        request: Request,
        ctx: &RequestContext,
    ) -> Result<Response, FetchError> {
        let next = Next {
            client: &self.client,
            rest: &self.interceptors,
        };
        next.run(request, ctx).await
    }
}
