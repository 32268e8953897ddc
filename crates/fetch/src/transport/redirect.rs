// ABOUTME: Manual redirect following, including HTTPS to HTTP hops, with a fixed hop cap.
// ABOUTME: Every hop goes back through the rest of the chain so the SSRF guard re-checks it.

use futures::future::BoxFuture;
use reqwest::header::LOCATION;
use reqwest::{Request, Response, StatusCode};

use super::{Interceptor, Next, RequestContext, RequestSnapshot};
use crate::error::FetchError;

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct RedirectFollower {
    max_redirects: usize,
}

impl RedirectFollower {
    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }
}

impl Default for RedirectFollower {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REDIRECTS)
    }
}

fn is_followable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

impl Interceptor for RedirectFollower {
    fn intercept<'a>(
        &'a self,
        request: Request,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(async move {
            if !ctx.follow_redirects {
                return next.run(request, ctx).await;
            }
            let Some(mut current) = RequestSnapshot::capture(&request) else {
                return next.run(request, ctx).await;
            };

            let mut response = next.run(request, ctx).await?;
            let mut hops = 0;
            while is_followable(response.status()) {
                if hops >= self.max_redirects {
                    tracing::debug!(url = %current.url(), hops, "redirect limit reached");
                    break;
                }
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    break;
                };
                let Ok(target) = current.url().join(location.trim()) else {
                    tracing::debug!(location, "unparsable redirect location");
                    break;
                };

                hops += 1;
                tracing::debug!(
                    from = %current.url(),
                    to = %target,
                    status = response.status().as_u16(),
                    hop = hops,
                    "following redirect"
                );
                current = current.redirect_to(target, response.status());
                response = next.run(current.create_request(), ctx).await?;
            }
            Ok(response)
        })
    }
}
