// ABOUTME: Retries idempotent requests on transient failures with exponential backoff and jitter.
// ABOUTME: Each attempt is built fresh from an immutable snapshot; waits are cancellable.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use reqwest::{Method, Request, Response, StatusCode};

use super::{Interceptor, Next, RequestContext, RequestSnapshot};
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub min_jitter: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            min_jitter: Duration::from_millis(100),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Same retry count with every wait set to zero.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            min_jitter: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn disabled() -> Self {
        Self::immediate(0)
    }

    /// Wait before retrying after the failed attempt with 0-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let min = self.min_jitter.as_millis() as u64;
        let max = self.max_jitter.as_millis() as u64;
        if max <= min {
            return self.min_jitter;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[derive(Debug, Clone, Default)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl Interceptor for Retrier {
    fn intercept<'a>(
        &'a self,
        request: Request,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(async move {
            let idempotent = matches!(*request.method(), Method::GET | Method::HEAD);
            if !idempotent || self.policy.max_retries == 0 {
                return next.run(request, ctx).await;
            }
            let Some(snapshot) = RequestSnapshot::capture(&request) else {
                return next.run(request, ctx).await;
            };
            drop(request);

            let mut attempt = 0u32;
            loop {
                let result = next.run(snapshot.create_request(), ctx).await;
                let retryable = match &result {
                    Ok(response) => is_retryable_status(response.status()),
                    Err(err) => err.is_transient(),
                };
                if !retryable || attempt >= self.policy.max_retries || ctx.cancel.is_cancelled() {
                    return result;
                }

                let delay = self.policy.backoff(attempt);
                tracing::debug!(
                    url = %snapshot.url(),
                    attempt = attempt + 1,
                    status = result.as_ref().ok().map(|r| r.status().as_u16()),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient failure"
                );
                drop(result);

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => {
                        return Err(FetchError::cancelled(snapshot.url().as_str(), "Retry"));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            min_jitter: Duration::ZERO,
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.backoff(0);
            assert!(d >= Duration::from_millis(1100) && d <= Duration::from_millis(1500), "{:?}", d);
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::FOUND));
    }
}
