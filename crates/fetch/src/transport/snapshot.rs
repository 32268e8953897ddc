// ABOUTME: Immutable copy of an outbound request that can mint a fresh reqwest::Request per attempt.
// ABOUTME: Also derives the follow-up request for a redirect hop (method rewrite, body replay).

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use reqwest::{Body, Method, Request, StatusCode, Url, Version};

#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    url: Url,
    version: Version,
    headers: HeaderMap,
    timeout: Option<Duration>,
    body: Option<Bytes>,
}

impl RequestSnapshot {
    /// Returns `None` for streaming bodies, which cannot be replayed.
    pub fn capture(request: &Request) -> Option<Self> {
        let body = match request.body() {
            None => None,
            Some(body) => Some(Bytes::copy_from_slice(body.as_bytes()?)),
        };
        let mut headers = request.headers().clone();
        headers.remove(HOST);
        Some(Self {
            method: request.method().clone(),
            url: request.url().clone(),
            version: request.version(),
            headers,
            timeout: request.timeout().copied(),
            body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn create_request(&self) -> Request {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        *request.timeout_mut() = self.timeout;
        if let Some(body) = &self.body {
            *request.body_mut() = Some(Body::from(body.clone()));
        }
        request
    }

    /// The request to issue for a redirect to `target` with the given status.
    pub fn redirect_to(&self, target: Url, status: StatusCode) -> Self {
        let becomes_get = match status {
            StatusCode::SEE_OTHER => self.method != Method::HEAD,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
                self.method != Method::GET && self.method != Method::HEAD
            }
            _ => false,
        };

        let mut next = self.clone();
        next.url = target;
        if becomes_get {
            next.method = Method::GET;
            next.body = None;
            next.headers.remove(CONTENT_TYPE);
            next.headers.remove(CONTENT_LENGTH);
        }
        next
    }
}
