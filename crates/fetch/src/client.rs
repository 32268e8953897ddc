// ABOUTME: FeedClient fetches a Torznab feed through the hardened pipeline and decodes its items.
// ABOUTME: Also hosts the shared GET helper that turns SSRF blocks into Blocked errors.

use reqwest::header::HeaderMap;
use reqwest::{Method, Response};
use tokio_util::sync::CancellationToken;
use trawler_feed::{indexer_error, parse_document, NormalizedItem, TorznabDecoder};
use url::Url;

use crate::credentials::{redact_url, Credentials};
use crate::error::FetchError;
use crate::options::{ClientBuilder, Options};
use crate::resource::{read_body, FetchedBody};
use crate::transport::{BlockedRequest, HttpPipeline, RequestContext};

/// Client for direct indexer feeds.
#[derive(Debug, Clone)]
pub struct FeedClient {
    pipeline: HttpPipeline,
    decoder: TorznabDecoder,
}

impl FeedClient {
    pub fn new(opts: Options) -> Result<Self, FetchError> {
        Ok(Self {
            pipeline: opts.build_pipeline()?,
            decoder: TorznabDecoder::default(),
        })
    }

    /// Create a new ClientBuilder for custom configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Replaces the attribute schemas the decoder recognizes.
    pub fn with_decoder(mut self, decoder: TorznabDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn pipeline(&self) -> &HttpPipeline {
        &self.pipeline
    }

    /// Fetches `feed_url` and decodes every item it carries.
    pub async fn fetch_and_decode(
        &self,
        feed_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<Vec<NormalizedItem>, FetchError> {
        const OP: &str = "FetchFeed";

        let url = parse_http_url(feed_url, OP)?;
        let mut headers = HeaderMap::new();
        let target = credentials.apply(&url, &mut headers)?;
        let shown = redact_url(&target);

        let ctx = RequestContext::new(cancel.clone());
        let response = send_get(&self.pipeline, target, headers, &ctx, OP).await?;
        if !response.status().is_success() {
            return Err(FetchError::status(&shown, OP, response.status().as_u16()));
        }

        let body = read_body(response, &shown, cancel).await?;
        let items = self.decode_body(&body, &shown)?;
        tracing::debug!(url = %shown, items = items.len(), "decoded feed");
        Ok(items)
    }

    fn decode_body(&self, body: &FetchedBody, shown: &str) -> Result<Vec<NormalizedItem>, FetchError> {
        let text = body.text();
        let doc = parse_document(&text)
            .map_err(|e| FetchError::malformed(shown, "DecodeFeed", Some(anyhow::Error::new(e))))?;
        if let Some(err) = indexer_error(&doc) {
            return Err(FetchError::indexer(shown, "DecodeFeed", Some(anyhow::Error::new(err))));
        }
        Ok(self.decoder.decode(&doc))
    }
}

/// Parses a caller-supplied URL, accepting only absolute http(s) targets.
pub(crate) fn parse_http_url(raw: &str, op: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        FetchError::invalid_url(raw, op, Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::invalid_url(
            raw,
            op,
            Some(anyhow::anyhow!("scheme {} is not supported", other)),
        )),
    }
}

/// Sends a GET through the pipeline; SSRF refusals surface as Blocked errors.
pub(crate) async fn send_get(
    pipeline: &HttpPipeline,
    url: Url,
    headers: HeaderMap,
    ctx: &RequestContext,
    op: &str,
) -> Result<Response, FetchError> {
    let shown = redact_url(&url);
    let mut request = reqwest::Request::new(Method::GET, url);
    request.headers_mut().extend(headers);

    let response = pipeline.execute(request, ctx).await.map_err(|mut e| {
        e.url = shown.clone();
        e
    })?;
    if let Some(blocked) = BlockedRequest::from_response(&response) {
        return Err(FetchError::blocked(
            shown,
            op,
            Some(anyhow::anyhow!("{}", blocked.reason)),
        ));
    }
    Ok(response)
}
