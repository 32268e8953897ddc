// ABOUTME: Reads response bodies under a size ceiling and decodes them to text.
// ABOUTME: Charset comes from Content-Type, then the XML declaration, then detection.

use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

/// Maximum accepted response body (10 MiB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

static XML_ENCODING_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).ok()
});

/// A fully read response body plus what is needed to decode it.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedBody {
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Reads the whole body, refusing anything over `MAX_CONTENT_LENGTH`.
pub async fn read_body(
    mut response: Response,
    url: &str,
    cancel: &CancellationToken,
) -> Result<FetchedBody, FetchError> {
    let too_large = || {
        FetchError::malformed(
            url,
            "ReadBody",
            Some(anyhow::anyhow!(
                "response body exceeds {} bytes",
                MAX_CONTENT_LENGTH
            )),
        )
    };

    if let Some(len) = response.content_length() {
        if len > MAX_CONTENT_LENGTH as u64 {
            return Err(too_large());
        }
    }

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut buf = BytesMut::new();
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::cancelled(url, "ReadBody")),
            chunk = response.chunk() => chunk.map_err(|e| FetchError::from_reqwest(url, "ReadBody", e))?,
        };
        let Some(chunk) = chunk else { break };
        if buf.len() + chunk.len() > MAX_CONTENT_LENGTH {
            return Err(too_large());
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(FetchedBody {
        status,
        content_type,
        body: buf.freeze(),
    })
}

/// Decodes body bytes to text. Byte-order marks always win.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(extract_charset)
        .or_else(|| xml_declared_encoding(body));
    if let Some(encoding) = declared.and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes())) {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract the charset parameter from a Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn xml_declared_encoding(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(256)];
    let re = XML_ENCODING_RE.as_ref()?;
    let caps = re.captures(head)?;
    std::str::from_utf8(caps.get(1)?.as_bytes())
        .ok()
        .map(|s| s.to_string())
}
