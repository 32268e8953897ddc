// ABOUTME: SSRF guard that resolves every outbound target and refuses restricted address ranges.
// ABOUTME: Blocked requests get a synthetic 403 response tagged with a BlockedRequest extension.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use futures::future::BoxFuture;
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Request, Response, StatusCode, Url};
use url::Host;

use super::{Interceptor, Next, RequestContext};
use crate::error::FetchError;

static RESTRICTED_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.0.2.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "198.51.100.0/24",
        "203.0.113.0/24",
        "224.0.0.0/4",
        "240.0.0.0/4",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
});

static RESTRICTED_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    [
        "::/128",
        "::1/128",
        "100::/64",
        "fc00::/7",
        "fe80::/10",
        "ff00::/8",
        "2001:db8::/32",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
});

/// True for private, loopback, link-local, multicast, documentation and reserved addresses.
pub fn is_restricted(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => is_restricted_v4(ip),
        IpAddr::V6(ip) => is_restricted_v6(ip),
    }
}

fn is_restricted_v4(ip: &Ipv4Addr) -> bool {
    RESTRICTED_V4.iter().any(|net| net.contains(ip))
}

fn is_restricted_v6(ip: &Ipv6Addr) -> bool {
    if embedded_ipv4(ip).is_some_and(|v4| is_restricted_v4(&v4)) {
        return true;
    }
    RESTRICTED_V6.iter().any(|net| net.contains(ip))
}

static NAT64: Lazy<Option<Ipv6Net>> = Lazy::new(|| "64:ff9b::/96".parse().ok());
static SIX_TO_FOUR: Lazy<Option<Ipv6Net>> = Lazy::new(|| "2002::/16".parse().ok());

/// The IPv4 address a v6 address forwards to: mapped, compatible, NAT64 or 6to4.
fn embedded_ipv4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4() {
        return Some(v4);
    }
    let octets = ip.octets();
    if NAT64.as_ref().is_some_and(|net| net.contains(ip)) {
        return Some(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]));
    }
    if SIX_TO_FOUR.as_ref().is_some_and(|net| net.contains(ip)) {
        return Some(Ipv4Addr::new(octets[2], octets[3], octets[4], octets[5]));
    }
    None
}

/// Resolves a hostname to the addresses a connection could reach.
pub trait HostResolver: Send + Sync + fmt::Debug {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>>;
}

/// Resolver backed by the operating system via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host, port)).await?;
            Ok(addrs.map(|sa| sa.ip()).collect())
        })
    }
}

/// Marker attached to the synthetic response of a refused request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedRequest {
    pub host: String,
    pub address: Option<IpAddr>,
    pub reason: String,
}

impl BlockedRequest {
    fn restricted_address(host: &str, address: IpAddr) -> Self {
        Self {
            host: host.to_string(),
            address: Some(address),
            reason: format!(
                "request blocked: target host {} resolves to a restricted address ({})",
                host, address
            ),
        }
    }

    fn disallowed(host: &str, why: &str) -> Self {
        Self {
            host: host.to_string(),
            address: None,
            reason: format!("request blocked: {} for host {}", why, host),
        }
    }

    /// The blocked marker on a response produced by the guard, if any.
    pub fn from_response(response: &Response) -> Option<&BlockedRequest> {
        response.extensions().get::<BlockedRequest>()
    }

    fn into_response(self) -> Response {
        let mut response = http::Response::new(self.reason.clone());
        *response.status_mut() = StatusCode::FORBIDDEN;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.extensions_mut().insert(self);
        Response::from(response)
    }
}

impl fmt::Display for BlockedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct SsrfGuard {
    resolver: Arc<dyn HostResolver>,
}

impl SsrfGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Inspects the target of `url`. `Ok(None)` means the request may proceed.
    pub async fn check(&self, url: &Url) -> Result<Option<BlockedRequest>, FetchError> {
        let host_label = url.host_str().unwrap_or_default();
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            let why = format!("scheme {} is not allowed", scheme);
            return Ok(Some(BlockedRequest::disallowed(host_label, &why)));
        }

        let addrs = match url.host() {
            None => return Ok(Some(BlockedRequest::disallowed(host_label, "missing host"))),
            Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(Host::Domain(domain)) => {
                let port = url.port_or_known_default().unwrap_or(80);
                let addrs = self.resolver.resolve(domain, port).await.map_err(|e| {
                    FetchError::network(
                        url.as_str(),
                        "ResolveHost",
                        Some(anyhow::anyhow!("DNS lookup for {} failed: {}", domain, e)),
                    )
                })?;
                if addrs.is_empty() {
                    return Err(FetchError::network(
                        url.as_str(),
                        "ResolveHost",
                        Some(anyhow::anyhow!("{} resolved to no addresses", domain)),
                    ));
                }
                addrs
            }
        };

        Ok(addrs
            .into_iter()
            .find(is_restricted)
            .map(|addr| BlockedRequest::restricted_address(host_label, addr)))
    }
}

impl Default for SsrfGuard {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl Interceptor for SsrfGuard {
    fn intercept<'a>(
        &'a self,
        request: Request,
        ctx: &'a RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        Box::pin(async move {
            let verdict = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return Err(FetchError::cancelled(request.url().as_str(), "ResolveHost"));
                }
                verdict = self.check(request.url()) => verdict?,
            };
            if let Some(blocked) = verdict {
                tracing::warn!(
                    host = %blocked.host,
                    address = ?blocked.address,
                    "refusing outbound request to restricted target"
                );
                return Ok(blocked.into_response());
            }
            next.run(request, ctx).await
        })
    }
}
