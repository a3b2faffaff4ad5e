//! Network fetcher

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HOST};
use http::{Request, Response, Uri};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;

/// Headers that only apply to a single connection and are never forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Issues network requests on behalf of the cache
///
/// A non-success status is a response like any other; only transport
/// failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, ProxyError>;
}

/// HTTP fetcher configuration
#[derive(Clone, Debug)]
pub struct HttpFetcherConfig {
    /// Origin that origin-relative request URIs are resolved against
    pub origin: Option<String>,
    /// Whole-request timeout
    pub timeout: Duration,
    /// User agent sent when the request carries none
    pub user_agent: String,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            origin: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("pwa-cache/{}", env!("CARGO_PKG_VERSION")),
            skip_tls_verify: false,
        }
    }
}

/// HTTP fetcher backed by a shared `reqwest` client
pub struct HttpFetcher {
    origin: Option<Url>,
    client: Client,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: HttpFetcherConfig) -> Result<Self, ProxyError> {
        let origin = config
            .origin
            .as_deref()
            .map(|o| Url::parse(o).map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", o, e))))
            .transpose()?;

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str());

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        match &origin {
            Some(origin) => info!("Created HTTP fetcher for origin {}", origin),
            None => info!("Created HTTP fetcher without origin"),
        }

        Ok(Self { origin, client })
    }

    /// Resolve a request URI to an absolute URL
    pub fn resolve(&self, uri: &Uri) -> Result<Url, ProxyError> {
        let raw = uri.to_string();
        match Url::parse(&raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let origin = self.origin.as_ref().ok_or_else(|| {
                    ProxyError::InvalidUrl(format!("{} is relative and no origin is set", raw))
                })?;
                origin
                    .join(&raw)
                    .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", raw, e)))
            }
            Err(e) => Err(ProxyError::InvalidUrl(format!("{}: {}", raw, e))),
        }
    }
}

/// Copy a header map without connection-level headers
fn forwardable_headers(headers: &HeaderMap, drop_host: bool) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || (drop_host && name == HOST) {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request<Bytes>) -> Result<Response<Bytes>, ProxyError> {
        let url = self.resolve(request.uri())?;
        debug!("Fetching {} {}", request.method(), url);

        let response = self
            .client
            .request(request.method().clone(), url)
            .headers(forwardable_headers(request.headers(), true))
            .body(request.body().clone())
            .send()
            .await?;

        let status = response.status();
        let headers = forwardable_headers(response.headers(), false);
        let body = response.bytes().await?;

        debug!("Fetched {} ({} bytes)", status, body.len());

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
