//! Fetch event interception
//!
//! Every request that reaches the fallback becomes a fetch event. Its URI
//! is rebuilt against the origin so the worker sees the same identity it
//! was configured with.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::Uri,
    response::Response,
};
use bytes::Bytes;
use pwa_cache_core::FetchOutcome;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

/// Largest request body accepted for forwarding
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Fallback handler: run the worker, forward what it passes through
pub async fn intercept(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let request = to_fetch_request(&state.origin, request).await?;

    match state.worker.handle_fetch(request).await? {
        FetchOutcome::Responded(response) => Ok(response.map(Body::from)),
        FetchOutcome::PassThrough(request) => {
            debug!("Forwarding {} {}", request.method(), request.uri());
            let response = state.fetcher.fetch(&request).await?;
            metrics::counter!(
                "pwa_cache_requests_total",
                "policy" => "pass_through",
                "outcome" => "forwarded"
            )
            .increment(1);
            Ok(response.map(Body::from))
        }
    }
}

/// Buffer the body and point the URI at the origin
async fn to_fetch_request(
    origin: &Url,
    request: Request,
) -> Result<http::Request<Bytes>, ApiError> {
    let (mut parts, body) = request.into_parts();

    parts.uri = origin_uri(origin, parts.uri.path(), parts.uri.query())?;

    let body = to_bytes(body, MAX_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

    Ok(http::Request::from_parts(parts, body))
}

/// Origin URL with its path and query replaced
///
/// Only the path and query of the incoming target are used, so the result
/// always keeps the origin's scheme, host and port.
fn origin_uri(origin: &Url, path: &str, query: Option<&str>) -> Result<Uri, ApiError> {
    let mut url = origin.clone();
    url.set_path(path);
    url.set_query(query);
    url.set_fragment(None);

    if url.scheme() != origin.scheme()
        || url.host_str() != origin.host_str()
        || url.port_or_known_default() != origin.port_or_known_default()
    {
        return Err(ApiError::BadRequest(format!("Path {} leaves the origin", path)));
    }

    url.as_str()
        .parse::<Uri>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid path {}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_uri_keeps_query() {
        let origin = Url::parse("http://origin.test").unwrap();
        let uri = origin_uri(&origin, "/index.html", Some("lang=en")).unwrap();
        assert_eq!(uri.to_string(), "http://origin.test/index.html?lang=en");
    }

    #[test]
    fn test_origin_uri_replaces_origin_path() {
        let origin = Url::parse("http://origin.test/base/").unwrap();
        let uri = origin_uri(&origin, "/app.js", None).unwrap();
        assert_eq!(uri.to_string(), "http://origin.test/app.js");
    }

    #[test]
    fn test_origin_uri_keeps_authority_for_scheme_relative_path() {
        let origin = Url::parse("http://origin.test:8000").unwrap();
        let uri = origin_uri(&origin, "//other.host/x", Some("a=b")).unwrap();
        assert_eq!(uri.host(), Some("origin.test"));
        assert_eq!(uri.port_u16(), Some(8000));
        assert_eq!(uri.path(), "//other.host/x");
        assert_eq!(uri.query(), Some("a=b"));
    }

    #[test]
    fn test_absolute_form_target_stays_on_origin() {
        let origin = Url::parse("http://origin.test").unwrap();
        let target: Uri = "http://other.host/steal?x=1".parse().unwrap();
        let uri = origin_uri(&origin, target.path(), target.query()).unwrap();
        assert_eq!(uri.to_string(), "http://origin.test/steal?x=1");
    }
}
