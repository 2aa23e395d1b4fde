use reqwest::header::{ACCEPT_ENCODING, ETAG, IF_NONE_MATCH};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while retrieving a feed.
///
/// Only transport-level conditions are errors here; HTTP status codes are
/// returned in-band via [`FetchedContent::status`] and branched on by the
/// orchestrator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, malformed response)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
}

/// Result of one conditional GET.
#[derive(Debug)]
pub struct FetchedContent {
    /// Raw response body (empty for a 304)
    pub body: Vec<u8>,
    /// Cache validator from the response, if the origin sent one
    pub etag: Option<String>,
    /// Numeric HTTP status code
    pub status: u16,
}

/// Perform a conditional GET against a feed URL.
///
/// When `etag` is known from a previous fetch it is sent as `If-None-Match`
/// so the origin may answer 304. When `use_http_compression` is false,
/// `Accept-Encoding: identity` explicitly suppresses compression.
///
/// Stateless: no side effects beyond the network call.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    etag: Option<&str>,
    use_http_compression: bool,
    timeout: Duration,
) -> Result<FetchedContent, FetchError> {
    let mut request = client.get(url);
    if let Some(etag) = etag {
        request = request.header(IF_NONE_MATCH, etag);
    }
    if !use_http_compression {
        request = request.header(ACCEPT_ENCODING, "identity");
    }

    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Transport)?;

    let status = response.status().as_u16();
    let new_etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let body = tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Transport)?
        .to_vec();

    Ok(FetchedContent {
        body,
        etag: new_etag,
        status,
    })
}
