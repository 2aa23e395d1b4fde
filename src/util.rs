//! Small shared utilities: the content hash used for entry identity and
//! dispatch-uid derivation, and feed-URL validation.

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Errors that can occur when validating a feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates a URL string for use as a feed source.
///
/// Feed URLs are operator-supplied, so only structural checks apply: the
/// string must parse and use an http(s) scheme. Loopback hosts stay valid
/// (feeds behind local proxies are a supported setup).
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Deterministic content hash of an identifier string, rendered as lowercase
/// hex. Used both for entry identity (`uid_hash`) and to derive a
/// `dispatch_uid` from a handler key when the caller does not supply one.
///
/// Stability across calls and process restarts is load-bearing: stored
/// hashes are compared against freshly computed ones on every fetch.
pub fn content_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}
