//! HTTP client wrapper for talking to OAI endpoints.

use std::io::Read;
use std::time::{Duration, SystemTime};

use flate2::read::ZlibDecoder;
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;

use crate::config::{ACCEPT, ACCEPT_ENCODING, HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::{HttpError, Result};

/// Longest wait a `Retry-After` header may request.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Create a configured HTTP client with the default timeout.
pub fn create_client() -> Result<Client> {
    create_client_with_timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
}

/// Create a configured HTTP client.
///
/// Sends the identifying header set on every request. Automatic response
/// decompression is left off; bodies are decoded by [`decompress`].
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODING));

    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// A request that reached the point of an HTTP-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub error: HttpError,

    /// Parsed `Retry-After` header, when present and usable.
    pub retry_after: Option<Duration>,
}

impl FailedRequest {
    pub fn is_service_unavailable(&self) -> bool {
        self.error.status == Some(StatusCode::SERVICE_UNAVAILABLE.as_u16())
    }
}

/// Outcome of one GET.
#[derive(Debug)]
pub enum Fetched {
    Body(Vec<u8>),
    Failed(FailedRequest),
}

/// Issue one GET, classifying failures.
///
/// Error statuses, connection failures and timeouts come back as
/// [`Fetched::Failed`] so the caller can decide whether to retry. Anything
/// else (invalid URL, redirect loops) is returned as an error.
pub fn fetch(client: &Client, url: &str) -> Result<Fetched> {
    let response = match client.get(url).send() {
        Ok(response) => response,
        Err(e) if e.is_connect() || e.is_timeout() => {
            return Ok(Fetched::Failed(FailedRequest {
                error: HttpError {
                    url: url.to_string(),
                    status: None,
                    message: e.to_string(),
                },
                retry_after: None,
            }));
        }
        Err(e) => return Err(e.into()),
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Ok(Fetched::Failed(FailedRequest {
            error: HttpError {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            },
            retry_after,
        }));
    }

    match response.bytes() {
        Ok(bytes) => Ok(Fetched::Body(bytes.to_vec())),
        Err(e) => Ok(Fetched::Failed(FailedRequest {
            error: HttpError {
                url: url.to_string(),
                status: None,
                message: format!("Failed to read response body: {e}"),
            },
            retry_after: None,
        })),
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// Negative or unparseable values yield `None`. Dates in the past yield
/// a zero wait.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use oai_harvester::http::parse_retry_after;
///
/// assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_retry_after("-1"), None);
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        if seconds < 0 {
            tracing::debug!(seconds, "Negative Retry-After value");
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let wait = Duration::from_secs(seconds as u64);
        return Some(wait.min(MAX_RETRY_AFTER));
    }

    let when = httpdate::parse_http_date(value).ok()?;
    let wait = when
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(wait.min(MAX_RETRY_AFTER))
}

/// Inflate a zlib stream, or return the input unchanged if it is not one.
pub fn decompress(data: Vec<u8>) -> Vec<u8> {
    let mut decoded = Vec::new();
    match ZlibDecoder::new(data.as_slice()).read_to_end(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => data,
    }
}

/// Decode bytes as UTF-8, replacing invalid sequences.
pub fn bytes_to_string(bytes: &[u8], context: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracing::warn!(context, error = %e, "Response is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}
