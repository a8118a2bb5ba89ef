//! One remote OAI endpoint: paged requests, recovery from transient HTTP
//! errors, protocol error detection and resumption-token pagination.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;

use crate::config::EndpointConfig;
use crate::error::{EndpointFailure, HarvesterError, HttpError, ProtocolError, Result};
use crate::http::{self, FailedRequest, Fetched};
use crate::pacing::{CancellationFlag, Sleeper, ThreadSleeper};
use crate::xml::{Namespaces, XmlDoc};

/// Inline protocol error: `<error code="...">message</error>`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static PROTOCOL_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<error\s+code="([^"]*)"\s*(?:/>|>([^<]*)</error>)"#).expect("valid regex")
});

/// Ordered request arguments. Arguments with no value are left out of the
/// query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    pairs: Vec<(String, Option<String>)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// The argument set that continues a paginated sequence.
    pub fn resumption(token: &str) -> Self {
        Self::new().with("resumptionToken", Some(token))
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: Option<&str>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a value, keeping the original position of an existing key.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        let value = value.map(str::to_owned);
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Arguments that carry a value, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

/// Build `?verb=<verb>&k1=v1&...` from the arguments that have a value.
///
/// Values are passed through verbatim; resumption tokens are opaque and
/// must be echoed exactly.
///
/// # Examples
/// ```
/// use oai_harvester::endpoint::{make_query_string, Arguments};
///
/// let args = Arguments::new()
///     .with("metadataPrefix", Some("untl_raw"))
///     .with("from", None)
///     .with("until", None)
///     .with("set", Some("access_rights:public"));
/// assert_eq!(
///     make_query_string("ListIdentifiers", &args),
///     "?verb=ListIdentifiers&metadataPrefix=untl_raw&set=access_rights:public"
/// );
/// ```
pub fn make_query_string(verb: &str, arguments: &Arguments) -> String {
    let pairs: Vec<String> = std::iter::once(("verb", verb))
        .chain(arguments.iter())
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Pulls items out of one page of results.
pub trait Extractor {
    type Item;

    fn extract(&self, page: &XmlDoc) -> Result<Vec<Self::Item>>;
}

impl<F, T> Extractor for F
where
    F: Fn(&XmlDoc) -> Result<Vec<T>>,
{
    type Item = T;

    fn extract(&self, page: &XmlDoc) -> Result<Vec<T>> {
        self(page)
    }
}

/// Text of every `oai:identifier` element on the page.
pub fn extract_identifiers(page: &XmlDoc) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for element in page.find_all_by_tag("oai:identifier", None)? {
        match element.text().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ids.push(id.to_string()),
            None => tracing::warn!("Skipping empty identifier element"),
        }
    }
    Ok(ids)
}

/// Every `oai:record` element on the page.
pub fn extract_records(page: &XmlDoc) -> Result<Vec<XmlDoc>> {
    Ok(page.find_all_by_tag("oai:record", None)?.collect())
}

/// Scan a response body for an inline protocol error.
pub fn find_protocol_error(body: &str) -> Option<ProtocolError> {
    let captures = PROTOCOL_ERROR_PATTERN.captures(body)?;
    Some(ProtocolError {
        code: captures.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        message: captures.get(2).map(|m| m.as_str()).unwrap_or_default().to_string(),
    })
}

/// Resumption token of a page, exactly as the server sent it.
///
/// A missing, empty or all-whitespace token marks the last page.
pub fn resumption_token(page: &XmlDoc) -> Result<Option<String>> {
    let token = page
        .find_first_by_tag("oai:resumptionToken", None)?
        .and_then(|el| el.text().map(str::to_owned))
        .filter(|t| !t.trim().is_empty());
    Ok(token)
}

/// Client for one OAI endpoint.
///
/// Counters and the error list live for the whole session: the recovery
/// count never resets, so retries stay bounded by
/// [`EndpointConfig::max_recoveries`] across all fetches.
pub struct Endpoint {
    url: String,
    config: EndpointConfig,
    client: Client,
    sleeper: Box<dyn Sleeper>,
    cancel: CancellationFlag,
    namespaces: Arc<Namespaces>,
    raw_bytes: u64,
    data_bytes: u64,
    num_recoveries: u32,
    http_errors: Vec<HttpError>,
    protocol_error: Option<ProtocolError>,
    last_page: Option<XmlDoc>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("raw_bytes", &self.raw_bytes)
            .field("data_bytes", &self.data_bytes)
            .field("num_recoveries", &self.num_recoveries)
            .field("http_errors", &self.http_errors)
            .field("protocol_error", &self.protocol_error)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Create an endpoint that sleeps on the current thread.
    pub fn new(url: &str, namespaces: Namespaces, config: EndpointConfig) -> Result<Self> {
        Self::with_sleeper(url, namespaces, config, ThreadSleeper)
    }

    /// Create an endpoint with a custom waiting strategy.
    pub fn with_sleeper<S>(
        url: &str,
        namespaces: Namespaces,
        config: EndpointConfig,
        sleeper: S,
    ) -> Result<Self>
    where
        S: Sleeper + 'static,
    {
        let client = http::create_client_with_timeout(config.timeout)?;
        Ok(Self {
            url: url.to_string(),
            config,
            client,
            sleeper: Box::new(sleeper),
            cancel: CancellationFlag::new(),
            namespaces: Arc::new(namespaces),
            raw_bytes: 0,
            data_bytes: 0,
            num_recoveries: 0,
            http_errors: Vec::new(),
            protocol_error: None,
            last_page: None,
        })
    }

    /// Attach a cancellation flag, checked before requests and while sleeping.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Bytes received on the wire.
    pub fn raw_bytes(&self) -> u64 {
        self.raw_bytes
    }

    /// Bytes after decompression.
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn num_recoveries(&self) -> u32 {
        self.num_recoveries
    }

    pub fn http_errors(&self) -> &[HttpError] {
        &self.http_errors
    }

    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        self.protocol_error.as_ref()
    }

    pub fn last_page(&self) -> Option<&XmlDoc> {
        self.last_page.as_ref()
    }

    /// Fetch one page after the configured courtesy delay.
    pub fn get_page(&mut self, verb: &str, arguments: &Arguments) -> Result<XmlDoc> {
        self.get_page_after(verb, arguments, None)
    }

    /// Fetch one page, waiting `sleep_override` (instead of the configured
    /// delay) before the first attempt.
    ///
    /// # Errors
    /// * `HarvesterError::Endpoint` when recovery is exhausted or disabled, or
    ///   the server reports a protocol error
    /// * `HarvesterError::XmlParse` for a malformed response
    /// * `HarvesterError::Cancelled` if the cancellation flag is raised
    pub fn get_page_after(
        &mut self,
        verb: &str,
        arguments: &Arguments,
        sleep_override: Option<Duration>,
    ) -> Result<XmlDoc> {
        let url = format!("{}{}", self.url, make_query_string(verb, arguments));
        let mut wait = sleep_override.unwrap_or(self.config.sleep_time);

        let body = loop {
            self.pause(wait)?;
            if self.config.verbose {
                tracing::info!(url = %url, "Requesting page");
            } else {
                tracing::debug!(url = %url, "Requesting page");
            }

            match http::fetch(&self.client, &url)? {
                Fetched::Body(body) => break body,
                Fetched::Failed(failed) => wait = self.recover(failed)?,
            }
        };

        self.raw_bytes += body.len() as u64;
        let body = http::decompress(body);
        self.data_bytes += body.len() as u64;
        let text = http::bytes_to_string(&body, &url);

        if let Some(error) = find_protocol_error(&text) {
            tracing::error!(code = %error.code, message = %error.message, url = %url, "OAI server reported an error");
            self.protocol_error = Some(error);
            return Err(self.bail(None));
        }

        let page = XmlDoc::parse_shared(&text, Arc::clone(&self.namespaces))?;
        self.last_page = Some(page.clone());
        Ok(page)
    }

    /// Fetch every page of a paginated result and concatenate the items
    /// `extractor` pulls from each page, in page order.
    ///
    /// After the first page, the only argument sent is the resumption token.
    pub fn compile_data<E>(
        &mut self,
        verb: &str,
        arguments: &Arguments,
        extractor: &E,
    ) -> Result<Vec<E::Item>>
    where
        E: Extractor + ?Sized,
    {
        let mut data = Vec::new();
        let mut arguments = arguments.clone();
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self.get_page(verb, &arguments)?;
            pages += 1;
            data.extend(extractor.extract(&page)?);

            let Some(token) = resumption_token(&page)? else {
                break;
            };
            if !seen_tokens.insert(token.clone()) {
                return Err(self.bail(Some(&format!("Resumption token '{token}' repeated."))));
            }
            tracing::debug!(verb, pages, token = %token, "Following resumption token");
            arguments = Arguments::resumption(&token);
        }

        tracing::debug!(verb, pages, items = data.len(), "Compiled paginated result");
        Ok(data)
    }

    fn pause(&self, wait: Duration) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HarvesterError::Cancelled);
        }
        if !wait.is_zero() && !self.sleeper.sleep(wait, &self.cancel) {
            return Err(HarvesterError::Cancelled);
        }
        Ok(())
    }

    /// Record a failed request and decide how long to wait before retrying.
    fn recover(&mut self, failed: FailedRequest) -> Result<Duration> {
        tracing::warn!(error = %failed.error, "Request failed");
        let unavailable = failed.is_service_unavailable();
        self.http_errors.push(failed.error);

        let wait = if unavailable {
            match failed.retry_after {
                Some(wait) => wait,
                None => return Err(self.bail(Some("Retries are disabled."))),
            }
        } else {
            self.config.recovery_wait
        };

        if self.num_recoveries >= self.config.max_recoveries {
            return Err(self.bail(Some("Exceeded max number of recovery attempts.")));
        }
        self.num_recoveries += 1;

        tracing::warn!(
            wait_secs = wait.as_secs_f64(),
            recovery = self.num_recoveries,
            max_recoveries = self.config.max_recoveries,
            "Retrying"
        );
        Ok(wait)
    }

    fn bail(&self, reason: Option<&str>) -> HarvesterError {
        HarvesterError::Endpoint(EndpointFailure {
            reason: reason.map(str::to_owned),
            http_errors: self.http_errors.clone(),
            protocol_error: self.protocol_error.clone(),
        })
    }
}
