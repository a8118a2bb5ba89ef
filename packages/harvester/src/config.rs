//! Configuration constants and validation functions for the harvester.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvesterError, Result};

/// Namespace prefix of the protocol itself.
pub const OAI_PREFIX: &str = "oai";

/// Namespace URI of the protocol itself.
pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";

/// Namespace URI of the UNT metadata format.
pub const UNTL_NAMESPACE: &str = "http://digital2.library.unt.edu/untl/";

/// Metadata format requested when none is configured.
pub const DEFAULT_METADATA_PREFIX: &str = "oai_dc";

/// User agent string identifying this harvester.
pub const USER_AGENT: &str = concat!("oai-harvester/", env!("CARGO_PKG_VERSION"));

/// Content types the endpoint asks for.
pub const ACCEPT: &str = "text/html";

/// Encodings the endpoint accepts. Only zlib streams are decoded.
pub const ACCEPT_ENCODING: &str = "compress, deflate";

/// HTTP timeout in seconds.
///
/// OAI list pages can be large and slow to generate server-side.
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Wait before retrying after an HTTP error other than 503.
pub const DEFAULT_RECOVERY_WAIT_SECS: u64 = 60;

/// Number of recoveries an endpoint may attempt per session.
pub const DEFAULT_MAX_RECOVERIES: u32 = 3;

/// Base URL of the UNT Digital Library.
pub const UNT_SERVER_URL: &str = "https://digital.library.unt.edu";

/// Path suffix selecting the high resolution PDF of an item.
pub const PDF_QUALIFIER: &str = "m2/1/high_res_d/";

/// Metadata format used for UNT collection harvests.
pub const UNT_METADATA_PREFIX: &str = "untl_raw";

/// Set filter used for UNT collection harvests.
pub const UNT_PUBLIC_SET: &str = "access_rights:public";

/// Collections harvested by default, with the number of items wanted.
pub const DEFAULT_COLLECTIONS: &[(&str, usize)] = &[("UNTETD", 667), ("CRSR", 667), ("EOT", 666)];

/// Per-endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Log per-request progress at `info` instead of `debug`.
    pub verbose: bool,

    /// Courtesy delay before every request.
    pub sleep_time: Duration,

    /// Recovery budget for the whole session.
    pub max_recoveries: u32,

    /// Wait before retrying after a non-503 HTTP error.
    pub recovery_wait: Duration,

    /// Per-request network timeout.
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            sleep_time: Duration::ZERO,
            max_recoveries: DEFAULT_MAX_RECOVERIES,
            recovery_wait: Duration::from_secs(DEFAULT_RECOVERY_WAIT_SECS),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

impl EndpointConfig {
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    #[must_use]
    pub fn with_max_recoveries(mut self, max_recoveries: u32) -> Self {
        self.max_recoveries = max_recoveries;
        self
    }

    #[must_use]
    pub fn with_recovery_wait(mut self, recovery_wait: Duration) -> Self {
        self.recovery_wait = recovery_wait;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Day granularity datestamp: YYYY-MM-DD.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static DAY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Seconds granularity datestamp: YYYY-MM-DDThh:mm:ssZ.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static SECONDS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").expect("valid regex"));

/// Validate an OAI datestamp used as a `from`/`until` bound.
///
/// # Returns
/// * `Ok(NaiveDateTime)` with the parsed instant (midnight for day granularity)
/// * `Err(HarvesterError::InvalidDatestamp)` if the format or date is invalid
///
/// # Examples
/// ```
/// use oai_harvester::config::validate_datestamp;
///
/// assert!(validate_datestamp("2025-01-01").is_ok());
/// assert!(validate_datestamp("2025-01-01T12:30:00Z").is_ok());
/// assert!(validate_datestamp("2025-13-01").is_err()); // Invalid month
/// assert!(validate_datestamp("01-01-2025").is_err());
/// ```
pub fn validate_datestamp(datestamp: &str) -> Result<chrono::NaiveDateTime> {
    let invalid = || HarvesterError::InvalidDatestamp(datestamp.to_string());

    if DAY_PATTERN.is_match(datestamp) {
        let date = chrono::NaiveDate::parse_from_str(datestamp, "%Y-%m-%d").map_err(|_| invalid())?;
        return date.and_hms_opt(0, 0, 0).ok_or_else(invalid);
    }

    if SECONDS_PATTERN.is_match(datestamp) {
        return chrono::NaiveDateTime::parse_from_str(datestamp, "%Y-%m-%dT%H:%M:%SZ")
            .map_err(|_| invalid());
    }

    Err(invalid())
}

/// Build the OAI endpoint URL of a UNT collection.
pub fn collection_oai_url(server_url: &str, collection: &str) -> String {
    format!("{}/explore/collections/{collection}/oai", server_url.trim_end_matches('/'))
}

/// Make an identifier safe to use as a file name stem.
///
/// # Examples
/// ```
/// use oai_harvester::config::sanitize_file_stem;
///
/// assert_eq!(sanitize_file_stem("metadc123"), "metadc123");
/// assert_eq!(sanitize_file_stem("oai:x.org:ark:/67531/metadc1"), "oai_x.org_ark__67531_metadc1");
/// ```
pub fn sanitize_file_stem(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '~' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
