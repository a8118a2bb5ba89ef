//! Error types for the harvester.
//!
//! Uses the dual-error pattern: `HarvesterError` for library consumers
//! with detailed error context, and small record types (`HttpError`,
//! `ProtocolError`, `EndpointFailure`) that carry per-request diagnostics.

use std::fmt;

use thiserror::Error;

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// Malformed XML in a response or document.
    #[error("XML parsing failed: {0}")]
    XmlParse(#[from] roxmltree::Error),

    /// A tag query used a namespace prefix that is not registered.
    #[error("Unknown namespace prefix '{prefix}' in '{tag}'")]
    UnknownNamespace { prefix: String, tag: String },

    /// A path query could not be compiled.
    #[error("Invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Terminal failure of one page fetch or paginated harvest.
    #[error(transparent)]
    Endpoint(#[from] EndpointFailure),

    /// HTTP request could not be issued at all (bad URL, client setup).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The caller cancelled the harvest.
    #[error("Harvest cancelled")]
    Cancelled,

    /// Invalid datestamp format.
    #[error("Invalid datestamp: '{0}'. Expected YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ")]
    InvalidDatestamp(String),

    /// `from` lies after `until`.
    #[error("Invalid date range: from '{from}' is after until '{until}'")]
    InvalidDateRange { from: String, until: String },

    /// `GetRecord` returned a page without a record.
    #[error("No record returned for '{0}'")]
    RecordNotFound(String),

    /// Malformed ARK identifier.
    #[error("Invalid ARK identifier: '{0}'. Expected ark:/NAAN/NAME")]
    InvalidArkId(String),

    /// The document-text extractor rejected its input.
    #[error("Text extraction failed: {0}")]
    Extraction(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;

/// One failed HTTP exchange with an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Requested URL.
    pub url: String,

    /// Response status, or `None` when no response arrived (connect/timeout).
    pub status: Option<u16>,

    /// Human-readable description.
    pub message: String,
}

impl HttpError {
    /// Short code used in failure summaries: the status, or `network`.
    pub fn code(&self) -> String {
        self.status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "network".to_string())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.code(), self.message)
    }
}

/// An application-level error reported inline by the OAI server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code={} '{}'", self.code, self.message)
    }
}

/// Fatal endpoint failure, with every error seen so far for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct EndpointFailure {
    /// Why the endpoint gave up, if a specific rule triggered it.
    pub reason: Option<String>,

    /// All HTTP errors accumulated by the endpoint during the session.
    pub http_errors: Vec<HttpError>,

    /// The protocol error that ended the fetch, if any.
    pub protocol_error: Option<ProtocolError>,
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encountered fatal errors while contacting the OAI server.")?;
        if let Some(reason) = &self.reason {
            write!(f, " {reason}")?;
        }
        if !self.http_errors.is_empty() {
            let codes: Vec<String> = self.http_errors.iter().map(HttpError::code).collect();
            write!(f, " HTTP Errors: {}", codes.join(", "))?;
        }
        if let Some(protocol_error) = &self.protocol_error {
            write!(f, " OAI Error: {protocol_error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_namespace_display() {
        let err = HarvesterError::UnknownNamespace {
            prefix: "dc".to_string(),
            tag: "dc:title".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown namespace prefix 'dc' in 'dc:title'");
    }

    #[test]
    fn test_endpoint_failure_lists_everything() {
        let failure = EndpointFailure {
            reason: Some("Exceeded max number of recovery attempts.".to_string()),
            http_errors: vec![
                HttpError {
                    url: "http://x/oai".to_string(),
                    status: Some(500),
                    message: "Internal Server Error".to_string(),
                },
                HttpError {
                    url: "http://x/oai".to_string(),
                    status: None,
                    message: "connection refused".to_string(),
                },
            ],
            protocol_error: None,
        };
        assert_eq!(
            failure.to_string(),
            "Encountered fatal errors while contacting the OAI server. \
             Exceeded max number of recovery attempts. HTTP Errors: 500, network"
        );
    }

    #[test]
    fn test_endpoint_failure_with_protocol_error() {
        let err = HarvesterError::from(EndpointFailure {
            reason: None,
            http_errors: Vec::new(),
            protocol_error: Some(ProtocolError {
                code: "badArgument".to_string(),
                message: "Bad argument".to_string(),
            }),
        });
        assert_eq!(
            err.to_string(),
            "Encountered fatal errors while contacting the OAI server. \
             OAI Error: code=badArgument 'Bad argument'"
        );
    }
}
