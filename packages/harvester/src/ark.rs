//! ARK persistent identifiers (`ark:/NAAN/NAME`).

use std::fmt;
use std::str::FromStr;

use crate::config::PDF_QUALIFIER;
use crate::error::{HarvesterError, Result};

/// An ARK identifier split into naming authority and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArkId {
    naan: String,
    name: String,
}

impl ArkId {
    /// Parse `ark:/67531/metadc123`.
    ///
    /// The leading segment only has to be present: `info:ark/67531/metadc123`
    /// parses to the same identifier.
    ///
    /// # Examples
    /// ```
    /// use oai_harvester::ark::ArkId;
    ///
    /// let ark = ArkId::parse("ark:/67531/metadc123").unwrap();
    /// assert_eq!(ark.naan(), "67531");
    /// assert_eq!(ark.name(), "metadc123");
    /// assert!(ArkId::parse("metadc123").is_err());
    /// ```
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = || HarvesterError::InvalidArkId(id.to_string());

        let mut parts = id.trim().split('/');
        let (Some(scheme), Some(naan), Some(name), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if scheme.is_empty() || naan.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            naan: naan.to_string(),
            name: name.to_string(),
        })
    }

    /// Naming authority number.
    pub fn naan(&self) -> &str {
        &self.naan
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL of the item's primary binary document on `server_url`.
    ///
    /// # Examples
    /// ```
    /// use oai_harvester::ark::ArkId;
    ///
    /// let ark = ArkId::parse("ark:/67531/metadc123").unwrap();
    /// assert_eq!(
    ///     ark.document_url("https://digital.library.unt.edu"),
    ///     "https://digital.library.unt.edu/ark:/67531/metadc123/m2/1/high_res_d/"
    /// );
    /// ```
    pub fn document_url(&self, server_url: &str) -> String {
        format!(
            "{}/{self}/{PDF_QUALIFIER}",
            server_url.trim_end_matches('/')
        )
    }
}

impl fmt::Display for ArkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ark:/{}/{}", self.naan, self.name)
    }
}

impl FromStr for ArkId {
    type Err = HarvesterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let ark: ArkId = "ark:/67531/metadc1234".parse().unwrap();
        assert_eq!(ark.naan(), "67531");
        assert_eq!(ark.name(), "metadc1234");
        assert_eq!(ark.to_string(), "ark:/67531/metadc1234");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ArkId::parse("").is_err());
        assert!(ArkId::parse("ark:/67531").is_err());
        assert!(ArkId::parse("ark:/67531/metadc1/extra").is_err());
        assert!(ArkId::parse("ark://metadc1").is_err());
        assert!(ArkId::parse("/67531/metadc1").is_err());
    }

    #[test]
    fn test_parse_info_scheme() {
        let ark = ArkId::parse("info:ark/67531/metadc123").unwrap();
        assert_eq!(ark.naan(), "67531");
        assert_eq!(ark.name(), "metadc123");
        assert_eq!(ark, ArkId::parse("ark:/67531/metadc123").unwrap());
        assert_eq!(
            ark.document_url("https://digital.library.unt.edu"),
            "https://digital.library.unt.edu/ark:/67531/metadc123/m2/1/high_res_d/"
        );
    }

    #[test]
    fn test_document_url_trailing_slash() {
        let ark = ArkId::parse("ark:/67531/metadc1").unwrap();
        assert_eq!(
            ark.document_url("http://localhost:9000/"),
            "http://localhost:9000/ark:/67531/metadc1/m2/1/high_res_d/"
        );
    }
}
