//! Harvester: the three OAI verbs on top of an [`Endpoint`].

use crate::config::{validate_datestamp, EndpointConfig, DEFAULT_METADATA_PREFIX};
use crate::endpoint::{extract_identifiers, extract_records, Arguments, Endpoint, Extractor};
use crate::error::{HarvesterError, Result};
use crate::xml::{Namespaces, XmlDoc};

/// Caller-facing harvest options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestOptions {
    /// Metadata format; `oai_dc` when not given.
    pub metadata_prefix: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
}

impl HarvestOptions {
    #[must_use]
    pub fn with_metadata_prefix(mut self, prefix: &str) -> Self {
        self.metadata_prefix = Some(prefix.to_string());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: &str) -> Self {
        self.from = Some(from.to_string());
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: &str) -> Self {
        self.until = Some(until.to_string());
        self
    }

    #[must_use]
    pub fn with_set(mut self, set: &str) -> Self {
        self.set = Some(set.to_string());
        self
    }

    /// Validate and turn into the argument set sent with list verbs.
    ///
    /// # Errors
    /// * `HarvesterError::InvalidDatestamp` for a malformed bound
    /// * `HarvesterError::InvalidDateRange` if `from` is after `until`
    pub fn normalize(&self) -> Result<Arguments> {
        let from = self.from.as_deref().map(validate_datestamp).transpose()?;
        let until = self.until.as_deref().map(validate_datestamp).transpose()?;
        if let (Some(f), Some(u)) = (from, until) {
            if f > u {
                return Err(HarvesterError::InvalidDateRange {
                    from: self.from.clone().unwrap_or_default(),
                    until: self.until.clone().unwrap_or_default(),
                });
            }
        }

        let prefix = self
            .metadata_prefix
            .as_deref()
            .unwrap_or(DEFAULT_METADATA_PREFIX);

        Ok(Arguments::new()
            .with("metadataPrefix", Some(prefix))
            .with("from", self.from.as_deref())
            .with("until", self.until.as_deref())
            .with("set", self.set.as_deref()))
    }
}

/// Harvests one OAI endpoint with a fixed option set.
#[derive(Debug)]
pub struct Harvester {
    endpoint: Endpoint,
    options: Arguments,
}

impl Harvester {
    /// Create a harvester with its own endpoint for `url`.
    pub fn new(url: &str, options: &HarvestOptions, namespaces: Namespaces) -> Result<Self> {
        let endpoint = Endpoint::new(url, namespaces, EndpointConfig::default())?;
        Self::from_endpoint(endpoint, options)
    }

    /// Create a harvester around an existing endpoint.
    pub fn from_endpoint(endpoint: Endpoint, options: &HarvestOptions) -> Result<Self> {
        Ok(Self {
            endpoint,
            options: options.normalize()?,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut Endpoint {
        &mut self.endpoint
    }

    /// The normalized arguments sent with list verbs.
    pub fn options(&self) -> &Arguments {
        &self.options
    }

    pub fn metadata_prefix(&self) -> &str {
        self.options
            .get("metadataPrefix")
            .unwrap_or(DEFAULT_METADATA_PREFIX)
    }

    /// All identifiers the endpoint lists for the configured options.
    pub fn get_ids(&mut self) -> Result<Vec<String>> {
        self.get_ids_with(&extract_identifiers)
    }

    /// `ListIdentifiers` with a custom page extractor.
    pub fn get_ids_with<E>(&mut self, extractor: &E) -> Result<Vec<E::Item>>
    where
        E: Extractor + ?Sized,
    {
        self.endpoint
            .compile_data("ListIdentifiers", &self.options, extractor)
    }

    /// All records the endpoint lists for the configured options.
    pub fn list_records(&mut self) -> Result<Vec<XmlDoc>> {
        self.list_records_with(&extract_records)
    }

    /// `ListRecords` with a custom page extractor.
    pub fn list_records_with<E>(&mut self, extractor: &E) -> Result<Vec<E::Item>>
    where
        E: Extractor + ?Sized,
    {
        self.endpoint
            .compile_data("ListRecords", &self.options, extractor)
    }

    /// One record by identifier; `None` if the response holds no record.
    pub fn get_record(&mut self, identifier: &str) -> Result<Option<XmlDoc>> {
        let arguments = Arguments::new()
            .with("metadataPrefix", Some(self.metadata_prefix()))
            .with("identifier", Some(identifier));
        let page = self.endpoint.get_page("GetRecord", &arguments)?;
        page.find_first_by_tag("oai:record", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::make_query_string;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_defaults() {
        let args = HarvestOptions::default().normalize().unwrap();
        assert_eq!(
            make_query_string("ListRecords", &args),
            "?verb=ListRecords&metadataPrefix=oai_dc"
        );
    }

    #[test]
    fn test_normalize_keeps_order() {
        let args = HarvestOptions::default()
            .with_set("access_rights:public")
            .with_until("2024-12-31")
            .with_metadata_prefix("untl_raw")
            .with_from("2024-01-01")
            .normalize()
            .unwrap();
        assert_eq!(
            make_query_string("ListIdentifiers", &args),
            "?verb=ListIdentifiers&metadataPrefix=untl_raw&from=2024-01-01&until=2024-12-31&set=access_rights:public"
        );
    }

    #[test]
    fn test_normalize_rejects_bad_dates() {
        let err = HarvestOptions::default().with_from("yesterday").normalize().unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidDatestamp(_)));

        let err = HarvestOptions::default()
            .with_from("2025-01-02")
            .with_until("2025-01-01")
            .normalize()
            .unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_new_normalizes_once() {
        let options = HarvestOptions::default().with_metadata_prefix("untl_raw");
        let harvester = Harvester::new("http://localhost/oai", &options, Namespaces::new()).unwrap();
        assert_eq!(harvester.metadata_prefix(), "untl_raw");
        assert_eq!(harvester.endpoint().url(), "http://localhost/oai");
    }
}
