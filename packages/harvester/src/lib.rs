//! OAI-PMH Harvester - Collect identifiers and metadata records from
//! OAI-PMH repositories.
//!
//! This crate provides a resilient client for the OAI protocol: it follows
//! resumption tokens, paces requests, recovers from transient HTTP failures
//! within a bounded budget, and parses responses into namespace-aware XML
//! documents that can be queried by `prefix:tag` names.
//!
//! # Example
//!
//! ```
//! use oai_harvester::{HarvestOptions, Namespaces, XmlDoc};
//!
//! // Validate harvest options before touching the network
//! assert!(HarvestOptions::default().with_from("2025-01-01").normalize().is_ok());
//! assert!(HarvestOptions::default().with_from("yesterday").normalize().is_err());
//!
//! // Query a document by prefixed tag name
//! let doc = XmlDoc::parse(
//!     r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><identifier>x</identifier></OAI-PMH>"#,
//!     Namespaces::new(),
//! )
//! .unwrap();
//! let id = doc.find_first_by_tag("oai:identifier", None).unwrap().unwrap();
//! assert_eq!(id.text(), Some("x"));
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`config`]: Configuration constants, endpoint settings and validation
//! - [`error`]: Error types and Result alias
//! - [`xml`]: Owned XML documents with namespace-aware queries and serialization
//! - [`http`]: HTTP client, response classification and body decoding
//! - [`pacing`]: Sleeping and cancellation
//! - [`endpoint`]: Resilient page fetching and pagination
//! - [`harvester`]: The `ListIdentifiers`, `ListRecords` and `GetRecord` verbs
//! - [`ark`]: ARK identifiers
//! - [`fulltext`]: Document text extraction
//! - [`collection`]: Random-sample collection harvests
//! - [`cli`]: Command-line interface

pub mod ark;
pub mod cli;
pub mod collection;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod fulltext;
pub mod harvester;
pub mod http;
pub mod pacing;
pub mod xml;

// Re-export commonly used items
pub use config::EndpointConfig;
pub use endpoint::{Arguments, Endpoint};
pub use error::{HarvesterError, Result};
pub use harvester::{HarvestOptions, Harvester};
pub use xml::{Namespaces, XmlDoc};
