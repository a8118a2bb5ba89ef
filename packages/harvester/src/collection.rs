//! Harvest driver: collects metadata records and full text for randomly
//! chosen items of a collection, skipping items that fail.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use reqwest::blocking::Client;

use crate::ark::ArkId;
use crate::error::{HarvesterError, Result};
use crate::fulltext::TextExtractor;
use crate::harvester::Harvester;
use crate::http::create_client;
use crate::pacing::{CancellationFlag, Sleeper, ThreadSleeper};
use crate::xml::{SerializeOptions, XmlDoc};

/// Default pause between saved items.
pub const DEFAULT_ITEM_PAUSE: Duration = Duration::from_millis(500);

/// Supplies the binary document behind an item.
pub trait DocumentSource {
    fn fetch_document(&self, ark: &ArkId) -> Result<Vec<u8>>;
}

/// Downloads item documents from a digital library server.
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    client: Client,
    server_url: String,
}

impl HttpDocumentSource {
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            server_url: server_url.to_string(),
        })
    }
}

impl DocumentSource for HttpDocumentSource {
    fn fetch_document(&self, ark: &ArkId) -> Result<Vec<u8>> {
        let url = ark.document_url(&self.server_url);
        tracing::debug!(url = %url, "Downloading document");
        let response = self.client.get(&url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

/// Outcome of a collection harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    /// Identifiers saved, in the order they were harvested.
    pub saved: Vec<String>,

    /// Items tried and skipped.
    pub skipped: usize,

    /// Distinct identifiers the endpoint listed.
    pub candidates: usize,
}

/// Drives one collection harvest.
pub struct CollectionHarvest<S, X> {
    source: S,
    extractor: X,
    output_dir: PathBuf,
    pause: Duration,
    sleeper: Box<dyn Sleeper>,
    cancel: CancellationFlag,
    seed: Option<u64>,
}

impl<S: DocumentSource, X: TextExtractor> CollectionHarvest<S, X> {
    pub fn new(source: S, extractor: X, output_dir: &Path) -> Self {
        Self {
            source,
            extractor,
            output_dir: output_dir.to_path_buf(),
            pause: DEFAULT_ITEM_PAUSE,
            sleeper: Box::new(ThreadSleeper),
            cancel: CancellationFlag::new(),
            seed: None,
        }
    }

    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub fn with_sleeper<T: Sleeper + 'static>(mut self, sleeper: T) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fix the visiting order, for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Harvest up to `wanted` items.
    ///
    /// Listing identifiers must succeed; per-item failures (document
    /// download, text extraction, record lookup) only skip that item.
    /// Failing to write output is fatal.
    pub fn run(&self, harvester: &mut Harvester, wanted: usize) -> Result<HarvestReport> {
        fs::create_dir_all(&self.output_dir)?;

        let ids: BTreeSet<String> = harvester.get_ids()?.into_iter().collect();
        let mut ids: Vec<String> = ids.into_iter().collect();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ids.shuffle(&mut rng);

        let mut report = HarvestReport {
            candidates: ids.len(),
            ..HarvestReport::default()
        };
        tracing::info!(candidates = ids.len(), wanted, "Starting collection harvest");

        for id in ids {
            if report.saved.len() >= wanted {
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(HarvesterError::Cancelled);
            }
            tracing::info!(item = report.saved.len() + 1, wanted, id = %id, "Trying item");

            let (ark, fulltext, record) = match self.harvest_item(harvester, &id) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Skipping item");
                    report.skipped += 1;
                    continue;
                }
            };

            save_xml(&self.output_dir.join(format!("{}-fulltext.xml", ark.name())), &fulltext)?;
            save_xml(&self.output_dir.join(format!("{}-metadata.xml", ark.name())), &record)?;
            report.saved.push(id);

            if !self.pause.is_zero() && !self.sleeper.sleep(self.pause, &self.cancel) {
                return Err(HarvesterError::Cancelled);
            }
        }

        tracing::info!(
            saved = report.saved.len(),
            skipped = report.skipped,
            "Collection harvest finished"
        );
        Ok(report)
    }

    fn harvest_item(&self, harvester: &mut Harvester, id: &str) -> Result<(ArkId, XmlDoc, XmlDoc)> {
        let ark = ArkId::parse(id)?;

        tracing::debug!(id, "Fetching document");
        let bytes = self.source.fetch_document(&ark)?;

        tracing::debug!(id, bytes = bytes.len(), "Extracting text");
        let fulltext = self.extractor.extract(&bytes)?;

        tracing::debug!(id, "Fetching metadata record");
        let record = harvester
            .get_record(id)?
            .ok_or_else(|| HarvesterError::RecordNotFound(id.to_string()))?;

        Ok((ark, fulltext, record))
    }
}

/// Write a document as UTF-8 XML with declaration.
///
/// Writes to a temporary file first and renames it into place.
pub fn save_xml(path: &Path, doc: &XmlDoc) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            HarvesterError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not a file path: {}", path.display()),
            ))
        })?;
    let temp_file = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut file = File::create(&temp_file)?;
        file.write_all(&doc.serialize(SerializeOptions::document()))?;
        file.sync_all()?;
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)?;
    }

    fs::rename(&temp_file, path)?;
    Ok(())
}
