//! Command-line interface for the harvester.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::collection::{save_xml, CollectionHarvest, HttpDocumentSource};
use crate::config::{
    collection_oai_url, sanitize_file_stem, EndpointConfig, DEFAULT_COLLECTIONS,
    DEFAULT_MAX_RECOVERIES, UNTL_NAMESPACE, UNT_METADATA_PREFIX, UNT_PUBLIC_SET, UNT_SERVER_URL,
};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::fulltext::PdfTextExtractor;
use crate::harvester::{HarvestOptions, Harvester};
use crate::xml::{Namespaces, SerializeOptions, XmlDoc};

/// OAI-PMH harvester - list identifiers and download metadata records.
#[derive(Parser)]
#[command(name = "oai-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every record identifier of an endpoint.
    Identifiers {
        /// OAI endpoint URL
        url: String,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Fetch one record by identifier and print it.
    Record {
        /// OAI endpoint URL
        url: String,

        /// Record identifier
        identifier: String,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Download every record of an endpoint, one file per record.
    Records {
        /// OAI endpoint URL
        url: String,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// Harvest full text and metadata of random items from UNT collections.
    Collection {
        /// Output directory (created if missing)
        #[arg(short, long)]
        path: PathBuf,

        /// Collection and item count as CODE=N; repeatable
        /// (default: UNTETD=667 CRSR=667 EOT=666)
        #[arg(long = "collection", value_parser = parse_collection)]
        collections: Vec<(String, usize)>,

        /// Digital library server
        #[arg(long, default_value = UNT_SERVER_URL)]
        server: String,

        /// Seed for the item order, for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct HarvestArgs {
    /// Metadata format (default: oai_dc, untl_raw for collections)
    #[arg(long)]
    pub metadata_prefix: Option<String>,

    /// Restrict to one set
    #[arg(long)]
    pub set: Option<String>,

    /// Lower datestamp bound (YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ)
    #[arg(long)]
    pub from: Option<String>,

    /// Upper datestamp bound (YYYY-MM-DD or YYYY-MM-DDThh:mm:ssZ)
    #[arg(long)]
    pub until: Option<String>,

    /// Seconds to wait before every request
    #[arg(long, value_parser = parse_seconds, default_value = "0")]
    pub sleep: Duration,

    /// Recovery budget for the whole session
    #[arg(long, default_value_t = DEFAULT_MAX_RECOVERIES)]
    pub max_recoveries: u32,

    /// Seconds to wait before retrying after an HTTP error
    #[arg(long, value_parser = parse_seconds, default_value = "60")]
    pub recovery_wait: Duration,

    /// Extra namespace for tag queries as PREFIX=URI; repeatable
    #[arg(long = "namespace", value_parser = parse_namespace)]
    pub namespaces: Vec<(String, String)>,

    /// Log requests at debug level only
    #[arg(short, long)]
    pub quiet: bool,
}

impl HarvestArgs {
    fn options(&self, default_prefix: Option<&str>, default_set: Option<&str>) -> HarvestOptions {
        HarvestOptions {
            metadata_prefix: self
                .metadata_prefix
                .clone()
                .or_else(|| default_prefix.map(String::from)),
            from: self.from.clone(),
            until: self.until.clone(),
            set: self.set.clone().or_else(|| default_set.map(String::from)),
        }
    }

    fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::default()
            .with_verbose(!self.quiet)
            .with_sleep_time(self.sleep)
            .with_max_recoveries(self.max_recoveries)
            .with_recovery_wait(self.recovery_wait)
    }

    fn namespaces(&self, base: Namespaces) -> Namespaces {
        self.namespaces
            .iter()
            .fold(base, |ns, (prefix, uri)| ns.with(prefix, uri))
    }

    fn harvester(&self, url: &str, options: &HarvestOptions, base: Namespaces) -> Result<Harvester> {
        let endpoint = Endpoint::new(url, self.namespaces(base), self.endpoint_config())?;
        Harvester::from_endpoint(endpoint, options)
    }
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{value}': {e}"))
}

fn parse_namespace(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((prefix, uri)) if !prefix.is_empty() && !uri.is_empty() => {
            Ok((prefix.to_string(), uri.to_string()))
        }
        _ => Err(format!("'{value}' is not PREFIX=URI")),
    }
}

fn parse_collection(value: &str) -> std::result::Result<(String, usize), String> {
    let (code, count) = value
        .split_once('=')
        .filter(|(code, _)| !code.is_empty())
        .ok_or_else(|| format!("'{value}' is not CODE=N"))?;
    let count = count
        .parse()
        .map_err(|_| format!("'{count}' is not an item count"))?;
    Ok((code.to_string(), count))
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Identifiers { url, harvest } => identifiers_command(&url, &harvest),
        Commands::Record {
            url,
            identifier,
            harvest,
        } => record_command(&url, &identifier, &harvest),
        Commands::Records {
            url,
            output,
            harvest,
        } => records_command(&url, &output, &harvest),
        Commands::Collection {
            path,
            collections,
            server,
            seed,
            harvest,
        } => collection_command(&path, collections, &server, seed, &harvest),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn identifiers_command(url: &str, harvest: &HarvestArgs) -> Result<()> {
    let mut harvester = harvest.harvester(url, &harvest.options(None, None), Namespaces::new())?;

    let pb = spinner("Listing identifiers...");
    let ids = harvester.get_ids();
    pb.finish_and_clear();
    let ids = ids?;

    for id in &ids {
        println!("{id}");
    }
    eprintln!(
        "{} {} identifiers from {}",
        style("Listed").green().bold(),
        ids.len(),
        style(url).cyan()
    );
    Ok(())
}

fn record_command(url: &str, identifier: &str, harvest: &HarvestArgs) -> Result<()> {
    let mut harvester = harvest.harvester(url, &harvest.options(None, None), Namespaces::new())?;

    match harvester.get_record(identifier)? {
        Some(record) => {
            let xml = record.serialize(SerializeOptions::document());
            println!("{}", String::from_utf8_lossy(&xml));
        }
        None => {
            eprintln!(
                "{} no record for {}",
                style("Warning:").yellow().bold(),
                style(identifier).cyan()
            );
        }
    }
    Ok(())
}

fn records_command(url: &str, output: &Path, harvest: &HarvestArgs) -> Result<()> {
    let mut harvester = harvest.harvester(url, &harvest.options(None, None), Namespaces::new())?;

    let pb = spinner("Listing records...");
    let records = match harvester.list_records() {
        Ok(records) => records,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };

    pb.set_message("Saving records...");
    let saved = save_records(&records, output);
    pb.finish_and_clear();
    saved?;

    println!(
        "{} {} records to {}",
        style("Saved").green().bold(),
        records.len(),
        output.display()
    );
    println!(
        "  Downloaded: {} bytes ({} decoded)",
        harvester.endpoint().raw_bytes(),
        harvester.endpoint().data_bytes()
    );
    Ok(())
}

/// Save each record as `<identifier>.xml`, falling back to `record-<n>.xml`.
fn save_records(records: &[XmlDoc], output: &Path) -> Result<()> {
    fs::create_dir_all(output)?;
    for (index, record) in records.iter().enumerate() {
        let stem = record
            .find_first_by_tag("oai:identifier", None)?
            .and_then(|id| id.text().map(|t| sanitize_file_stem(t.trim())))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| format!("record-{}", index + 1));
        save_xml(&output.join(format!("{stem}.xml")), record)?;
    }
    Ok(())
}

fn collection_command(
    path: &Path,
    collections: Vec<(String, usize)>,
    server: &str,
    seed: Option<u64>,
    harvest: &HarvestArgs,
) -> Result<()> {
    let collections = if collections.is_empty() {
        DEFAULT_COLLECTIONS
            .iter()
            .map(|(code, count)| ((*code).to_string(), *count))
            .collect()
    } else {
        collections
    };
    let options = harvest.options(Some(UNT_METADATA_PREFIX), Some(UNT_PUBLIC_SET));
    let base = Namespaces::new().with("untl", UNTL_NAMESPACE);

    for (code, wanted) in collections {
        println!(
            "{} {} items from {}",
            style("Harvesting").bold(),
            wanted,
            style(&code).cyan()
        );

        let mut harvester = harvest.harvester(
            &collection_oai_url(server, &code),
            &options,
            base.clone(),
        )?;
        let mut driver =
            CollectionHarvest::new(HttpDocumentSource::new(server)?, PdfTextExtractor, path);
        if let Some(seed) = seed {
            driver = driver.with_seed(seed);
        }

        let pb = spinner(&format!("Harvesting {code}..."));
        let report = driver.run(&mut harvester, wanted);
        pb.finish_and_clear();

        match report {
            Ok(report) => {
                println!("  Saved: {}", style(report.saved.len()).green());
                if report.skipped > 0 {
                    println!("  Skipped: {}", style(report.skipped).yellow().bold());
                }
                if report.saved.len() < wanted {
                    println!(
                        "  {} only {} usable items among {} listed",
                        style("Warning:").yellow().bold(),
                        report.saved.len(),
                        report.candidates
                    );
                }
            }
            Err(e) => {
                eprintln!("  {} {e}", style("Failed:").red().bold());
            }
        }
    }

    println!();
    println!("{} {}", style("Output in:").green().bold(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RECOVERY_WAIT_SECS;

    #[test]
    fn test_cli_parse_identifiers() {
        let cli = Cli::parse_from(["oai-harvester", "identifiers", "http://localhost/oai"]);

        let Commands::Identifiers { url, harvest } = cli.command else {
            panic!("expected identifiers command");
        };
        assert_eq!(url, "http://localhost/oai");
        assert!(harvest.metadata_prefix.is_none());
        assert_eq!(harvest.sleep, Duration::ZERO);
        assert_eq!(harvest.max_recoveries, DEFAULT_MAX_RECOVERIES);
        assert_eq!(harvest.recovery_wait, Duration::from_secs(DEFAULT_RECOVERY_WAIT_SECS));
    }

    #[test]
    fn test_cli_parse_record_with_options() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "record",
            "http://localhost/oai",
            "ark:/67531/metadc1",
            "--metadata-prefix",
            "untl_raw",
            "--sleep",
            "1.5",
            "--namespace",
            "dc=http://purl.org/dc/elements/1.1/",
        ]);

        let Commands::Record {
            identifier, harvest, ..
        } = cli.command
        else {
            panic!("expected record command");
        };
        assert_eq!(identifier, "ark:/67531/metadc1");
        assert_eq!(harvest.metadata_prefix.as_deref(), Some("untl_raw"));
        assert_eq!(harvest.sleep, Duration::from_millis(1500));

        let namespaces = harvest.namespaces(Namespaces::new());
        assert_eq!(namespaces.get("dc"), Some("http://purl.org/dc/elements/1.1/"));
        assert!(namespaces.contains_prefix("oai"));
    }

    #[test]
    fn test_cli_parse_collection() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "collection",
            "--path",
            "out",
            "--collection",
            "UNTETD=5",
            "--collection",
            "EOT=2",
            "--seed",
            "7",
        ]);

        let Commands::Collection {
            path,
            collections,
            server,
            seed,
            harvest,
        } = cli.command
        else {
            panic!("expected collection command");
        };
        assert_eq!(path, PathBuf::from("out"));
        assert_eq!(
            collections,
            vec![("UNTETD".to_string(), 5), ("EOT".to_string(), 2)]
        );
        assert_eq!(server, UNT_SERVER_URL);
        assert_eq!(seed, Some(7));

        let options = harvest.options(Some(UNT_METADATA_PREFIX), Some(UNT_PUBLIC_SET));
        assert_eq!(options.metadata_prefix.as_deref(), Some("untl_raw"));
        assert_eq!(options.set.as_deref(), Some("access_rights:public"));
    }

    #[test]
    fn test_parsers_reject_garbage() {
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
        assert!(parse_namespace("dc").is_err());
        assert!(parse_namespace("=http://x").is_err());
        assert!(parse_collection("UNTETD").is_err());
        assert!(parse_collection("UNTETD=many").is_err());
    }

    #[test]
    fn test_save_records_names_files() {
        let oai = "http://www.openarchives.org/OAI/2.0/";
        let records = vec![
            XmlDoc::parse(
                &format!(r#"<record xmlns="{oai}"><header><identifier>oai:x:1</identifier></header></record>"#),
                Namespaces::new(),
            )
            .unwrap(),
            XmlDoc::parse(&format!(r#"<record xmlns="{oai}"/>"#), Namespaces::new()).unwrap(),
        ];
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");

        save_records(&records, &output).unwrap();
        assert!(output.join("oai_x_1.xml").exists());
        assert!(output.join("record-2.xml").exists());
    }

    #[test]
    fn test_save_records_reports_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("taken");
        fs::write(&output, "not a directory").unwrap();
        let records = vec![XmlDoc::parse("<record/>", Namespaces::new()).unwrap()];

        assert!(save_records(&records, &output).is_err());
    }

    #[test]
    fn test_endpoint_config_from_args() {
        let cli = Cli::parse_from([
            "oai-harvester",
            "identifiers",
            "http://localhost/oai",
            "--max-recoveries",
            "0",
            "--recovery-wait",
            "2",
            "--quiet",
        ]);
        let Commands::Identifiers { harvest, .. } = cli.command else {
            panic!("expected identifiers command");
        };
        let config = harvest.endpoint_config();
        assert_eq!(config.max_recoveries, 0);
        assert_eq!(config.recovery_wait, Duration::from_secs(2));
        assert!(!config.verbose);
    }
}
