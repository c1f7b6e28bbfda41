//! papertable - annual-report paper list tool
//!
//! Sorts the submitted paper list into priority tiers and turns
//! PubMed-indexed entries into formatted citation rows.
//!
//! ## Usage
//!
//! ```bash
//! papertable sort -i paper_list.tsv
//! papertable table -i paper_list.tsv --output table.tsv
//! papertable fetch --pmid 33290522 --tag Journal
//! papertable check -i paper_list.tsv
//! ```
//!
//! Logs go to stderr; stdout carries only TSV/XML/JSON output.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use papertable::classify::{self, normalize_pmid};
use papertable::enrich::{EnrichOptions, Enricher};
use papertable::fetch::{self, CitationFetcher, EutilsClient, FetchOptions};
use papertable::pipeline::{self, TableMode};
use papertable::sink::TsvSink;
use papertable::{citation, integrity};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Annual-report paper list sorter with PubMed citation enrichment
#[derive(Parser)]
#[command(name = "papertable")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print all records sorted into priority tiers
    Sort {
        /// Input file (TSV, UTF-8, first line is a header)
        #[arg(short, long)]
        infile: PathBuf,
    },

    /// Build the citation table: enriched PubMed rows, then the other tiers
    Table {
        /// Input file (TSV, UTF-8, first line is a header)
        #[arg(short, long)]
        infile: PathBuf,

        /// Only write rows for records with a PubMed id
        #[arg(long)]
        pmid_only: bool,

        /// Seconds to wait between efetch requests
        #[arg(long, default_value_t = 15)]
        delay: u64,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        eutils: EutilsArgs,
    },

    /// Print the efetch document for one PubMed id
    Fetch {
        /// PubMed id
        #[arg(short = 'i', long)]
        pmid: String,

        /// Only print the outermost element with this tag
        #[arg(short, long, conflicts_with = "json")]
        tag: Option<String>,

        /// Print the extracted citation as JSON instead of raw XML
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        eutils: EutilsArgs,
    },

    /// Report lines whose column count is not the schema width
    Check {
        /// Input file
        #[arg(short, long)]
        infile: PathBuf,
    },
}

#[derive(Args)]
struct EutilsArgs {
    /// NCBI API key
    #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// efetch endpoint
    #[arg(long, env = "PAPERTABLE_EFETCH_URL", default_value = fetch::EFETCH_URL)]
    efetch_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl EutilsArgs {
    fn client(&self) -> Result<EutilsClient> {
        let options = FetchOptions {
            base_url: self.efetch_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout),
        };
        EutilsClient::new(&options).context("Failed to create efetch client")
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Sort { infile } => run_sort(infile),
        Commands::Table {
            infile,
            pmid_only,
            delay,
            output,
            eutils,
        } => run_table(infile, pmid_only, delay, output, eutils).await,
        Commands::Fetch {
            pmid,
            tag,
            json,
            eutils,
        } => run_fetch(pmid, tag, json, eutils).await,
        Commands::Check { infile } => run_check(infile),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn run_sort(infile: PathBuf) -> Result<()> {
    let tiers = classify::sort_file(&infile)
        .with_context(|| format!("Failed to read {}", infile.display()))?;

    let mut sink = TsvSink::new(std::io::stdout().lock());
    pipeline::write_sorted(&tiers, &mut sink)?;
    Ok(())
}

async fn run_table(
    infile: PathBuf,
    pmid_only: bool,
    delay: u64,
    output: Option<PathBuf>,
    eutils: EutilsArgs,
) -> Result<()> {
    // Read everything up front so a bad input leaves no partial output
    let tiers = classify::sort_file(&infile)
        .with_context(|| format!("Failed to read {}", infile.display()))?;

    let enricher = Enricher::new(
        eutils.client()?,
        EnrichOptions {
            delay: Duration::from_secs(delay),
        },
    );

    let out: Box<dyn Write> = match &output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut sink = TsvSink::new(out);

    let mode = if pmid_only {
        TableMode::PmidOnly
    } else {
        TableMode::Full
    };

    let cancel = shutdown_on_ctrl_c();
    let summary = pipeline::write_table(&tiers, &enricher, &mut sink, mode, &cancel).await?;

    for failure in &summary.enrichment.failed {
        warn!(pmid = %failure.pmid, error = %failure.error, "Not included in table");
    }
    if summary.enrichment.interrupted {
        warn!(rows = sink.rows(), "Interrupted; output is incomplete");
    }
    if let Some(path) = output {
        info!(rows = sink.rows(), path = ?path, "Saved table");
    }

    Ok(())
}

async fn run_fetch(pmid: String, tag: Option<String>, json: bool, eutils: EutilsArgs) -> Result<()> {
    let Some(id) = normalize_pmid(&pmid) else {
        anyhow::bail!("Not a PubMed id: {}", pmid);
    };

    let client = eutils.client()?;
    let xml = client.fetch(&id).await.context("efetch request failed")?;

    if json {
        let extracted = citation::extract(&xml).context("Failed to parse citation document")?;
        println!("{}", serde_json::to_string_pretty(&extracted)?);
        return Ok(());
    }

    match tag {
        Some(tag) => match fetch::extract_element(&xml, &tag)? {
            Some(span) => println!("{}", span),
            None => warn!(tag = %tag, pmid = %id, "Element not found in document"),
        },
        None => println!("{}", xml),
    }

    Ok(())
}

fn run_check(infile: PathBuf) -> Result<()> {
    let deviations = integrity::check_file(&infile)
        .with_context(|| format!("Failed to read {}", infile.display()))?;

    let mut sink = TsvSink::new(std::io::stdout().lock());
    for d in &deviations {
        sink.write_row([
            format!("{:02}", d.line),
            d.field_count.to_string(),
            d.first.clone(),
            d.second.clone(),
        ])?;
    }
    Ok(())
}

/// Cancellation token tripped by the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            token.cancel();
        }
    });

    cancel
}
