//! # papertable
//!
//! Sorts the annual-report paper list into priority tiers and enriches
//! PubMed-indexed papers with their canonical citation.
//!
//! ## Modules
//!
//! - [`record`] - Report line parsing and rendering
//! - [`classify`] - Tier classification and sorting
//! - [`citation`] - Citation extraction from efetch XML
//! - [`fetch`] - PubMed E-utilities client
//! - [`enrich`] - Rate-limited sequential enrichment
//! - [`pipeline`] - Classification → enrichment → TSV output
//! - [`integrity`] - Column-count check
//! - [`sink`] - Line-at-a-time TSV writer
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use papertable::{classify, enrich, fetch, pipeline, sink::TsvSink};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tiers = classify::sort_file("papers.tsv".as_ref())?;
//!     let client = fetch::EutilsClient::new(&Default::default())?;
//!     let enricher = enrich::Enricher::new(client, Default::default());
//!     let mut sink = TsvSink::new(std::io::stdout());
//!     pipeline::write_table(
//!         &tiers,
//!         &enricher,
//!         &mut sink,
//!         pipeline::TableMode::Full,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod citation;
pub mod classify;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod pipeline;
pub mod record;
pub mod sink;

pub use error::{PaperTableError, Result};
