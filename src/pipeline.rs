//! End-to-end report processing.
//!
//! Combines classification, enrichment and output: identifier-tier records
//! become enriched citation rows, the remaining tiers follow as rendered
//! records, all in tier order.

use crate::classify::Tiers;
use crate::enrich::{EnrichSummary, Enricher};
use crate::error::Result;
use crate::fetch::CitationFetcher;
use crate::sink::TsvSink;
use serde::Serialize;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What the table run writes after the enriched rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// Enriched rows, then secondary and residual records
    #[default]
    Full,
    /// Enriched rows only
    PmidOnly,
}

/// Outcome of a table run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TableSummary {
    pub enrichment: EnrichSummary,
    /// Secondary and residual records written unchanged
    pub passthrough: usize,
}

/// Write every record in tier order, unchanged.
pub fn write_sorted<W: Write>(tiers: &Tiers, sink: &mut TsvSink<W>) -> Result<usize> {
    for (_, record) in tiers.iter() {
        sink.write_record(record)?;
    }
    Ok(tiers.len())
}

/// Enrich the identifier tier and write the full table.
///
/// Records that fail enrichment produce no line. If the run is cancelled
/// during enrichment the remaining tiers are not written either.
pub async fn write_table<F, W>(
    tiers: &Tiers,
    enricher: &Enricher<F>,
    sink: &mut TsvSink<W>,
    mode: TableMode,
    cancel: &CancellationToken,
) -> Result<TableSummary>
where
    F: CitationFetcher,
    W: Write,
{
    let enrichment = enricher.run(&tiers.identifier, sink, cancel).await?;

    let mut passthrough = 0;
    if mode == TableMode::Full && !enrichment.interrupted {
        for record in tiers.secondary.iter().chain(&tiers.residual) {
            sink.write_record(record)?;
            passthrough += 1;
        }
    }

    info!(
        enriched = enrichment.emitted,
        failed = enrichment.failed.len(),
        passthrough = passthrough,
        "Table written"
    );

    Ok(TableSummary {
        enrichment,
        passthrough,
    })
}
