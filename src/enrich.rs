//! Sequential citation enrichment for identifier-tier records.
//!
//! Each record is fetched, parsed and written before the next one starts,
//! with a fixed pause between requests to stay inside the service's rate
//! limit. A failing record is logged and skipped; it never stops the run.

use crate::citation::{self, CITATION_WIDTH};
use crate::classify::normalize_pmid;
use crate::error::{PaperTableError, Result};
use crate::fetch::CitationFetcher;
use crate::record::PaperRecord;
use crate::sink::TsvSink;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Columns in an enriched row: two display names plus the citation row.
pub const ENRICHED_WIDTH: usize = 2 + CITATION_WIDTH;

/// Default pause between two efetch requests.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(15);

/// Options for the enrichment driver
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Minimum pause between finishing one record and fetching the next
    pub delay: Duration,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
        }
    }
}

/// Timer gate enforcing a minimum interval between requests.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Wait until the interval since the last [`touch`](RateGate::touch)
    /// has elapsed. Returns immediately the first time.
    pub async fn wait(&self) {
        if let Some(last) = self.last {
            let ready = last + self.interval;
            if ready > Instant::now() {
                debug!(wait_ms = (ready - Instant::now()).as_millis() as u64, "Rate limit pause");
                tokio::time::sleep_until(ready).await;
            }
        }
    }

    /// Start a new interval from now.
    pub fn touch(&mut self) {
        self.last = Some(Instant::now());
    }
}

/// A record that could not be enriched.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub pmid: String,
    pub error: String,
}

/// Outcome of an enrichment run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EnrichSummary {
    /// Rows written to the sink
    pub emitted: usize,
    pub failed: Vec<FailedRecord>,
    /// Records without a usable PubMed id
    pub skipped: usize,
    /// Run stopped early on cancellation
    pub interrupted: bool,
}

/// Drives fetch → extract → write for each record in order.
pub struct Enricher<F> {
    fetcher: F,
    options: EnrichOptions,
}

impl<F: CitationFetcher> Enricher<F> {
    pub fn new(fetcher: F, options: EnrichOptions) -> Self {
        Self { fetcher, options }
    }

    /// Enrich `records` in order, writing one row per success to `sink`.
    ///
    /// Fetch and parse failures are logged and recorded in the summary.
    /// Sink errors abort the run. When `cancel` fires, the in-flight fetch
    /// is abandoned and no further rows are written.
    pub async fn run<W: Write>(
        &self,
        records: &[PaperRecord],
        sink: &mut TsvSink<W>,
        cancel: &CancellationToken,
    ) -> Result<EnrichSummary> {
        let mut summary = EnrichSummary::default();
        let mut gate = RateGate::new(self.options.delay);

        info!(records = records.len(), delay_secs = self.options.delay.as_secs_f64(), "Starting enrichment");

        for record in records {
            let Some(pmid) = normalize_pmid(&record.pubmed_id) else {
                warn!(tracking_id = %record.tracking_id, pubmed_id = %record.pubmed_id, "No usable PubMed id, skipping");
                summary.skipped += 1;
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                _ = gate.wait() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(pmid = %pmid, "Interrupted, abandoning in-flight fetch");
                    summary.interrupted = true;
                    break;
                }
                outcome = self.enrich_one(record, &pmid) => outcome,
            };
            gate.touch();

            match outcome {
                Ok(row) => {
                    sink.write_row(&row)?;
                    summary.emitted += 1;
                }
                Err(e) if e.is_per_record() => {
                    error!(pmid = %pmid, error = %e, "Failed to enrich record");
                    summary.failed.push(FailedRecord {
                        pmid,
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            emitted = summary.emitted,
            failed = summary.failed.len(),
            skipped = summary.skipped,
            interrupted = summary.interrupted,
            "Enrichment complete"
        );

        Ok(summary)
    }

    /// Build the enriched row for one record.
    async fn enrich_one(&self, record: &PaperRecord, pmid: &str) -> Result<[String; ENRICHED_WIDTH]> {
        let xml = self.fetcher.fetch(pmid).await?;
        let citation = citation::extract(&xml)?;

        if citation.article_title.is_none() && citation.journal.is_none() {
            return Err(PaperTableError::Parse(format!(
                "no citation found in document for {}",
                pmid
            )));
        }

        let [title, journal, id, doi] = citation.to_row(pmid);
        Ok([
            record.account_name_ja.clone(),
            record.display_name_en(),
            title,
            journal,
            id,
            doi,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const FIXTURE: &str = include_str!("../tests/fixtures/pubmed_fiac004.xml");

    /// Fetcher serving canned documents; ids without one fail like a
    /// dropped connection.
    #[derive(Default)]
    struct StubFetcher {
        documents: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with(mut self, pmid: &str, xml: &str) -> Self {
            self.documents.insert(pmid.to_string(), xml.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CitationFetcher for StubFetcher {
        async fn fetch(&self, pmid: &str) -> Result<String> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(pmid.to_string());
            }
            self.documents.get(pmid).cloned().ok_or_else(|| PaperTableError::Api {
                code: 503,
                message: format!("connection reset fetching {}", pmid),
            })
        }
    }

    fn record(name_ja: &str, name_en: &str, pmid: &str) -> PaperRecord {
        PaperRecord {
            account_name_ja: name_ja.to_string(),
            account_name_en: name_en.to_string(),
            pubmed_id: pmid.to_string(),
            ..Default::default()
        }
    }

    fn no_delay() -> EnrichOptions {
        EnrichOptions {
            delay: Duration::ZERO,
        }
    }

    fn output(sink: TsvSink<Vec<u8>>) -> Vec<String> {
        let bytes = sink.into_inner().expect("sink");
        String::from_utf8(bytes)
            .expect("utf8")
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_enriched_row_uses_pii_when_pages_missing() -> Result<()> {
        let fetcher = StubFetcher::default().with("33290522", FIXTURE);
        let enricher = Enricher::new(fetcher, no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let records = vec![record("山田太郎", "\"Yamada, Taro\"", "pmid=33290522")];
        let summary = enricher
            .run(&records, &mut sink, &CancellationToken::new())
            .await?;
        assert_eq!(summary.emitted, 1);

        let lines = output(sink);
        let cols: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(cols.len(), ENRICHED_WIDTH);
        assert_eq!(cols[0], "山田太郎");
        assert_eq!(cols[1], "Taro Yamada");
        assert!(cols[3].ends_with("98(1): fiac004."));
        assert_eq!(cols[4], "33290522");
        assert_eq!(cols[5], "10.1093/femsec/fiac004");
        Ok(())
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_run() -> Result<()> {
        let fetcher = StubFetcher::default()
            .with("101", FIXTURE)
            .with("103", FIXTURE);
        let enricher = Enricher::new(fetcher, no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let records = vec![record("a", "A", "101"), record("b", "B", "102"), record("c", "C", "103")];
        let summary = enricher
            .run(&records, &mut sink, &CancellationToken::new())
            .await?;

        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].pmid, "102");
        assert_eq!(enricher.fetcher.calls(), vec!["101", "102", "103"]);

        let lines = output(sink);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a\tA\t"));
        assert!(lines[1].starts_with("c\tC\t"));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_document_is_per_record() -> Result<()> {
        let fetcher = StubFetcher::default()
            .with("1", "<PubmedArticle><Journal></Volume></PubmedArticle>")
            .with("2", FIXTURE);
        let enricher = Enricher::new(fetcher, no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let records = vec![record("a", "A", "1"), record("b", "B", "2")];
        let summary = enricher
            .run(&records, &mut sink, &CancellationToken::new())
            .await?;

        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].pmid, "1");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_article_set_is_a_failure() -> Result<()> {
        let fetcher = StubFetcher::default().with("9", "<PubmedArticleSet></PubmedArticleSet>");
        let enricher = Enricher::new(fetcher, no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let summary = enricher
            .run(&[record("a", "A", "9")], &mut sink, &CancellationToken::new())
            .await?;

        assert_eq!(summary.emitted, 0);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(sink.rows(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_records_without_pmid_are_skipped() -> Result<()> {
        let enricher = Enricher::new(StubFetcher::default(), no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let summary = enricher
            .run(&[record("a", "A", "n/a")], &mut sink, &CancellationToken::new())
            .await?;

        assert_eq!(summary.skipped, 1);
        assert!(enricher.fetcher.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() -> Result<()> {
        let enricher = Enricher::new(StubFetcher::default().with("1", FIXTURE), no_delay());
        let mut sink = TsvSink::new(Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = enricher.run(&[record("a", "A", "1")], &mut sink, &cancel).await?;

        assert!(summary.interrupted);
        assert_eq!(summary.emitted, 0);
        assert!(enricher.fetcher.calls().is_empty());
        Ok(())
    }

    /// Serves the fixture, except for one id whose fetch trips the token
    /// and then never completes.
    struct StallingFetcher {
        stall_on: &'static str,
        cancel: CancellationToken,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CitationFetcher for StallingFetcher {
        async fn fetch(&self, pmid: &str) -> Result<String> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(pmid.to_string());
            }
            if pmid == self.stall_on {
                self.cancel.cancel();
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(FIXTURE.to_string())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_abandons_record() -> Result<()> {
        let cancel = CancellationToken::new();
        let fetcher = StallingFetcher {
            stall_on: "2",
            cancel: cancel.clone(),
            calls: Mutex::new(Vec::new()),
        };
        let enricher = Enricher::new(fetcher, no_delay());
        let mut sink = TsvSink::new(Vec::new());

        let records = vec![record("a", "A", "1"), record("b", "B", "2"), record("c", "C", "3")];
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            enricher.run(&records, &mut sink, &cancel),
        )
        .await
        .expect("in-flight fetch was not abandoned")?;

        assert!(summary.interrupted);
        assert_eq!(summary.emitted, 1);
        assert!(summary.failed.is_empty());

        let calls = enricher.fetcher.calls.lock().map(|c| c.clone()).unwrap_or_default();
        assert_eq!(calls, vec!["1", "2"]);

        let lines = output(sink);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("a\tA\t"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rate_gate_spacing() {
        let mut gate = RateGate::new(Duration::from_millis(50));

        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        gate.touch();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
