//! Priority classification of report records.
//!
//! Every record lands in exactly one of three tiers, decided by which
//! bibliographic identifier it carries:
//!
//! 1. [`Tier::Identifier`]: a well-formed PubMed id, sorted by the raw id
//!    column.
//! 2. [`Tier::SecondaryIdentifier`]: no usable PubMed id but a DOI, sorted
//!    by DOI.
//! 3. [`Tier::Unclassified`]: everything else, sorted by journal name.
//!
//! The identifier tier is ordered by the raw column *as a string*, so
//! `"100"` sorts before `"99"`. Reports produced by earlier versions of the
//! tool are ordered this way and downstream tables depend on it.

use crate::error::Result;
use crate::record::PaperRecord;
use std::path::Path;
use tracing::{debug, info};

/// Priority tier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// PubMed id present and well-formed
    Identifier,
    /// No usable PubMed id, DOI present
    SecondaryIdentifier,
    /// Neither identifier
    Unclassified,
}

/// Extract the numeric PubMed id from a report column.
///
/// Accepts surrounding whitespace and an optional `pmid:` / `PMID=` style
/// prefix; the separator is required. Returns `None` when nothing numeric
/// is left.
pub fn normalize_pmid(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("pmid") => trimmed[4..]
            .trim_start()
            .strip_prefix([':', '='])?
            .trim_start(),
        _ => trimmed,
    };

    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits.to_string())
    } else {
        None
    }
}

/// Assign a record to its tier.
pub fn classify(record: &PaperRecord) -> Tier {
    if normalize_pmid(&record.pubmed_id).is_some() {
        Tier::Identifier
    } else if !record.doi.trim().is_empty() {
        Tier::SecondaryIdentifier
    } else {
        Tier::Unclassified
    }
}

/// Records partitioned by tier, each bucket already sorted.
#[derive(Debug, Default, Clone)]
pub struct Tiers {
    pub identifier: Vec<PaperRecord>,
    pub secondary: Vec<PaperRecord>,
    pub residual: Vec<PaperRecord>,
}

impl Tiers {
    /// Partition records in a single pass, then sort each bucket.
    ///
    /// Sorting is stable: records with equal keys keep their input order.
    pub fn partition<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PaperRecord>,
    {
        let mut tiers = Tiers::default();

        for record in records {
            match classify(&record) {
                Tier::Identifier => tiers.identifier.push(record),
                Tier::SecondaryIdentifier => tiers.secondary.push(record),
                Tier::Unclassified => tiers.residual.push(record),
            }
        }

        tiers.identifier.sort_by(|a, b| a.pubmed_id.cmp(&b.pubmed_id));
        tiers.secondary.sort_by(|a, b| a.doi.cmp(&b.doi));
        tiers.residual.sort_by(|a, b| a.journal.cmp(&b.journal));

        info!(
            identifier = tiers.identifier.len(),
            secondary = tiers.secondary.len(),
            residual = tiers.residual.len(),
            "Classified records"
        );

        tiers
    }

    /// Total number of records across all tiers.
    pub fn len(&self) -> usize {
        self.identifier.len() + self.secondary.len() + self.residual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records of one tier.
    pub fn tier(&self, tier: Tier) -> &[PaperRecord] {
        match tier {
            Tier::Identifier => &self.identifier,
            Tier::SecondaryIdentifier => &self.secondary,
            Tier::Unclassified => &self.residual,
        }
    }

    /// All records in output order, tagged with their tier.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &PaperRecord)> {
        [Tier::Identifier, Tier::SecondaryIdentifier, Tier::Unclassified]
            .into_iter()
            .flat_map(move |tier| self.tier(tier).iter().map(move |r| (tier, r)))
    }

    /// Concatenate the tiers in output order.
    pub fn into_ordered(self) -> Vec<PaperRecord> {
        let mut all = self.identifier;
        all.extend(self.secondary);
        all.extend(self.residual);
        all
    }
}

/// Parse report text into records, skipping the header line.
///
/// Blank lines carry no record and are skipped.
pub fn parse_report(text: &str) -> Vec<PaperRecord> {
    text.lines()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, line)| {
            if line.trim().is_empty() {
                debug!(line = idx + 1, "Skipping blank line");
                None
            } else {
                Some(PaperRecord::parse(line))
            }
        })
        .collect()
}

/// Read a report file and classify all of its records.
///
/// The file is read completely before anything is classified, so an
/// unreadable input produces no output at all.
pub fn sort_file(path: &Path) -> Result<Tiers> {
    let text = std::fs::read_to_string(path)?;
    let records = parse_report(&text);
    info!(path = ?path, records = records.len(), "Loaded report");
    Ok(Tiers::partition(records))
}
