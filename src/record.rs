//! Paper records parsed from the annual-report TSV.
//!
//! Each line of the report carries one paper in a fixed sixteen-column
//! layout. Lines are split on every tab, trailing empty columns included,
//! and short lines are padded so a [`PaperRecord`] always exposes the full
//! schema.

use regex::Regex;
use std::sync::LazyLock;

/// Column delimiter of the report.
pub const DELIMITER: char = '\t';

/// Number of columns in a well-formed report line.
pub const SCHEMA_WIDTH: usize = 16;

static FAMILY_GIVEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s*,\s*(\S+)$").expect("name pattern is valid"));

/// One paper from the report.
///
/// Records are never mutated after parsing; enrichment derives new rows
/// from them instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaperRecord {
    pub tracking_id: String,
    pub uid: String,
    /// Submitter's display name (Japanese)
    pub account_name_ja: String,
    /// Submitter's display name (English, often `"Family, Given"`)
    pub account_name_en: String,
    pub title: String,
    pub authors: String,
    pub authors_ja: String,
    pub journal: String,
    pub volume: String,
    /// Issue number
    pub number: String,
    pub pages: String,
    /// Free-text publication date
    pub publication_date: String,
    pub journal_type: String,
    pub pubmed_id: String,
    pub doi: String,
    pub url: String,
    /// Columns past the schema width, kept so rendering never drops data.
    pub extra: Vec<String>,
    /// Zero for records not parsed from a line
    pub(crate) field_count: usize,
}

impl PaperRecord {
    /// Parse a report line.
    ///
    /// Never fails: missing trailing columns become empty strings. The
    /// number of columns actually present is kept in [`field_count`].
    ///
    /// [`field_count`]: PaperRecord::field_count
    pub fn parse(line: &str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields = split_fields(line);
        let field_count = fields.len();
        Self::from_fields(fields, field_count)
    }

    fn from_fields(fields: Vec<String>, field_count: usize) -> Self {
        let mut cols = fields.into_iter();
        let mut next = || cols.next().unwrap_or_default();

        let mut record = PaperRecord {
            tracking_id: next(),
            uid: next(),
            account_name_ja: next(),
            account_name_en: next(),
            title: next(),
            authors: next(),
            authors_ja: next(),
            journal: next(),
            volume: next(),
            number: next(),
            pages: next(),
            publication_date: next(),
            journal_type: next(),
            pubmed_id: next(),
            doi: next(),
            url: next(),
            extra: Vec::new(),
            field_count,
        };
        record.extra = cols.collect();
        record
    }

    /// Number of columns the source line actually had, before padding.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Columns in canonical order, padded to the schema width.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.tracking_id.as_str(),
            self.uid.as_str(),
            self.account_name_ja.as_str(),
            self.account_name_en.as_str(),
            self.title.as_str(),
            self.authors.as_str(),
            self.authors_ja.as_str(),
            self.journal.as_str(),
            self.volume.as_str(),
            self.number.as_str(),
            self.pages.as_str(),
            self.publication_date.as_str(),
            self.journal_type.as_str(),
            self.pubmed_id.as_str(),
            self.doi.as_str(),
            self.url.as_str(),
        ];
        fields.extend(self.extra.iter().map(String::as_str));
        fields
    }

    /// Re-join the columns with the report delimiter.
    pub fn render(&self) -> String {
        self.fields().join(&DELIMITER.to_string())
    }

    /// English display name in `Given Family` order, quotes removed.
    ///
    /// Names that are not in `Family, Given` form are returned unquoted but
    /// otherwise untouched.
    pub fn display_name_en(&self) -> String {
        normalize_name(&self.account_name_en)
    }
}

/// Split a line on every tab.
///
/// A line ending in a tab yields a trailing empty field, and an empty line
/// yields a single empty field.
pub fn split_fields(line: &str) -> Vec<String> {
    line.split(DELIMITER).map(str::to_string).collect()
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .filter(|inner| !inner.is_empty())
        .unwrap_or(s)
}

/// Flip `Family, Given` into `Given Family`.
pub fn normalize_name(raw: &str) -> String {
    let name = unquote(raw.trim()).trim();
    match FAMILY_GIVEN.captures(name) {
        Some(caps) => format!("{} {}", &caps[2], &caps[1]),
        None => name.to_string(),
    }
}
