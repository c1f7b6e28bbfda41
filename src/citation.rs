//! Citation extraction from PubMed efetch documents.
//!
//! [`extract`] walks the XML event stream once and fills a [`Citation`]
//! without building a DOM. Journal metadata (abbreviation, volume, issue and
//! the publication date) is only taken from inside `<Journal>`, since
//! `<Year>`/`<Month>`/`<Day>` also appear in `<DateCompleted>`,
//! `<ArticleDate>` and friends.
//!
//! Text values are whitespace-normalized: runs of spaces and line breaks
//! collapse to one space and the ends are trimmed, so a title split by
//! inline markup reads as one line.
//!
//! A document that ends with elements still open is rejected, so a
//! truncated response never yields a partial citation.

use crate::error::{PaperTableError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::trace;

/// Fields in a rendered citation row.
pub const CITATION_WIDTH: usize = 4;

static DOI_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.[0-9]+").expect("DOI pattern is valid"));

/// Bibliographic fields pulled out of one citation document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub article_title: Option<String>,
    /// ISO journal abbreviation
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    /// Free-text date used by PubMed when there is no structured `<Year>`
    pub medline_date: Option<String>,
    /// `<MedlinePgn>` page range
    pub pages: Option<String>,
    pub doi: Option<String>,
    /// Publisher item identifier, used as locator when pages are missing
    pub pii: Option<String>,
}

/// Position of the extractor within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractState {
    Idle,
    InJournal,
    InArticleTitle,
}

/// Parse a citation document into a [`Citation`].
///
/// Fails on malformed XML (mismatched tags, bad escapes, truncated input);
/// there is no attempt to recover part of a broken document.
pub fn extract(xml: &str) -> Result<Citation> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut citation = Citation::default();
    let mut state = ExtractState::Idle;
    let mut title = String::new();
    // Elements opened in this loop and not yet closed
    let mut open = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(_) => open += 1,
            Event::End(_) => open = open.saturating_sub(1),
            _ => {}
        }

        state = match (state, event) {
            (ExtractState::InArticleTitle, Event::Text(t)) => {
                title.push_str(&t.unescape()?);
                state
            }
            (ExtractState::InArticleTitle, Event::CData(c)) => {
                title.push_str(&String::from_utf8_lossy(&c));
                state
            }
            (ExtractState::InArticleTitle, Event::End(e))
                if e.local_name().as_ref() == b"ArticleTitle" =>
            {
                citation.article_title = clean(&title);
                title.clear();
                ExtractState::Idle
            }
            // Inline markup inside the title is flattened into its text
            (ExtractState::InArticleTitle, Event::Eof) => return Err(unterminated(b"ArticleTitle")),
            (ExtractState::InArticleTitle, _) => state,

            (_, Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"ArticleTitle" => ExtractState::InArticleTitle,
                    b"Journal" => ExtractState::InJournal,
                    b"MedlinePgn" => {
                        citation.pages = clean(&read_text(&mut reader, b"MedlinePgn")?);
                        open -= 1;
                        state
                    }
                    b"ELocationID" => {
                        let id_type = attribute(&e, "EIdType")?;
                        let value = read_text(&mut reader, b"ELocationID")?;
                        citation.record_location_id(id_type.as_deref(), &value);
                        open -= 1;
                        state
                    }
                    tag if state == ExtractState::InJournal => {
                        if let Some(slot) = citation.journal_slot(tag) {
                            *slot = clean(&read_text(&mut reader, tag)?);
                            open -= 1;
                        }
                        state
                    }
                    _ => state,
                }
            }
            (ExtractState::InJournal, Event::End(e)) if e.local_name().as_ref() == b"Journal" => {
                ExtractState::Idle
            }
            (ExtractState::InJournal, Event::Eof) => return Err(unterminated(b"Journal")),
            (_, Event::Eof) if open > 0 => {
                return Err(PaperTableError::Parse(format!(
                    "document ended with {} unclosed element(s)",
                    open
                )))
            }
            (_, Event::Eof) => break,
            _ => state,
        };

        buf.clear();
    }

    trace!(citation = ?citation, "Extracted citation");
    Ok(citation)
}

/// Collect the text content of the element whose start tag was just read,
/// consuming everything up to and including its end tag.
fn read_text(reader: &mut Reader<&[u8]>, name: &[u8]) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(e) if e.local_name().as_ref() == name => depth += 1,
            Event::End(e) if e.local_name().as_ref() == name => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => return Err(unterminated(name)),
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(key)
        .map_err(quick_xml::Error::from)?;
    match attr {
        Some(a) => Ok(Some(a.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn unterminated(name: &[u8]) -> PaperTableError {
    PaperTableError::Parse(format!(
        "document ended inside <{}>",
        String::from_utf8_lossy(name)
    ))
}

/// Collapse internal whitespace; empty content counts as absent.
fn clean(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

impl Citation {
    fn journal_slot(&mut self, tag: &[u8]) -> Option<&mut Option<String>> {
        match tag {
            b"ISOAbbreviation" => Some(&mut self.journal),
            b"Volume" => Some(&mut self.volume),
            b"Issue" => Some(&mut self.issue),
            b"Year" => Some(&mut self.year),
            b"Month" => Some(&mut self.month),
            b"Day" => Some(&mut self.day),
            b"MedlineDate" => Some(&mut self.medline_date),
            _ => None,
        }
    }

    /// Store an `<ELocationID>` value according to its `EIdType`.
    ///
    /// Untyped values are taken as a DOI only when they look like one and no
    /// DOI has been seen yet.
    fn record_location_id(&mut self, id_type: Option<&str>, raw: &str) {
        let Some(value) = clean(raw) else {
            return;
        };

        match id_type {
            Some("doi") => self.doi = Some(value),
            Some("pii") => self.pii = Some(value),
            Some(other) => trace!(id_type = other, "Ignoring ELocationID"),
            None => {
                if self.doi.is_none() && DOI_PREFIX.is_match(&value) {
                    self.doi = Some(value);
                }
            }
        }
    }

    /// `"<year> [<month> [<day>]];"`
    ///
    /// Day is only shown together with month. Without a year the free-text
    /// MedlineDate is used.
    pub fn publish_date(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();

        if let Some(year) = &self.year {
            parts.push(year);
            if let Some(month) = &self.month {
                parts.push(month);
                if let Some(day) = &self.day {
                    parts.push(day);
                }
            }
        } else if let Some(date) = &self.medline_date {
            parts.push(date);
        }

        format!("{};", parts.join(" "))
    }

    /// Formatted journal reference, e.g.
    /// `FEMS Microbiol Ecol. 2022 Feb 10; 98(1): fiac004.`
    pub fn journal_column(&self) -> String {
        let journal = self.journal.as_deref().unwrap_or_default();
        let volume = self.volume.as_deref().unwrap_or_default();

        let mut parts = vec![format!("{}.", journal), self.publish_date()];

        match &self.issue {
            Some(issue) => parts.push(format!("{}({}):", volume, issue)),
            None => parts.push(format!("{}:", volume)),
        }

        if let Some(locator) = self.pages.as_ref().or(self.pii.as_ref()) {
            parts.push(format!("{}.", locator));
        }

        parts.join(" ")
    }

    /// `[title, journal column, identifier, doi]`
    pub fn to_row(&self, pmid: &str) -> [String; CITATION_WIDTH] {
        [
            self.article_title.clone().unwrap_or_default(),
            self.journal_column(),
            pmid.to_string(),
            self.doi.clone().unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../tests/fixtures/pubmed_fiac004.xml");

    fn wrap(article: &str) -> String {
        format!(
            "<PubmedArticleSet><PubmedArticle><MedlineCitation><Article>{}</Article></MedlineCitation></PubmedArticle></PubmedArticleSet>",
            article
        )
    }

    #[test]
    fn test_extract_fixture() -> Result<()> {
        let citation = extract(FIXTURE)?;

        assert_eq!(
            citation.article_title.as_deref(),
            Some("Metagenomic profiling of Bacillus communities in soil & sediment.")
        );
        assert_eq!(citation.journal.as_deref(), Some("FEMS Microbiol Ecol"));
        assert_eq!(citation.volume.as_deref(), Some("98"));
        assert_eq!(citation.issue.as_deref(), Some("1"));
        assert_eq!(citation.year.as_deref(), Some("2022"));
        assert_eq!(citation.month.as_deref(), Some("Feb"));
        assert_eq!(citation.day.as_deref(), Some("10"));
        assert_eq!(citation.pages, None);
        assert_eq!(citation.pii.as_deref(), Some("fiac004"));
        assert_eq!(citation.doi.as_deref(), Some("10.1093/femsec/fiac004"));
        Ok(())
    }

    #[test]
    fn test_journal_column_with_pii_fallback() -> Result<()> {
        let citation = extract(FIXTURE)?;
        assert_eq!(
            citation.journal_column(),
            "FEMS Microbiol Ecol. 2022 Feb 10; 98(1): fiac004."
        );
        Ok(())
    }

    #[test]
    fn test_year_outside_journal_is_ignored() -> Result<()> {
        let xml = wrap(
            "<ArticleDate><Year>1999</Year><Month>12</Month><Day>31</Day></ArticleDate>\
             <Journal><JournalIssue><Volume>5</Volume></JournalIssue></Journal>\
             <DateRevised><Year>2023</Year></DateRevised>",
        );
        let citation = extract(&xml)?;
        assert_eq!(citation.year, None);
        assert_eq!(citation.month, None);
        assert_eq!(citation.day, None);
        assert_eq!(citation.volume.as_deref(), Some("5"));
        Ok(())
    }

    #[test]
    fn test_volume_outside_journal_is_ignored() -> Result<()> {
        let citation = extract(&wrap("<Book><Volume>7</Volume></Book>"))?;
        assert_eq!(citation.volume, None);
        Ok(())
    }

    #[test]
    fn test_untyped_elocation_doi_fallback() -> Result<()> {
        let citation = extract(&wrap("<ELocationID>10.1234/abcd</ELocationID>"))?;
        assert_eq!(citation.doi.as_deref(), Some("10.1234/abcd"));
        assert_eq!(citation.pii, None);
        Ok(())
    }

    #[test]
    fn test_untyped_elocation_non_doi_is_ignored() -> Result<()> {
        let citation = extract(&wrap("<ELocationID>e1002345</ELocationID>"))?;
        assert_eq!(citation.doi, None);
        Ok(())
    }

    #[test]
    fn test_untyped_elocation_does_not_replace_doi() -> Result<()> {
        let citation = extract(&wrap(
            "<ELocationID EIdType=\"doi\">10.1/first</ELocationID>\
             <ELocationID>10.2/second</ELocationID>",
        ))?;
        assert_eq!(citation.doi.as_deref(), Some("10.1/first"));
        Ok(())
    }

    #[test]
    fn test_pii_leaves_doi_untouched() -> Result<()> {
        let citation = extract(&wrap("<ELocationID EIdType=\"pii\">fiac004</ELocationID>"))?;
        assert_eq!(citation.pii.as_deref(), Some("fiac004"));
        assert_eq!(citation.doi, None);
        Ok(())
    }

    #[test]
    fn test_title_with_nested_markup() -> Result<()> {
        let citation = extract(&wrap(
            "<ArticleTitle>Role of <i>TP53</i> in <sup>13</sup>C labelling<![CDATA[ <raw>]]></ArticleTitle>",
        ))?;
        assert_eq!(
            citation.article_title.as_deref(),
            Some("Role of TP53 in 13C labelling <raw>")
        );
        Ok(())
    }

    #[test]
    fn test_journal_abbreviation_with_markup() -> Result<()> {
        let citation = extract(&wrap(
            "<Journal><ISOAbbreviation>Genes <b>and</b> Cells</ISOAbbreviation></Journal>",
        ))?;
        assert_eq!(citation.journal.as_deref(), Some("Genes and Cells"));
        Ok(())
    }

    #[test]
    fn test_pages_preferred_over_pii() -> Result<()> {
        let citation = extract(&wrap(
            "<Journal><ISOAbbreviation>Cell</ISOAbbreviation>\
             <JournalIssue><Volume>12</Volume><PubDate><Year>2020</Year></PubDate></JournalIssue></Journal>\
             <Pagination><MedlinePgn>100-110</MedlinePgn></Pagination>\
             <ELocationID EIdType=\"pii\">S0092</ELocationID>",
        ))?;
        assert_eq!(citation.journal_column(), "Cell. 2020; 12: 100-110.");
        Ok(())
    }

    #[test]
    fn test_publish_date_nesting() {
        let mut citation = Citation {
            year: Some("2021".to_string()),
            day: Some("3".to_string()),
            ..Default::default()
        };
        // Day is never shown without month
        assert_eq!(citation.publish_date(), "2021;");

        citation.month = Some("Mar".to_string());
        assert_eq!(citation.publish_date(), "2021 Mar 3;");
    }

    #[test]
    fn test_medline_date_fallback() -> Result<()> {
        let citation = extract(&wrap(
            "<Journal><JournalIssue><PubDate><MedlineDate>2021 Jan-Feb</MedlineDate></PubDate></JournalIssue></Journal>",
        ))?;
        assert_eq!(citation.publish_date(), "2021 Jan-Feb;");
        Ok(())
    }

    #[test]
    fn test_journal_column_without_locator() {
        let citation = Citation {
            journal: Some("Nature".to_string()),
            volume: Some("600".to_string()),
            year: Some("2021".to_string()),
            ..Default::default()
        };
        assert_eq!(citation.journal_column(), "Nature. 2021; 600:");
    }

    #[test]
    fn test_to_row() -> Result<()> {
        let row = extract(FIXTURE)?.to_row("35040987");
        assert_eq!(row[2], "35040987");
        assert_eq!(row[3], "10.1093/femsec/fiac004");
        assert!(row[1].ends_with("98(1): fiac004."));
        Ok(())
    }

    #[test]
    fn test_mismatched_tags_are_an_error() {
        let result = extract("<PubmedArticle><Journal><Volume>1</Issue></Journal></PubmedArticle>");
        assert!(matches!(result, Err(PaperTableError::Xml(_))));
    }

    #[test]
    fn test_truncated_document_is_an_error() {
        let result = extract("<PubmedArticle><ArticleTitle>Half a title");
        assert!(result.is_err());

        let result = extract("<PubmedArticle><Journal><Volume>1</Volume>");
        assert!(result.is_err());
    }

    #[test]
    fn test_document_cut_after_journal_is_an_error() {
        let cut = FIXTURE.find("<ArticleDate").expect("fixture has ArticleDate");
        assert!(matches!(extract(&FIXTURE[..cut]), Err(PaperTableError::Parse(_))));

        let unclosed = "<PubmedArticleSet><PubmedArticle><Journal><ISOAbbreviation>X</ISOAbbreviation></Journal><ArticleTitle>T</ArticleTitle>";
        assert!(matches!(extract(unclosed), Err(PaperTableError::Parse(_))));
    }

    #[test]
    fn test_empty_document() -> Result<()> {
        assert_eq!(extract("")?, Citation::default());
        Ok(())
    }
}
