//! Line-at-a-time TSV output.

use crate::error::{PaperTableError, Result};
use crate::record::PaperRecord;
use std::io::Write;

/// Tab-separated writer that flushes after every row.
///
/// Rows may differ in width (enriched rows have six columns, passthrough
/// records sixteen). Output is append-only, so an interrupted run leaves
/// only complete lines behind.
pub struct TsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl<W: Write> TsvSink<W> {
    pub fn new(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true)
            .from_writer(inner);

        Self { writer, rows: 0 }
    }

    /// Write one row. Tabs and line breaks inside values become spaces.
    pub fn write_row<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let cleaned: Vec<String> = fields
            .into_iter()
            .map(|f| f.as_ref().replace(['\t', '\r', '\n'], " "))
            .collect();

        self.writer.write_record(&cleaned)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Write a record in canonical column order.
    pub fn write_record(&mut self, record: &PaperRecord) -> Result<()> {
        self.write_row(record.fields())
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PaperTableError::Io(e.into_error()))
    }
}
