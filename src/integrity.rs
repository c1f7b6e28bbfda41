//! Column-count check for report files.
//!
//! Diagnostic only: deviations are reported and logged, never fatal, and
//! the classifier pads short lines regardless.

use crate::error::Result;
use crate::record::{split_fields, SCHEMA_WIDTH};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// A line whose column count differs from the schema width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCountDeviation {
    /// 1-based line number, header included
    pub line: usize,
    pub field_count: usize,
    pub first: String,
    pub second: String,
}

/// Check every line of `text`, header included.
pub fn check_text(text: &str) -> Vec<FieldCountDeviation> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let fields = split_fields(line);
            let field_count = fields.len();
            if field_count == SCHEMA_WIDTH {
                return None;
            }

            let mut cols = fields.into_iter();
            let deviation = FieldCountDeviation {
                line: idx + 1,
                field_count,
                first: cols.next().unwrap_or_default(),
                second: cols.next().unwrap_or_default(),
            };
            warn!(
                line = deviation.line,
                field_count = deviation.field_count,
                first = %deviation.first,
                second = %deviation.second,
                "Unexpected column count"
            );
            Some(deviation)
        })
        .collect()
}

/// Read a report file and check its column counts.
pub fn check_file(path: &Path) -> Result<Vec<FieldCountDeviation>> {
    let text = std::fs::read_to_string(path)?;
    let deviations = check_text(&text);
    info!(path = ?path, deviations = deviations.len(), "Table check complete");
    Ok(deviations)
}
