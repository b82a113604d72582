//! # Document Model
//!
//! A minimal, table-oriented view of a WordprocessingML (`.docx`) file: top-level tables
//! with their raw span and merge markup, standalone colored label shapes, and the body
//! paragraphs between tables. Layout interpretation happens in [`crate::schedule`].
use crate::helpers::color::Rgb;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub(crate) mod docx;

/// Error types specific to reading word-processing packages
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Package does not contain the main document part
    #[error("'{0}' has no part '{1}'")]
    MissingPart(String, String),
}

/// Vertical merge state of a table cell (`w:vMerge`)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum VerticalMerge {
    /// Not part of a vertical merge
    #[default]
    None,
    /// First cell of a vertical merge, carries the text
    Restart,
    /// Covered by the cell above
    Continue,
}

/// One `w:tc` element
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableCell {
    /// Paragraph texts joined with `\n`, trimmed
    pub text: String,
    /// Number of grid columns covered (`w:gridSpan`)
    pub grid_span: usize,
    pub v_merge: VerticalMerge,
    /// Background shading (`w:shd@w:fill`)
    pub fill: Option<Rgb>,
}

impl TableCell {
    pub fn new(text: &str, grid_span: usize) -> Self {
        Self {
            text: text.to_owned(),
            grid_span: grid_span.max(1),
            v_merge: VerticalMerge::None,
            fill: None,
        }
    }

    pub fn with_merge(mut self, v_merge: VerticalMerge) -> Self {
        self.v_merge = v_merge;
        self
    }

    pub fn with_fill(mut self, fill: Rgb) -> Self {
        self.fill = Some(fill);
        self
    }
}

/// One `w:tr` element
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    /// Grid columns skipped before the first cell (`w:gridBefore`)
    pub grid_before: usize,
    pub cells: Vec<TableCell>,
}

impl Row {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self { grid_before: 0, cells }
    }
}

/// A top-level `w:tbl`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    /// Number of `w:gridCol` definitions
    pub grid_cols: usize,
    /// Last non-empty body paragraph before the table
    pub context: String,
    pub rows: Vec<Row>,
}

impl Table {
    /// Grid width: the declared grid, or the widest row when `w:tblGrid` is missing
    pub fn column_count(&self) -> usize {
        let widest = self.rows
            .iter()
            .map(|row| row.grid_before + row.cells.iter().map(|cell| cell.grid_span).sum::<usize>())
            .max()
            .unwrap_or(0);
        self.grid_cols.max(widest)
    }
}

/// A filled shape carrying a text label, drawn outside any table
#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    pub label: String,
    pub fill: Rgb,
}

/// Parsed word-processing document
#[derive(Clone, Debug, Default)]
pub struct Document {
    /// Source path or a descriptive name
    pub name: String,
    pub tables: Vec<Table>,
    pub shapes: Vec<Shape>,
    /// Non-empty body paragraphs outside tables and text boxes
    pub paragraphs: Vec<String>,
}

impl Document {
    /// First body paragraph shaped like `City, CC, <dates>, 2026`
    pub fn location_line(&self) -> Option<&str> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"^[^,\n]+,\s*[A-Z]{2}\b[^\n]*\b(19|20)\d{2}\b").expect("location pattern")
        });
        self.paragraphs
            .iter()
            .map(|paragraph| paragraph.trim())
            .find(|paragraph| pattern.is_match(paragraph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_count_prefers_widest() {
        let table = Table {
            grid_cols: 3,
            context: String::new(),
            rows: vec![Row::new(vec![TableCell::new("a", 2), TableCell::new("b", 3)])],
        };
        assert_eq!(table.column_count(), 5);
    }

    #[test]
    fn location_line_detection() {
        let document = Document {
            paragraphs: vec![
                "3GPP TSG RAN WG1 #124".to_owned(),
                "Gothenburg, SE, Feb. 9th ~ 13th, 2026".to_owned(),
            ],
            ..Default::default()
        };
        assert_eq!(document.location_line(), Some("Gothenburg, SE, Feb. 9th ~ 13th, 2026"));
    }
}
