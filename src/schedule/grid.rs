//! Recovers the logical (day × time block × room) grid from schedule tables.
//!
//! Word tables describe merged areas in two ways: `w:gridSpan` widens a cell over several
//! grid columns, and `w:vMerge` continuation cells repeat a cell from the row above. Rows are
//! first flattened to `(text, col_start, col_end)` triples, then mapped onto the real rooms of
//! each day, which may be fewer than the grid columns reserved under the day header.
use crate::document::Document;
use crate::document::Row;
use crate::document::Table;
use crate::document::VerticalMerge;
use crate::error::MeetingGridError;
use crate::helpers::color::Rgb;
use crate::schedule::Day;
use crate::schedule::RawCell;
use crate::schedule::TimeBlock;
use thiserror::Error;
use tracing::debug;

/// Minimum number of rows of a schedule table
const MIN_SCHEDULE_ROWS: usize = 5;

/// Rows with more cells than this are never break, footer or legend rows
const MAX_SPECIAL_ROW_CELLS: usize = 3;

const BREAK_MARKERS: [&str; 3] = ["break", "coffee", "lunch"];
const FOOTER_MARKERS: [&str; 2] = ["all sessions end", "no exceptions"];
pub(crate) const LEGEND_MARKER: &str = "meeting rooms";

/// Errors specific to grid extraction
#[derive(Error, Debug)]
pub enum GridError {
    #[error("No schedule tables found in '{0}'")]
    NoScheduleTables(String),

    #[error("No day headers recognized in the schedule tables of '{0}'")]
    NoDayHeaders(String),
}

/// A de-merged cell occupying grid columns `start..end`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCell {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub fill: Option<Rgb>,
}

impl GridCell {
    pub fn span(&self) -> usize {
        self.end - self.start
    }
}

/// Column range of one day under the header row
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayLayout {
    pub day: Day,
    pub col_start: usize,
    pub col_end: usize,
    /// Real rooms observed in the data rows
    pub rooms: usize,
}

impl DayLayout {
    pub fn grid_cols(&self) -> usize {
        self.col_end - self.col_start
    }

    fn contains(&self, cell: &GridCell) -> bool {
        cell.start >= self.col_start && cell.end <= self.col_end
    }
}

/// Geometry of one selected schedule table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLayout {
    /// Index among the selected schedule tables
    pub table: usize,
    /// Index among all tables of the document
    pub source_index: usize,
    /// Heading paragraph preceding the table
    pub context: String,
    pub days: Vec<DayLayout>,
}

/// Result of extracting one document
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub cells: Vec<RawCell>,
    pub layouts: Vec<TableLayout>,
}

/// Flattens a row into grid cells. Vertical-merge continuations keep their columns with empty
/// text so that positions stay aligned with the rows above.
pub fn dedupe_row(row: &Row) -> Vec<GridCell> {
    let mut cursor = row.grid_before;
    row.cells
        .iter()
        .map(|cell| {
            let start = cursor;
            cursor += cell.grid_span;
            let text = match cell.v_merge {
                VerticalMerge::Continue => String::new(),
                _ => cell.text.trim().to_owned(),
            };
            GridCell { text, start, end: cursor, fill: cell.fill }
        })
        .collect()
}

fn joined_lowercase(cells: &[GridCell]) -> String {
    cells.iter().map(|cell| cell.text.as_str()).collect::<Vec<_>>().join(" ").to_lowercase()
}

fn is_short_row_with(cells: &[GridCell], markers: &[&str]) -> bool {
    if cells.is_empty() || cells.len() > MAX_SPECIAL_ROW_CELLS {
        return false;
    }
    let text = joined_lowercase(cells);
    markers.iter().any(|marker| text.contains(marker))
}

pub fn is_break_row(cells: &[GridCell]) -> bool {
    is_short_row_with(cells, &BREAK_MARKERS)
}

pub fn is_footer_row(cells: &[GridCell]) -> bool {
    is_short_row_with(cells, &FOOTER_MARKERS)
}

pub fn is_metadata_row(cells: &[GridCell]) -> bool {
    is_short_row_with(cells, &[LEGEND_MARKER])
}

/// Time block of a data row, `None` when the row must be skipped
pub fn classify_row(cells: &[GridCell]) -> Option<&'static TimeBlock> {
    let skip = [is_break_row, is_footer_row, is_metadata_row];
    if skip.iter().any(|predicate| predicate(cells)) {
        return None;
    }
    cells.first().and_then(|first| TimeBlock::from_label(&first.text))
}

/// Day column ranges from the header row; the first cell naming a day wins
pub fn parse_day_header(cells: &[GridCell]) -> Vec<(Day, usize, usize)> {
    let mut days: Vec<(Day, usize, usize)> = Vec::new();
    for cell in cells {
        if let Some(day) = Day::find_in(&cell.text) {
            if !days.iter().any(|(seen, _, _)| *seen == day) {
                days.push((day, cell.start, cell.end));
            }
        }
    }
    days
}

/// A table with at least five rows whose header names a weekday
pub fn is_schedule_table(table: &Table) -> bool {
    if table.rows.len() < MIN_SCHEDULE_ROWS {
        return false;
    }
    let header = dedupe_row(&table.rows[0]);
    Day::find_in(&joined_lowercase(&header)).is_some()
}

/// Indices of the schedule tables to extract, in document order.
/// With more than `max_tables` candidates, the widest ones are kept.
pub fn select_schedule_tables(document: &Document, max_tables: Option<usize>) -> Vec<usize> {
    let mut selected: Vec<usize> = document.tables
        .iter()
        .enumerate()
        .filter(|(_, table)| is_schedule_table(table))
        .map(|(index, _)| index)
        .collect();

    if let Some(max_tables) = max_tables {
        if selected.len() > max_tables {
            selected.sort_by_key(|index| std::cmp::Reverse(document.tables[*index].column_count()));
            selected.truncate(max_tables);
            selected.sort_unstable();
        }
    }
    selected
}

/// Data rows of a table paired with their time block
pub(crate) fn data_rows(table: &Table) -> impl Iterator<Item = (&'static TimeBlock, Vec<GridCell>)> + '_ {
    table.rows
        .iter()
        .skip(1)
        .map(dedupe_row)
        .filter_map(|cells| classify_row(&cells).map(|block| (block, cells)))
}

/// Cells of a data row inside a day's range, time label excluded, in column order
pub(crate) fn cells_in_day<'a>(cells: &'a [GridCell], layout: &DayLayout) -> Vec<&'a GridCell> {
    let mut in_day: Vec<&GridCell> = cells.iter().skip(1).filter(|cell| layout.contains(cell)).collect();
    in_day.sort_by_key(|cell| cell.start);
    in_day
}

/// Real room count of each day: the most cells any data row places in its range, at least 1
pub fn count_rooms(table: &Table, days: &mut [DayLayout]) {
    for layout in days.iter_mut() {
        layout.rooms = 1;
    }
    for (_, cells) in data_rows(table) {
        for layout in days.iter_mut() {
            let count = cells_in_day(&cells, layout).len();
            layout.rooms = layout.rooms.max(count);
        }
    }
}

/// Room positions of each in-day cell of one row, in column order
pub fn assign_rooms(cells: &[&GridCell], layout: &DayLayout) -> Vec<Vec<usize>> {
    let rooms = layout.rooms;
    let grid_cols = layout.grid_cols().max(1);
    let mut running = 0usize;
    cells
        .iter()
        .map(|cell| {
            if cell.span() >= grid_cols {
                running = rooms;
                (0..rooms).collect()
            } else if cells.len() == rooms {
                running += 1;
                vec![running - 1]
            } else {
                let proportional = (cell.span() as f64 * rooms as f64 / grid_cols as f64).round() as usize;
                let count = proportional.max(1).min(rooms.saturating_sub(running).max(1));
                let assigned = (running..running + count).collect();
                running += count;
                assigned
            }
        })
        .collect()
}

fn table_layout(table: &Table, index: usize, source_index: usize) -> Option<TableLayout> {
    let header = dedupe_row(table.rows.first()?);
    let mut days: Vec<DayLayout> = parse_day_header(&header)
        .into_iter()
        .map(|(day, col_start, col_end)| DayLayout { day, col_start, col_end, rooms: 1 })
        .collect();
    if days.is_empty() {
        return None;
    }
    count_rooms(table, &mut days);
    Some(TableLayout {
        table: index,
        source_index,
        context: table.context.clone(),
        days,
    })
}

fn table_cells(table: &Table, layout: &TableLayout) -> Vec<RawCell> {
    let mut cells = Vec::new();
    for (block, row) in data_rows(table) {
        for day in &layout.days {
            let in_day = cells_in_day(&row, day);
            for (cell, rooms) in in_day.iter().zip(assign_rooms(&in_day, day)) {
                if cell.text.trim().is_empty() {
                    continue;
                }
                cells.push(RawCell {
                    text: cell.text.clone(),
                    day: day.day,
                    block: block.index,
                    rooms,
                    table: layout.table,
                });
            }
        }
    }
    cells
}

/// Extracts raw cells from every selected schedule table of a document.
///
/// # Arguments
///
/// * `document` - Parsed word-processing document
/// * `max_tables` - Keep only this many of the widest schedule tables, `None` keeps all
///
/// # Returns
///
/// The non-empty cells and the geometry of each table that had a usable day header
pub fn extract(document: &Document, max_tables: Option<usize>) -> Result<Extraction, MeetingGridError> {
    let selected = select_schedule_tables(document, max_tables);
    if selected.is_empty() {
        Err(GridError::NoScheduleTables(document.name.clone()))?;
    }

    let mut extraction = Extraction::default();
    for (index, source_index) in selected.into_iter().enumerate() {
        let table = &document.tables[source_index];
        let Some(layout) = table_layout(table, index, source_index) else {
            debug!(table = source_index, "schedule table without day header skipped");
            continue;
        };
        extraction.cells.extend(table_cells(table, &layout));
        extraction.layouts.push(layout);
    }

    if extraction.layouts.is_empty() {
        Err(GridError::NoDayHeaders(document.name.clone()))?;
    }
    Ok(extraction)
}
