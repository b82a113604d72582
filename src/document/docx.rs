use crate::document::Document;
use crate::document::DocumentError;
use crate::document::Row;
use crate::document::Shape;
use crate::document::Table;
use crate::document::TableCell;
use crate::document::VerticalMerge;
use crate::error::MeetingGridError;
use crate::helpers::color::Rgb;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

/// Main document part inside the package
const DOCUMENT_PART: &str = "word/document.xml";

// WordprocessingML structure
const TAG_TABLE: QName = QName(b"w:tbl");
const TAG_TABLE_GRID: QName = QName(b"w:tblGrid");
const TAG_GRID_COLUMN: QName = QName(b"w:gridCol");
const TAG_ROW: QName = QName(b"w:tr");
const TAG_ROW_PROPERTIES: QName = QName(b"w:trPr");
const TAG_GRID_BEFORE: QName = QName(b"w:gridBefore");
const TAG_CELL: QName = QName(b"w:tc");
const TAG_CELL_PROPERTIES: QName = QName(b"w:tcPr");
const TAG_GRID_SPAN: QName = QName(b"w:gridSpan");
const TAG_VERTICAL_MERGE: QName = QName(b"w:vMerge");
const TAG_SHADING: QName = QName(b"w:shd");
const TAG_PARAGRAPH: QName = QName(b"w:p");
const TAG_RUN: QName = QName(b"w:r");
const TAG_TEXT: QName = QName(b"w:t");
const TAG_BREAK: QName = QName(b"w:br");
const TAG_CARRIAGE_RETURN: QName = QName(b"w:cr");
const TAG_TAB: QName = QName(b"w:tab");
const TAG_TEXT_BOX_CONTENT: QName = QName(b"w:txbxContent");
// DrawingML shapes
const TAG_SHAPE: QName = QName(b"wps:wsp");
const TAG_SHAPE_PROPERTIES: QName = QName(b"wps:spPr");
const TAG_SOLID_FILL: QName = QName(b"a:solidFill");
const TAG_LINE: QName = QName(b"a:ln");
const TAG_RGB_COLOR: QName = QName(b"a:srgbClr");
// VML shapes (legacy documents)
const VML_SHAPES: [QName; 4] = [
    QName(b"v:shape"),
    QName(b"v:rect"),
    QName(b"v:roundrect"),
    QName(b"v:oval"),
];
// Alternate content duplicates the same drawing as VML
const TAG_FALLBACK: QName = QName(b"mc:Fallback");

impl Document {
    /// Opens a `.docx` file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Document, MeetingGridError> {
        let name = path.as_ref().display().to_string();
        let file = File::open(path.as_ref())?;
        Document::from_reader(&name, BufReader::new(file))
    }

    /// Reads a `.docx` package from any seekable source
    pub fn from_reader<RS: Read + Seek>(name: &str, reader: RS) -> Result<Document, MeetingGridError> {
        let mut zip = ZipArchive::new(reader)?;
        let mut xml = zip
            .xml_reader(DOCUMENT_PART)?
            .ok_or_else(|| DocumentError::MissingPart(name.to_owned(), DOCUMENT_PART.to_owned()))?;
        let mut document = parse_document_xml(&mut xml)?;
        document.name = name.to_owned();
        Ok(document)
    }

    /// Parses a bare `word/document.xml` part
    pub fn from_xml(name: &str, xml: &[u8]) -> Result<Document, MeetingGridError> {
        let mut reader = XmlReader::new(xml);
        let mut document = parse_document_xml(&mut reader)?;
        document.name = name.to_owned();
        Ok(document)
    }
}

fn is_vml_shape(name: QName) -> bool {
    VML_SHAPES.iter().any(|tag| *tag == name)
}

/// Shape under construction
#[derive(Default)]
struct ShapeBuilder {
    fill: Option<Rgb>,
    lines: Vec<String>,
}

/// Cell under construction
#[derive(Default)]
struct CellBuilder {
    paragraphs: Vec<String>,
    grid_span: usize,
    v_merge: VerticalMerge,
    fill: Option<Rgb>,
}

impl CellBuilder {
    fn build(self) -> TableCell {
        TableCell {
            text: self.paragraphs.join("\n").trim().to_owned(),
            grid_span: self.grid_span.max(1),
            v_merge: self.v_merge,
            fill: self.fill,
        }
    }
}

/// Streaming state while walking the document body
#[derive(Default)]
struct BodyWalker {
    document: Document,
    table_depth: usize,
    table: Option<Table>,
    row: Option<Row>,
    cell: Option<CellBuilder>,
    in_table_grid: bool,
    in_row_properties: bool,
    in_cell_properties: bool,
    in_run: bool,
    in_text: bool,
    paragraph: String,
    last_paragraph: String,
    text_box_depth: usize,
    text_box_paragraph: String,
    shapes: Vec<ShapeBuilder>,
    in_shape_properties: bool,
    in_solid_fill: bool,
    in_line: bool,
}

impl BodyWalker {
    fn in_top_level_table(&self) -> bool {
        self.table_depth == 1
    }

    fn text_target(&mut self) -> &mut String {
        if self.text_box_depth > 0 {
            &mut self.text_box_paragraph
        } else {
            &mut self.paragraph
        }
    }

    fn start_table(&mut self) {
        self.table_depth += 1;
        if self.in_top_level_table() {
            self.table = Some(Table {
                grid_cols: 0,
                context: std::mem::take(&mut self.last_paragraph),
                rows: Vec::new(),
            });
        }
    }

    fn end_table(&mut self) {
        if self.in_top_level_table() {
            if let Some(table) = self.table.take() {
                self.document.tables.push(table);
            }
        }
        self.table_depth = self.table_depth.saturating_sub(1);
    }

    fn end_cell(&mut self) {
        if let (Some(row), Some(cell)) = (self.row.as_mut(), self.cell.take()) {
            row.cells.push(cell.build());
        }
    }

    fn end_row(&mut self) {
        if let (Some(table), Some(row)) = (self.table.as_mut(), self.row.take()) {
            table.rows.push(row);
        }
    }

    fn end_paragraph(&mut self) {
        if self.text_box_depth > 0 {
            let line = std::mem::take(&mut self.text_box_paragraph);
            if let Some(shape) = self.shapes.last_mut() {
                let line = line.trim();
                if !line.is_empty() {
                    shape.lines.push(line.to_owned());
                }
            }
            return;
        }

        let text = std::mem::take(&mut self.paragraph);
        if let Some(cell) = self.cell.as_mut() {
            cell.paragraphs.push(text);
        } else if self.table_depth == 0 {
            let text = text.trim();
            if !text.is_empty() {
                self.last_paragraph = text.to_owned();
                self.document.paragraphs.push(text.to_owned());
            }
        }
    }

    fn end_shape(&mut self) {
        if let Some(shape) = self.shapes.pop() {
            let label = shape.lines.join("\n");
            match shape.fill {
                Some(fill) if self.table_depth == 0 && !label.is_empty() => {
                    self.document.shapes.push(Shape { label, fill });
                }
                _ => (),
            }
        }
    }
}

/// Walks `word/document.xml` and collects tables, shapes and body paragraphs
pub(crate) fn parse_document_xml<R: BufRead>(reader: &mut XmlReader<R>) -> Result<Document, MeetingGridError> {
    let mut walker = BodyWalker::default();
    let mut fallback_depth = 0usize;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_FALLBACK => fallback_depth += 1,
        Event::End(event) if event.name() == TAG_FALLBACK => fallback_depth = fallback_depth.saturating_sub(1),
        _ if fallback_depth > 0 => (),

        // Tables
        Event::Start(event) if event.name() == TAG_TABLE => walker.start_table(),
        Event::End(event) if event.name() == TAG_TABLE => walker.end_table(),
        Event::Start(event) if walker.in_top_level_table() && event.name() == TAG_TABLE_GRID => walker.in_table_grid = true,
        Event::End(event) if event.name() == TAG_TABLE_GRID => walker.in_table_grid = false,
        Event::Start(event) if walker.in_table_grid && event.name() == TAG_GRID_COLUMN => {
            if let Some(table) = walker.table.as_mut() {
                table.grid_cols += 1;
            }
        }
        Event::Start(event) if walker.in_top_level_table() && event.name() == TAG_ROW => walker.row = Some(Row::default()),
        Event::End(event) if walker.in_top_level_table() && event.name() == TAG_ROW => walker.end_row(),
        Event::Start(event) if walker.in_top_level_table() && event.name() == TAG_ROW_PROPERTIES => walker.in_row_properties = true,
        Event::End(event) if event.name() == TAG_ROW_PROPERTIES => walker.in_row_properties = false,
        Event::Start(event) if walker.in_row_properties && event.name() == TAG_GRID_BEFORE => {
            let grid_before = event.parse_attribute_value::<usize>("w:val")?.unwrap_or(0);
            if let Some(row) = walker.row.as_mut() {
                row.grid_before = grid_before;
            }
        }
        Event::Start(event) if walker.in_top_level_table() && event.name() == TAG_CELL => {
            walker.cell = Some(CellBuilder { grid_span: 1, ..Default::default() });
        }
        Event::End(event) if walker.in_top_level_table() && event.name() == TAG_CELL => walker.end_cell(),
        Event::Start(event) if walker.in_top_level_table() && event.name() == TAG_CELL_PROPERTIES => walker.in_cell_properties = true,
        Event::End(event) if event.name() == TAG_CELL_PROPERTIES => walker.in_cell_properties = false,
        Event::Start(event) if walker.in_cell_properties && event.name() == TAG_GRID_SPAN => {
            let span = event.parse_attribute_value::<usize>("w:val")?.unwrap_or(1);
            if let Some(cell) = walker.cell.as_mut() {
                cell.grid_span = span;
            }
        }
        Event::Start(event) if walker.in_cell_properties && event.name() == TAG_VERTICAL_MERGE => {
            let restart = event.get_attribute_value("w:val")?
                .map(|value| value == "restart")
                .unwrap_or(false);
            if let Some(cell) = walker.cell.as_mut() {
                cell.v_merge = if restart { VerticalMerge::Restart } else { VerticalMerge::Continue };
            }
        }
        Event::Start(event) if walker.in_cell_properties && event.name() == TAG_SHADING => {
            let fill = event.get_attribute_value("w:fill")?.and_then(|value| Rgb::parse_hex(&value));
            if let Some(cell) = walker.cell.as_mut() {
                cell.fill = fill;
            }
        }

        // Text
        Event::End(event) if event.name() == TAG_PARAGRAPH => walker.end_paragraph(),
        Event::Start(event) if event.name() == TAG_RUN => walker.in_run = true,
        Event::End(event) if event.name() == TAG_RUN => walker.in_run = false,
        Event::Start(event) if event.name() == TAG_TEXT => walker.in_text = true,
        Event::End(event) if event.name() == TAG_TEXT => walker.in_text = false,
        Event::Start(event) if walker.in_run && (event.name() == TAG_BREAK || event.name() == TAG_CARRIAGE_RETURN) => {
            walker.text_target().push('\n');
        }
        Event::Start(event) if walker.in_run && event.name() == TAG_TAB => walker.text_target().push('\t'),
        Event::Text(event) if walker.in_text => walker.text_target().push_bytes_text(&event)?,
        Event::GeneralRef(event) if walker.in_text => walker.text_target().push_bytes_ref(&event)?,

        // Shapes
        Event::Start(event) if event.name() == TAG_TEXT_BOX_CONTENT => walker.text_box_depth += 1,
        Event::End(event) if event.name() == TAG_TEXT_BOX_CONTENT => {
            walker.text_box_depth = walker.text_box_depth.saturating_sub(1);
        }
        Event::Start(event) if event.name() == TAG_SHAPE => walker.shapes.push(ShapeBuilder::default()),
        Event::End(event) if event.name() == TAG_SHAPE => walker.end_shape(),
        Event::Start(event) if is_vml_shape(event.name()) => {
            let filled = event.get_attribute_value("filled")?
                .map(|value| value != "f" && value != "false")
                .unwrap_or(true);
            let fill = event.get_attribute_value("fillcolor")?
                .and_then(|value| Rgb::parse_hex(&value))
                .filter(|_| filled);
            walker.shapes.push(ShapeBuilder { fill, lines: Vec::new() });
        }
        Event::End(event) if is_vml_shape(event.name()) => walker.end_shape(),
        Event::Start(event) if event.name() == TAG_SHAPE_PROPERTIES => walker.in_shape_properties = true,
        Event::End(event) if event.name() == TAG_SHAPE_PROPERTIES => walker.in_shape_properties = false,
        Event::Start(event) if walker.in_shape_properties && event.name() == TAG_LINE => walker.in_line = true,
        Event::End(event) if event.name() == TAG_LINE => walker.in_line = false,
        Event::Start(event) if walker.in_shape_properties && event.name() == TAG_SOLID_FILL => walker.in_solid_fill = true,
        Event::End(event) if event.name() == TAG_SOLID_FILL => walker.in_solid_fill = false,
        Event::Start(event) if walker.in_solid_fill && !walker.in_line && event.name() == TAG_RGB_COLOR => {
            let fill = event.get_attribute_value("val")?.and_then(|value| Rgb::parse_hex(&value));
            if let Some(shape) = walker.shapes.last_mut() {
                if shape.fill.is_none() {
                    shape.fill = fill;
                }
            }
        }
    });
    Ok(walker.document)
}
