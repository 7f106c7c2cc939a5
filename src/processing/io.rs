use super::types::{MISSING_MARKERS, Record, Table, Value};
use crate::error::{NodeflowError, Result, ResultExt as _};
use polars::prelude::{CsvReadOptions, JsonReader, NullValues, SerReader as _};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Csv,
    Json,
    Xml,
}

impl PayloadFormat {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().trim_start_matches('.').to_lowercase().as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Format from a file name's extension, defaulting to CSV.
    pub fn from_file_name(name: &str) -> Self {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
            .unwrap_or_default()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parses a raw payload into a table, failing with `InputFormat` on malformed content.
pub fn parse_table(content: &str, format: PayloadFormat) -> Result<Table> {
    match format {
        PayloadFormat::Csv => parse_csv(content),
        PayloadFormat::Json => parse_json(content),
        PayloadFormat::Xml => Table::from_records(&parse_xml(content)?),
    }
}

/// Parses a raw payload into records, failing with `InputFormat` on malformed content.
pub fn parse_records(content: &str, format: PayloadFormat) -> Result<Vec<Record>> {
    match format {
        PayloadFormat::Xml => parse_xml(content),
        _ => Ok(parse_table(content, format)?.to_records()),
    }
}

/// Lenient variant used for workflow inputs: malformed content yields no records.
pub fn read_records(content: &str, format: PayloadFormat) -> Vec<Record> {
    parse_records(content, format).unwrap_or_else(|e| {
        tracing::warn!(%format, "Could not parse input payload, using an empty table: {e}");
        Vec::new()
    })
}

/// Reads a data file into a table, picking the parser from the extension.
pub fn load_table(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let format = PayloadFormat::from_file_name(&path.to_string_lossy());
    let table = parse_table(&content, format)?;
    tracing::info!(path = %path.display(), shape = ?table.shape(), "Loaded table");
    Ok(table)
}

/// Reads CSV with polars. Cells matching [`MISSING_MARKERS`] are missing, short rows
/// are padded and long rows truncated.
fn parse_csv(content: &str) -> Result<Table> {
    let mut header_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = dedupe_headers(header_reader.headers()?.iter());
    if headers.is_empty() {
        return Ok(Table::default());
    }

    let null_values = NullValues::AllColumns(MISSING_MARKERS.iter().map(|m| (*m).into()).collect());
    let mut frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10000))
        .map_parse_options(|options| {
            options
                .with_null_values(Some(null_values.clone()))
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(content.as_bytes()))
        .finish()?;
    frame.set_column_names(headers)?;
    Ok(Table::from_frame(frame))
}

/// Blank headers become `Unnamed: i`; repeated headers get `.1`, `.2` suffixes.
fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for (i, name) in raw.enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_owned()
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while headers.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        headers.push(candidate);
    }
    headers
}

/// Lists of row objects are read by polars; an object of columns is read cell by cell.
fn parse_json(content: &str) -> Result<Table> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    match &value {
        serde_json::Value::Array(rows) if rows.is_empty() => Ok(Table::default()),
        serde_json::Value::Array(rows) if rows.iter().all(serde_json::Value::is_object) => {
            let frame = JsonReader::new(Cursor::new(content.as_bytes())).finish()?;
            Ok(Table::from_frame(frame))
        }
        _ => Table::from_json(&value),
    }
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

fn parse_xml(content: &str) -> Result<Vec<Record>> {
    let root = parse_xml_tree(content)?;
    let mut records = Vec::new();
    for child in &root.children {
        collect_xml_records(child, &mut records);
    }
    Ok(records)
}

fn parse_xml_tree(content: &str) -> Result<Element> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element {
                name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
                ..Element::default()
            }),
            Event::Empty(empty) => {
                let element = Element {
                    name: String::from_utf8_lossy(empty.local_name().as_ref()).into_owned(),
                    ..Element::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    return Err(NodeflowError::InputFormat(
                        "unbalanced closing tag".to_owned(),
                    ));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = Some(done),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    root.ok_or_else(|| NodeflowError::InputFormat("XML document has no root element".to_owned()))
}

/// A leaf becomes a one-field record, an element of leaves becomes one record,
/// anything deeper is searched recursively.
fn collect_xml_records(element: &Element, records: &mut Vec<Record>) {
    if element.is_leaf() {
        let mut record = Record::new();
        record.insert(element.name.clone(), Value::infer(&element.text));
        records.push(record);
    } else if element.children.iter().all(Element::is_leaf) {
        records.push(
            element
                .children
                .iter()
                .map(|c| (c.name.clone(), Value::infer(&c.text)))
                .collect(),
        );
    } else {
        for child in &element.children {
            collect_xml_records(child, records);
        }
    }
}
