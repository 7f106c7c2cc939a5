//! Serializes tables to downloadable CSV, XML or JSON documents.

use crate::error::{NodeflowError, Result};
use crate::processing::io::PayloadFormat;
use crate::processing::types::{Table, Value};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportPayload {
    pub content: String,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub filename: String,
}

pub fn mime_type(format: PayloadFormat) -> &'static str {
    match format {
        PayloadFormat::Csv => "text/csv;charset=utf-8;",
        PayloadFormat::Xml => "application/xml;charset=utf-8;",
        PayloadFormat::Json => "application/json;charset=utf-8;",
    }
}

/// Renders `table` in the named format. The file name is `{file_stem}.{extension}`.
///
/// # Errors
///
/// `UnsupportedFormat` for anything other than csv, xml or json.
pub fn export_table(table: &Table, format: &str, file_stem: &str) -> Result<ExportPayload> {
    let format = PayloadFormat::parse(format)
        .ok_or_else(|| NodeflowError::UnsupportedFormat(format.to_owned()))?;
    let content = match format {
        PayloadFormat::Csv => to_csv(table)?,
        PayloadFormat::Xml => to_xml(table)?,
        PayloadFormat::Json => serde_json::to_string_pretty(&table.to_records())?,
    };
    tracing::debug!(%format, rows = table.height(), "Exported table");
    Ok(ExportPayload {
        content,
        mime_type: mime_type(format),
        extension: format.extension(),
        filename: format!("{file_stem}.{}", format.extension()),
    })
}

fn to_csv(table: &Table) -> Result<String> {
    let columns = table.columns();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.column_names())?;
    for row in 0..table.height() {
        writer.write_record(
            columns
                .iter()
                .map(|column| column.values().get(row).map(Value::to_string).unwrap_or_default()),
        )?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| NodeflowError::Other(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| NodeflowError::Other(format!("CSV is not UTF-8: {e}")))
}

fn to_xml(table: &Table) -> Result<String> {
    let tags: Vec<String> = table.column_names().into_iter().map(xml_tag).collect();
    let columns = table.columns();
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("data")))?;
    for row in 0..table.height() {
        writer.write_event(Event::Start(BytesStart::new("row")))?;
        for (tag, column) in tags.iter().zip(&columns) {
            let text = column.values().get(row).map(Value::to_string).unwrap_or_default();
            writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("data")))?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| NodeflowError::Other(format!("XML is not UTF-8: {e}")))
}

fn xml_tag(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '-' | '(' | ')' | '/' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::Column;

    fn sample() -> Table {
        Table::new(vec![
            Column::new("Full Name", vec![Value::text("Ada & Co"), Value::text("Bo")]),
            Column::new("pay (usd)", vec![Value::Int(10), Value::Missing]),
        ])
        .expect("valid table")
    }

    #[test]
    fn test_csv_export() -> Result<()> {
        let payload = export_table(&sample(), "csv", "people")?;
        assert_eq!(payload.content, "Full Name,pay (usd)\nAda & Co,10\nBo,\n");
        assert_eq!(payload.mime_type, "text/csv;charset=utf-8;");
        assert_eq!(payload.filename, "people.csv");
        Ok(())
    }

    #[test]
    fn test_xml_export_sanitizes_tags_and_escapes() -> Result<()> {
        let payload = export_table(&sample(), "XML", "people")?;
        assert!(payload.content.starts_with("<?xml"));
        assert!(payload.content.contains("<Full_Name>Ada &amp; Co</Full_Name>"));
        assert!(payload.content.contains("<pay__usd_></pay__usd_>"));
        assert!(payload.content.contains("<Full_Name>Bo</Full_Name>"));
        assert_eq!(payload.content.matches("<row>").count(), 2);
        assert_eq!(payload.extension, "xml");
        Ok(())
    }

    #[test]
    fn test_json_export_is_record_list() -> Result<()> {
        let payload = export_table(&sample(), "json", "people")?;
        let parsed: serde_json::Value = serde_json::from_str(&payload.content)?;
        assert_eq!(parsed[1]["pay (usd)"], serde_json::Value::Null);
        assert_eq!(parsed[0]["Full Name"], "Ada & Co");
        Ok(())
    }

    #[test]
    fn test_unknown_format() {
        let err = export_table(&sample(), "parquet", "x").expect_err("unsupported");
        assert!(matches!(err, NodeflowError::UnsupportedFormat(f) if f == "parquet"));
    }
}
