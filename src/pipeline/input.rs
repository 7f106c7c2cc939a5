//! Input node payload extraction.

use super::graph::Node;
use crate::processing::io::{PayloadFormat, read_records};
use crate::processing::types::{Record, Value};
use serde_json::Value as JsonValue;

/// Turns an input node into the records it carries.
pub trait InputLoader {
    /// Never fails: a payload that cannot be read yields no records.
    fn extract(&self, node: &Node) -> Vec<Record>;
}

/// Reads `data.previewData` (a non-empty list of row objects) or, failing that,
/// `data.file = {filename, fileContent, fileFormat?}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadLoader;

impl InputLoader for PayloadLoader {
    fn extract(&self, node: &Node) -> Vec<Record> {
        if let Some(JsonValue::Array(rows)) = node.data.get("previewData")
            && !rows.is_empty()
        {
            return rows
                .iter()
                .filter_map(|row| match row {
                    JsonValue::Object(map) => Some(
                        map.iter()
                            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                            .collect(),
                    ),
                    _ => None,
                })
                .collect();
        }

        let Some(JsonValue::Object(file)) = node.data.get("file") else {
            tracing::warn!(node = %node.id, "Input node carries no data");
            return Vec::new();
        };
        let Some(content) = file.get("fileContent").and_then(JsonValue::as_str) else {
            tracing::warn!(node = %node.id, "Input file has no content");
            return Vec::new();
        };
        let format = file
            .get("fileFormat")
            .and_then(JsonValue::as_str)
            .and_then(PayloadFormat::parse)
            .unwrap_or_else(|| {
                file.get("filename")
                    .and_then(JsonValue::as_str)
                    .map(PayloadFormat::from_file_name)
                    .unwrap_or_default()
            });
        read_records(content, format)
    }
}
