//! Column type detection.
//!
//! Detection runs in a fixed priority order over the non-missing values of a column:
//! boolean, then datetime, then numeric (integer or float), then categorical. The order
//! matters: a column that parses both as dates and as numbers above the threshold is a
//! datetime column.

use super::types::{Column, ColumnKind, Table, Value};
use serde::Serialize;

/// Fraction of values that must parse before a column counts as datetime or numeric.
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 0.9;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
}

pub fn classify(column: &Column) -> ColumnKind {
    classify_with_threshold(column, DEFAULT_DETECTION_THRESHOLD)
}

pub fn classify_with_threshold(column: &Column, threshold: f64) -> ColumnKind {
    let present: Vec<&Value> = column.non_missing().collect();
    if present.is_empty() {
        return ColumnKind::Categorical;
    }

    if present.iter().all(|v| matches!(v, Value::Bool(_))) {
        return ColumnKind::Boolean;
    }

    let total = present.len() as f64;
    let dates = present.iter().filter(|v| v.as_datetime().is_some()).count();
    if dates as f64 / total > threshold {
        return ColumnKind::Datetime;
    }

    let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
    if numbers.len() as f64 / total > threshold {
        return if numbers.iter().all(|x| x.fract() == 0.0) {
            ColumnKind::Integer
        } else {
            ColumnKind::Float
        };
    }

    ColumnKind::Categorical
}

/// Detected kind and missing count for every column, in column order.
pub fn profile(table: &Table, threshold: f64) -> Vec<ColumnProfile> {
    table
        .columns()
        .iter()
        .map(|column| ColumnProfile {
            name: column.name().to_owned(),
            kind: classify_with_threshold(column, threshold),
            missing: column.missing_count(),
        })
        .collect()
}
