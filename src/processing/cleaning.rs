use super::classify::{DEFAULT_DETECTION_THRESHOLD, classify_with_threshold};
use super::transforms::mode_expr;
use super::types::{ColumnKind, Shape, Table, Value, ValueKey, literal};
use crate::error::Result;
use polars::prelude::{DataType, UniqueKeepStrategy, col, lit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_ALPHANUMERIC_OR_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9 ]").expect("pattern is valid"));

/// Tunables for [`clean`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleaningOptions {
    /// Categorical columns with at most this many distinct values are one-hot encoded;
    /// above it they are label encoded.
    pub one_hot_threshold: usize,
    pub detection_threshold: f64,
    /// Fill value for categorical columns that have no mode.
    pub unknown_label: String,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            one_hot_threshold: 10,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            unknown_label: "Unknown".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CleaningReport {
    pub original_shape: Shape,
    pub final_shape: Shape,
    pub processing_steps: Vec<String>,
    pub columns_processed: usize,
    pub duplicates_removed: usize,
    pub encoding_methods: Vec<String>,
}

/// Runs the full cleaning pass and returns the cleaned table with its report.
///
/// Stages, in order: type detection, per-type imputation, text normalisation,
/// de-duplication, categorical encoding and z-score scaling. Every stage only looks at
/// the column's own statistics.
pub fn clean(table: &Table, options: &CleaningOptions) -> Result<(Table, CleaningReport)> {
    let original_shape = table.shape();
    let mut steps = vec![format!(
        "Loaded data with shape: ({}, {})",
        original_shape.0, original_shape.1
    )];

    // 1. Detection
    let columns = table.columns();
    let kinds: Vec<(String, ColumnKind)> = columns
        .iter()
        .map(|c| {
            (
                c.name().to_owned(),
                classify_with_threshold(c, options.detection_threshold),
            )
        })
        .collect();
    for (column, (name, kind)) in columns.iter().zip(&kinds) {
        tracing::debug!(
            column = %name,
            kind = %kind,
            missing = column.missing_count(),
            "Detected column type"
        );
    }
    steps.push(format!("Analyzed {} columns", kinds.len()));

    // 2. Imputation
    let mut cleaned = table.clone();
    for (name, kind) in &kinds {
        cleaned = impute_column(&cleaned, name, *kind, options, &mut steps)?;
    }

    // 3. Text normalisation
    for (name, kind) in &kinds {
        if *kind == ColumnKind::Categorical
            && let Some(column) = cleaned.column(name)
        {
            let values = column.values().iter().map(normalize_text).collect();
            cleaned = cleaned.with_column(name, values)?;
        }
    }
    steps.push("Normalized all text columns".to_owned());

    // 4. De-duplication
    let before = cleaned.height();
    cleaned = drop_duplicate_rows(&cleaned)?;
    let duplicates_removed = before - cleaned.height();
    steps.push(format!("Removed {duplicates_removed} duplicate rows"));

    // 5. Encoding
    let mut encoding_methods = Vec::new();
    for (name, kind) in &kinds {
        if *kind != ColumnKind::Categorical {
            continue;
        }
        let (encoded, description) = encode_categorical(&cleaned, name, options)?;
        cleaned = encoded;
        encoding_methods.extend(description);
    }
    if !encoding_methods.is_empty() {
        steps.push(format!("Encoding applied: {}", encoding_methods.join(", ")));
    }

    // 6. Scaling
    cleaned = scale_numeric_columns(&cleaned)?;
    steps.push("Scaled all numerical columns".to_owned());

    let report = CleaningReport {
        original_shape,
        final_shape: cleaned.shape(),
        processing_steps: steps,
        columns_processed: cleaned.width(),
        duplicates_removed,
        encoding_methods,
    };
    tracing::info!(
        original = ?report.original_shape,
        cleaned = ?report.final_shape,
        "Cleaning finished"
    );
    Ok((cleaned, report))
}

fn impute_column(
    table: &Table,
    name: &str,
    kind: ColumnKind,
    options: &CleaningOptions,
    steps: &mut Vec<String>,
) -> Result<Table> {
    if !table.has_column(name) {
        return Ok(table.clone());
    }

    match kind {
        ColumnKind::Integer | ColumnKind::Float => {
            let numbers = col(name).cast(DataType::Float64);
            let Some(fill) = table.scalar(numbers.clone().mean())?.as_number() else {
                return Ok(table.clone());
            };
            steps.push(format!(
                "Filled missing values in {name} with mean: {fill:.2}"
            ));
            table.query(|lf| lf.with_column(numbers.fill_null(lit(fill)).alias(name)))
        }
        ColumnKind::Categorical => {
            let fill = match table.scalar(mode_expr(name))? {
                Value::Missing => {
                    steps.push(format!(
                        "Filled missing values in {name} with '{}'",
                        options.unknown_label
                    ));
                    Value::text(options.unknown_label.clone())
                }
                value => {
                    steps.push(format!("Filled missing values in {name} with mode: {value}"));
                    value
                }
            };
            fill_nulls(table, name, &fill)
        }
        ColumnKind::Boolean => {
            let fill = match table.scalar(mode_expr(name))? {
                Value::Missing => {
                    steps.push(format!("Filled missing values in {name} with True"));
                    Value::Bool(true)
                }
                value => {
                    steps.push(format!("Filled missing values in {name} with mode: {value}"));
                    value
                }
            };
            fill_nulls(table, name, &fill)
        }
        ColumnKind::Datetime => {
            let parsed: Vec<Value> = table
                .require_column(name)?
                .values()
                .iter()
                .map(|v| v.as_datetime().map_or(Value::Missing, Value::DateTime))
                .collect();
            let had_missing = parsed.iter().any(Value::is_missing);
            let mask: Vec<bool> = parsed.iter().map(|v| !v.is_missing()).collect();
            let parsed = table.with_column(name, parsed)?;
            match parsed.scalar(mode_expr(name))? {
                Value::Missing => {
                    steps.push(format!("Removed rows with missing dates in {name}"));
                    parsed.filter_rows(&mask)
                }
                fill => {
                    if had_missing {
                        steps.push(format!(
                            "Filled missing values in {name} with most frequent date"
                        ));
                    }
                    fill_nulls(&parsed, name, &fill)
                }
            }
        }
    }
}

fn fill_nulls(table: &Table, name: &str, fill: &Value) -> Result<Table> {
    table.query(|lf| lf.with_column(col(name).fill_null(literal(fill)).alias(name)))
}

fn normalize_text(value: &Value) -> Value {
    if value.is_missing() {
        return Value::Missing;
    }
    let rendered = value.to_string();
    Value::Text(
        NON_ALPHANUMERIC_OR_SPACE
            .replace_all(&rendered, "")
            .to_lowercase(),
    )
}

/// Keeps the first occurrence of every distinct row.
fn drop_duplicate_rows(table: &Table) -> Result<Table> {
    table.query(|lf| lf.unique_stable(None, UniqueKeepStrategy::First))
}

fn encode_categorical(
    table: &Table,
    name: &str,
    options: &CleaningOptions,
) -> Result<(Table, Option<String>)> {
    let Some(column) = table.column(name) else {
        return Ok((table.clone(), None));
    };

    let mut categories: Vec<Value> = Vec::new();
    let mut seen = HashSet::new();
    for value in column.non_missing() {
        if seen.insert(value.key()) {
            categories.push(value.clone());
        }
    }
    categories.sort_by_key(Value::key);
    let unique = categories.len();

    if unique <= options.one_hot_threshold {
        let source: Vec<ValueKey> = column.values().iter().map(Value::key).collect();
        let mut encoded = table.without_column(name);
        for category in &categories {
            let indicator_name = encoded.unique_name(&format!("{name}_{category}"));
            let key = category.key();
            let indicator = source.iter().map(|k| Value::Bool(*k == key)).collect();
            encoded = encoded.with_column(&indicator_name, indicator)?;
        }
        Ok((
            encoded,
            Some(format!("One-hot encoded {name} ({unique} categories)")),
        ))
    } else {
        let codes = column
            .values()
            .iter()
            .map(|v| {
                if v.is_missing() {
                    return Value::Missing;
                }
                let key = v.key();
                categories
                    .binary_search_by(|c| c.key().cmp(&key))
                    .map_or(Value::Missing, |code| Value::Int(code as i64))
            })
            .collect();
        Ok((
            table.with_column(name, codes)?,
            Some(format!("Label encoded {name} ({unique} categories)")),
        ))
    }
}

/// Z-scores every numeric column without gaps; constant columns become zero.
fn scale_numeric_columns(table: &Table) -> Result<Table> {
    if table.height() == 0 {
        return Ok(table.clone());
    }
    let mut scaled = Vec::new();
    for column in table.frame().get_columns() {
        if !column.dtype().is_primitive_numeric() || column.null_count() > 0 {
            continue;
        }
        let name = column.name().as_str();
        let x = col(name).cast(DataType::Float64);
        let std = table
            .scalar(x.clone().std(1))?
            .as_number()
            .filter(|s| *s != 0.0 && s.is_finite());
        let expr = match std {
            Some(std) => (x.clone() - x.mean()) / lit(std),
            None => lit(0.0),
        };
        scaled.push(expr.alias(name));
    }
    if scaled.is_empty() {
        return Ok(table.clone());
    }
    table.query(|lf| lf.with_columns(scaled))
}
