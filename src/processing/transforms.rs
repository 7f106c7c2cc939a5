//! Stateless table operations used by the dispatcher.
//!
//! Every function takes a table plus typed parameters and returns a new table. Structural
//! operations (filter, normalize, aggregate, sort) fail on unknown columns; the
//! single-column text operations silently return the input unchanged when the column is
//! absent.

use super::types::{Table, Value, literal};
use crate::error::{NodeflowError, Result};
use polars::prelude::{
    DataType, Expr, FillNullStrategy, NULL, PlSmallStr, SortMultipleOptions, SortOptions, UniqueKeepStrategy,
    col, lit, when,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)").expect("pattern is valid"));
static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("pattern is valid"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    /// `=` is accepted as equality.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    /// Missing or incomparable operands only satisfy `!=`.
    pub fn matches(&self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::Ne, ord) => ord != Some(Ordering::Equal),
            (_, None) => false,
            (Self::Gt, Some(ord)) => ord.is_gt(),
            (Self::Ge, Some(ord)) => ord.is_ge(),
            (Self::Lt, Some(ord)) => ord.is_lt(),
            (Self::Le, Some(ord)) => ord.is_le(),
            (Self::Eq, Some(ord)) => ord.is_eq(),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    Drop,
    Fill,
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizeMethod {
    MinMax,
    ZScore,
    UnitVector,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Nunique,
    First,
    Last,
    Std,
}

impl AggFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Nunique => "nunique",
            Self::First => "first",
            Self::Last => "last",
            Self::Std => "std",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Aggregation {
    pub column: String,
    pub function: AggFn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertTarget {
    Numeric,
    String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFill {
    Value(Value),
    Mean,
    Median,
    Mode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextOp {
    Upper,
    Lower,
    Trim,
    ExtractNumbers,
    ExtractStrings,
    RemoveSpecialChars,
}

// ---------------------------------------------------------------------------
// Structural operations
// ---------------------------------------------------------------------------

/// Keeps rows where `column <op> value`.
///
/// A numeric `value` coerces the column to numbers first (unparseable cells become
/// missing) and the coerced column is what the result carries, so filtering twice gives
/// the same table.
pub fn filter(table: &Table, column: &str, op: CompareOp, value: &Value) -> Result<Table> {
    let source = table.require_column(column)?;
    let coerced: Vec<Value> = if value.as_number().is_some() {
        source.values().iter().map(Value::to_numeric).collect()
    } else {
        source.into_values()
    };

    let mask: Vec<bool> = coerced
        .iter()
        .map(|cell| op.matches(cell.compare(value)))
        .collect();

    let filtered = table.with_column(column, coerced)?.filter_rows(&mask)?;
    tracing::debug!(
        column,
        op = %op,
        before = table.height(),
        after = filtered.height(),
        "Applied filter"
    );
    Ok(filtered)
}

pub fn fill_missing(table: &Table, strategy: FillStrategy, fill_value: Option<&Value>) -> Result<Table> {
    match strategy {
        FillStrategy::Drop => Ok(Table::from_frame(table.frame().drop_nulls::<String>(None)?)),
        FillStrategy::Fill => {
            let fills: Vec<Expr> = table
                .frame()
                .get_columns()
                .iter()
                .filter(|c| c.null_count() > 0)
                .map(|c| {
                    let name = c.name().as_str();
                    let fill = match fill_value {
                        Some(value) => literal(value),
                        None => default_fill(name, c.dtype()),
                    };
                    col(name).fill_null(fill).alias(name)
                })
                .collect();
            if fills.is_empty() {
                return Ok(table.clone());
            }
            table.query(|lf| lf.with_columns(fills))
        }
        FillStrategy::Forward => Ok(Table::from_frame(
            table.frame().fill_null(FillNullStrategy::Forward(None))?,
        )),
        FillStrategy::Backward => Ok(Table::from_frame(
            table.frame().fill_null(FillNullStrategy::Backward(None))?,
        )),
    }
}

/// Most frequent non-missing value, smallest first on ties.
pub(crate) fn mode_expr(name: &str) -> Expr {
    col(name)
        .drop_nulls()
        .mode()
        .sort(SortOptions::default())
        .first()
}

/// Mean for numeric columns, otherwise the mode, otherwise "Unknown".
fn default_fill(name: &str, dtype: &DataType) -> Expr {
    if dtype.is_primitive_numeric() {
        col(name).mean()
    } else {
        mode_expr(name).fill_null(lit("Unknown"))
    }
}

/// Keeps the first occurrence of each distinct row. Unknown subset columns are ignored;
/// an empty subset compares whole rows.
pub fn remove_duplicates(table: &Table, subset: Option<&[String]>) -> Result<Table> {
    let subset: Vec<PlSmallStr> = subset
        .unwrap_or_default()
        .iter()
        .filter(|name| table.has_column(name))
        .map(|name| PlSmallStr::from(name.as_str()))
        .collect();
    let subset = (!subset.is_empty()).then_some(subset);
    let deduplicated = table.query(|lf| lf.unique_stable(subset, UniqueKeepStrategy::First))?;
    tracing::debug!(
        before = table.height(),
        after = deduplicated.height(),
        "Removed duplicate rows"
    );
    Ok(deduplicated)
}

pub fn normalize(table: &Table, column: &str, method: NormalizeMethod) -> Result<Table> {
    let source = table.require_column(column)?;
    let coerced: Vec<Value> = source.values().iter().map(Value::to_numeric).collect();
    let had_values = source.non_missing().next().is_some();
    if had_values && coerced.iter().all(Value::is_missing) {
        return Err(NodeflowError::TypeCoercion {
            column: column.to_owned(),
            target: "numeric".to_owned(),
        });
    }
    let coerced = table.with_column(column, coerced)?;

    let x = || col(column).cast(DataType::Float64);
    let scale = |expr: Expr| coerced.scalar(expr).map(|v| v.as_number());
    let rescaled = match method {
        NormalizeMethod::MinMax => {
            let (min, max) = (scale(x().min())?, scale(x().max())?);
            match (min, max) {
                (Some(min), Some(max)) if max - min != 0.0 && (max - min).is_finite() => {
                    Some((x() - lit(min)) / lit(max - min))
                }
                _ => None,
            }
        }
        NormalizeMethod::ZScore => match (scale(x().mean())?, scale(x().std(1))?) {
            (Some(mean), Some(std)) if std != 0.0 && std.is_finite() => {
                Some((x() - lit(mean)) / lit(std))
            }
            _ => None,
        },
        NormalizeMethod::UnitVector => match scale((x() * x()).sum())?.map(f64::sqrt) {
            Some(norm) if norm != 0.0 && norm.is_finite() => Some(x() / lit(norm)),
            _ => None,
        },
    };

    match rescaled {
        Some(expr) => coerced.query(|lf| lf.with_column(expr.alias(column))),
        None => Ok(coerced),
    }
}

fn aggregate_expr(table: &Table, aggregation: &Aggregation) -> Expr {
    let source = col(aggregation.column.as_str());
    let numeric = || source.clone().cast(DataType::Float64);
    match aggregation.function {
        AggFn::Sum => {
            if table.dtype(&aggregation.column).is_some_and(DataType::is_integer) {
                source.sum()
            } else {
                numeric().sum()
            }
        }
        AggFn::Mean => numeric().mean(),
        AggFn::Median => numeric().median(),
        AggFn::Std => numeric().std(1),
        AggFn::Min => source.min(),
        AggFn::Max => source.max(),
        AggFn::Count => source.count().cast(DataType::Int64),
        AggFn::Nunique => source.drop_nulls().n_unique().cast(DataType::Int64),
        AggFn::First => source.drop_nulls().first(),
        AggFn::Last => source.drop_nulls().last(),
    }
}

/// Groups by the key columns (rows with a missing key are dropped, groups come out in
/// key order) and reduces each aggregated column.
pub fn aggregate(table: &Table, group_columns: &[String], aggregations: &[Aggregation]) -> Result<Table> {
    table.require_columns(group_columns)?;
    let agg_columns: Vec<&str> = aggregations.iter().map(|a| a.column.as_str()).collect();
    table.require_columns(&agg_columns)?;

    let keys: Vec<Expr> = group_columns.iter().map(|name| col(name.as_str())).collect();
    let mut names: Vec<String> = group_columns.to_vec();
    let mut exprs = Vec::with_capacity(aggregations.len());
    for aggregation in aggregations {
        let name = if names.contains(&aggregation.column) {
            format!("{}_{}", aggregation.column, aggregation.function.as_str())
        } else {
            aggregation.column.clone()
        };
        exprs.push(aggregate_expr(table, aggregation).alias(name.as_str()));
        names.push(name);
    }
    let present = keys
        .iter()
        .cloned()
        .map(Expr::is_not_null)
        .reduce(|all, next| all.and(next))
        .unwrap_or_else(|| lit(true));

    table.query(|lf| {
        lf.filter(present)
            .group_by(keys.clone())
            .agg(exprs)
            .sort_by_exprs(keys, SortMultipleOptions::default())
    })
}

/// Stable multi-key sort with missing values last in either direction. When the number
/// of flags does not match the number of columns every key sorts ascending.
pub fn sort(table: &Table, columns: &[String], ascending: &[bool]) -> Result<Table> {
    table.require_columns(columns)?;
    if columns.is_empty() {
        return Ok(table.clone());
    }
    let descending: Vec<bool> = if ascending.len() == columns.len() {
        ascending.iter().map(|asc| !asc).collect()
    } else {
        vec![false; columns.len()]
    };
    let options = SortMultipleOptions::default()
        .with_order_descending_multi(descending)
        .with_nulls_last(true)
        .with_maintain_order(true);
    Ok(Table::from_frame(table.frame().sort(columns.to_vec(), options)?))
}

// ---------------------------------------------------------------------------
// Column operations: no-ops when the column is absent
// ---------------------------------------------------------------------------

fn map_column(table: &Table, column: &str, f: impl Fn(&Value) -> Value) -> Result<Table> {
    match table.column(column) {
        Some(source) => table.with_column(column, source.values().iter().map(f).collect()),
        None => {
            tracing::debug!(column, "Column not present, leaving table unchanged");
            Ok(table.clone())
        }
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> Value) -> Value {
    if value.is_missing() {
        Value::Missing
    } else {
        f(&value.to_string())
    }
}

pub fn apply_text_op(table: &Table, column: &str, op: TextOp) -> Result<Table> {
    map_column(table, column, |value| {
        map_text(value, |text| match op {
            TextOp::Upper => Value::text(text.to_uppercase()),
            TextOp::Lower => Value::text(text.to_lowercase()),
            TextOp::Trim => Value::text(text.trim()),
            TextOp::RemoveSpecialChars => Value::text(NON_ALPHANUMERIC.replace_all(text, "")),
            TextOp::ExtractNumbers => NUMBER_PATTERN
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map_or(Value::Missing, |m| Value::text(m.as_str()).to_numeric()),
            TextOp::ExtractStrings => Value::text(NUMBER_PATTERN.replace_all(text, "")),
        })
    })
}

/// Round half to even at `decimals` places after numeric coercion.
pub fn round(table: &Table, column: &str, decimals: u32) -> Result<Table> {
    let factor = 10f64.powi(decimals.min(15) as i32);
    map_column(table, column, |value| match value.to_numeric() {
        Value::Float(x) => Value::float((x * factor).round_ties_even() / factor),
        other => other,
    })
}

pub fn format_numbers(table: &Table, column: &str, decimals: usize) -> Result<Table> {
    map_column(table, column, |value| match value.as_number() {
        Some(x) => Value::text(format!("{x:.decimals$}")),
        None => value.clone(),
    })
}

pub fn convert(table: &Table, column: &str, target: ConvertTarget) -> Result<Table> {
    map_column(table, column, |value| match target {
        ConvertTarget::Numeric => value.to_numeric(),
        ConvertTarget::String => map_text(value, |text| Value::text(text)),
    })
}

pub fn drop_column(table: &Table, column: &str) -> Table {
    table.without_column(column)
}

pub fn rename_column(table: &Table, column: &str, new_name: &str) -> Table {
    table.renamed(column, new_name)
}

/// Fills missing and empty-text cells of one column.
pub fn fill_column(table: &Table, column: &str, fill: &ColumnFill) -> Result<Table> {
    let Some(dtype) = table.dtype(column) else {
        return Ok(table.clone());
    };
    let source = if *dtype == DataType::String {
        when(col(column).eq(lit("")))
            .then(lit(NULL))
            .otherwise(col(column))
    } else {
        col(column)
    };
    let numeric = || source.clone().cast(DataType::Float64);
    let replacement = match fill {
        ColumnFill::Value(value) => literal(value),
        ColumnFill::Mean => numeric().mean(),
        ColumnFill::Median => numeric().median(),
        ColumnFill::Mode => source
            .clone()
            .drop_nulls()
            .mode()
            .sort(SortOptions::default())
            .first(),
    };
    table.query(|lf| lf.with_column(source.clone().fill_null(replacement).alias(column)))
}
