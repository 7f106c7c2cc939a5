use crate::error::{NodeflowError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::{IndexMap, IndexSet};
use polars::prelude::{
    AnyValue, BooleanChunked, Column as FrameColumn, DataFrame, DataType, Expr, Int64Chunked,
    IntoLazy as _, IntoSeries as _, LazyFrame, NULL, NamedFrom as _, NewChunkedArray as _,
    PlSmallStr, Series, TimeUnit, lit,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One row of a table: ordered column name → scalar value.
pub type Record = IndexMap<String, Value>;

/// `(rows, columns)`
pub type Shape = (usize, usize);

/// Strings treated as missing when inferring scalars from text payloads.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "#N/A", "<NA>",
];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Datetime,
    Categorical,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Datetime => "datetime",
            Self::Categorical => "categorical",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Float constructor that maps NaN to [`Value::Missing`].
    pub fn float(x: f64) -> Self {
        if x.is_nan() {
            Self::Missing
        } else {
            Self::Float(x)
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Integral floats become `Int`, everything else `Float`.
    pub fn from_number(x: f64) -> Self {
        if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 {
            Self::Int(x as i64)
        } else {
            Self::float(x)
        }
    }

    /// Infers a scalar from raw text the way delimited files are read: missing markers,
    /// integers, floats and booleans are recognised, everything else stays text.
    pub fn infer(raw: &str) -> Self {
        if MISSING_MARKERS.contains(&raw) {
            return Self::Missing;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>()
            && f.is_finite()
        {
            return Self::Float(f);
        }
        match raw {
            "true" | "True" | "TRUE" => Self::Bool(true),
            "false" | "False" | "FALSE" => Self::Bool(false),
            _ => Self::Text(raw.to_owned()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Strict numeric view: only `Int` and `Float`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Lenient numeric view: numbers, plus text whose trimmed form is a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            other => other.as_number(),
        }
    }

    /// Numeric coercion: text that parses becomes a number, booleans become 0/1,
    /// anything else becomes missing.
    pub fn to_numeric(&self) -> Self {
        match self {
            Self::Int(_) | Self::Float(_) => self.clone(),
            Self::Bool(b) => Self::Int(i64::from(*b)),
            Self::Text(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Self::Int(i)
                } else {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map_or(Self::Missing, Self::Float)
                }
            }
            Self::Missing | Self::DateTime(_) => Self::Missing,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Total ordering / hashing key.
    pub fn key(&self) -> ValueKey {
        match self {
            Self::Missing => ValueKey::Missing,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int(_) | Self::Float(_) => {
                ValueKey::Number(NumberKey::new(self.as_number().unwrap_or_default()))
            }
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::DateTime(dt) => ValueKey::DateTime(*dt),
        }
    }

    /// Comparison used by filters: numbers numerically, text lexicographically, datetimes
    /// chronologically (text operands are parsed as dates). `None` when incomparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Missing, _) | (_, Self::Missing) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), b) => b.as_datetime().map(|b| a.cmp(&b)),
            (a, Self::DateTime(b)) => a.as_datetime().map(|a| a.cmp(b)),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Text(s) => f.write_str(s),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Floats keep a trailing `.0` when integral so they stay distinguishable from integers.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    // too short to hold a full date
    if s.len() < 8 || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
    {
        return Some(dt);
    }
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::float))
                .unwrap_or_default(),
            serde_json::Value::String(s) => Self::Text(s),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Text(other.to_string())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Missing => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x).map_or(Self::Null, Self::Number),
            Value::Text(s) => Self::String(s.clone()),
            Value::DateTime(dt) => Self::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serde_json::Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

/// Float wrapper with total equality so numbers can be grouped and hashed.
#[derive(Clone, Copy, Debug)]
pub struct NumberKey(f64);

impl NumberKey {
    fn new(x: f64) -> Self {
        // folds -0.0 into 0.0
        Self(x + 0.0)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for NumberKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Orders booleans < numbers < datetimes < text < missing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Bool(bool),
    Number(NumberKey),
    DateTime(NaiveDateTime),
    Text(String),
    Missing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    pub fn non_missing(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().filter(|v| !v.is_missing())
    }
}

/// Builds a typed series from cells. Homogeneous cells keep their type (integers and
/// floats together become floats); anything else is stored as text.
fn to_series(name: &str, values: &[Value]) -> Series {
    let name = PlSmallStr::from(name);
    let mut present = values.iter().filter(|v| !v.is_missing()).peekable();
    if present.peek().is_none() {
        return Series::new(name, vec![None::<String>; values.len()]);
    }
    let present: Vec<&Value> = present.collect();

    if present.iter().all(|v| matches!(v, Value::Bool(_))) {
        let cells: Vec<Option<bool>> = values
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Series::new(name, cells)
    } else if present.iter().all(|v| matches!(v, Value::Int(_))) {
        let cells: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        Series::new(name, cells)
    } else if present.iter().all(|v| v.as_number().is_some()) {
        let cells: Vec<Option<f64>> = values.iter().map(Value::as_number).collect();
        Series::new(name, cells)
    } else if present.iter().all(|v| matches!(v, Value::DateTime(_))) {
        let millis: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
                _ => None,
            })
            .collect();
        Int64Chunked::new(name, &millis)
            .into_datetime(TimeUnit::Milliseconds, None)
            .into_series()
    } else {
        let cells: Vec<Option<String>> = values
            .iter()
            .map(|v| (!v.is_missing()).then(|| v.to_string()))
            .collect();
        Series::new(name, cells)
    }
}

fn datetime_from(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
    };
    dt.map(|dt| dt.naive_utc())
}

/// Reads one polars cell back into a [`Value`].
fn cell(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Missing,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int32(i) => Value::Int(i64::from(i)),
        AnyValue::Int64(i) => Value::Int(i),
        AnyValue::UInt32(u) => Value::Int(i64::from(u)),
        AnyValue::UInt64(u) => i64::try_from(u).map_or(Value::float(u as f64), Value::Int),
        AnyValue::Float32(x) => Value::float(f64::from(x)),
        AnyValue::Float64(x) => Value::float(x),
        AnyValue::String(s) => Value::text(s),
        AnyValue::StringOwned(s) => Value::text(s.as_str()),
        AnyValue::Datetime(v, unit, _) => {
            datetime_from(v, unit).map_or(Value::Missing, Value::DateTime)
        }
        // days since the unix epoch
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + 719_163)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(Value::Missing, Value::DateTime),
        other => Value::Text(other.to_string()),
    }
}

fn materialize(column: &FrameColumn) -> Column {
    let values = (0..column.len())
        .map(|row| column.get(row).map_or(Value::Missing, cell))
        .collect();
    Column::new(column.name().as_str(), values)
}

/// Polars literal for a cell.
pub(crate) fn literal(value: &Value) -> Expr {
    match value {
        Value::Missing => lit(NULL),
        Value::Bool(b) => lit(*b),
        Value::Int(i) => lit(*i),
        Value::Float(x) => lit(*x),
        Value::Text(s) => lit(s.clone()),
        Value::DateTime(dt) => lit(dt.and_utc().timestamp_millis())
            .cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
    }
}

/// Immutable table backed by a polars [`DataFrame`]. Operations never mutate a table;
/// they build a new one.
#[derive(Clone, Debug, Default)]
pub struct Table {
    frame: DataFrame,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.column_names() == other.column_names() && self.columns() == other.columns()
    }
}

impl Table {
    /// Builds a table from columns, validating unique names and uniform length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let height = columns.first().map_or(0, Column::len);
        let mut seen = IndexSet::new();
        for column in &columns {
            if !seen.insert(column.name()) {
                return Err(NodeflowError::InputFormat(format!(
                    "duplicate column name '{}'",
                    column.name()
                )));
            }
            if column.len() != height {
                return Err(NodeflowError::InputFormat(format!(
                    "column '{}' has {} rows, expected {height}",
                    column.name(),
                    column.len()
                )));
            }
        }
        let series = columns
            .iter()
            .map(|c| FrameColumn::from(to_series(c.name(), c.values())))
            .collect();
        Ok(Self::from_frame(DataFrame::new(series)?))
    }

    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Union of keys in first-seen order; absent keys become missing.
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let mut names: IndexSet<&str> = IndexSet::new();
        for record in records {
            names.extend(record.keys().map(String::as_str));
        }
        let columns = names
            .iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(*name).cloned().unwrap_or_default())
                    .collect();
                Column::new(*name, values)
            })
            .collect();
        Self::new(columns)
    }

    /// Accepts an array of objects (rows) or an object of equal-length arrays (columns).
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(rows) => {
                let records = rows
                    .iter()
                    .map(|row| match row {
                        serde_json::Value::Object(map) => Ok(map
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                            .collect::<Record>()),
                        other => Err(NodeflowError::InputFormat(format!(
                            "expected an object per row, found {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::from_records(&records)
            }
            serde_json::Value::Object(map) => {
                let columns = map
                    .iter()
                    .map(|(name, values)| match values {
                        serde_json::Value::Array(items) => Ok(Column::new(
                            name.clone(),
                            items.iter().cloned().map(Value::from).collect(),
                        )),
                        _ => Err(NodeflowError::InputFormat(format!(
                            "column '{name}' is not an array"
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::new(columns)
            }
            _ => Err(NodeflowError::InputFormat(
                "expected a list of records or an object of columns".to_owned(),
            )),
        }
    }

    pub fn to_records(&self) -> Vec<Record> {
        let columns = self.columns();
        (0..self.height())
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values.get(row).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn shape(&self) -> Shape {
        self.frame.shape()
    }

    /// Every column read back into cells.
    pub fn columns(&self) -> Vec<Column> {
        self.frame.get_columns().iter().map(materialize).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(PlSmallStr::as_str)
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.frame.column(name).ok().map(materialize)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn dtype(&self, name: &str) -> Option<&DataType> {
        self.frame.column(name).ok().map(FrameColumn::dtype)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.frame.get_column_index(name)
    }

    pub fn require_column(&self, name: &str) -> Result<Column> {
        self.column(name)
            .ok_or_else(|| NodeflowError::column_not_found(name, self.column_names()))
    }

    /// Fails with the first name that is not a column.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        match names.iter().find(|n| !self.has_column(n.as_ref())) {
            Some(missing) => Err(NodeflowError::column_not_found(
                missing.as_ref(),
                self.column_names(),
            )),
            None => Ok(()),
        }
    }

    pub fn value(&self, row: usize, column: usize) -> Option<Value> {
        self.frame.get_columns().get(column)?.get(row).ok().map(cell)
    }

    /// Keeps the rows whose mask entry is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        Ok(Self::from_frame(self.frame.filter(&mask)?))
    }

    /// Runs a lazy query over the table and collects the result.
    pub fn query(&self, build: impl FnOnce(LazyFrame) -> LazyFrame) -> Result<Self> {
        Ok(Self::from_frame(build(self.frame.clone().lazy()).collect()?))
    }

    /// Evaluates an expression that reduces to one value.
    pub fn scalar(&self, expr: Expr) -> Result<Value> {
        let out = self.frame.clone().lazy().select([expr.alias("value")]).collect()?;
        Ok(out
            .get_columns()
            .first()
            .and_then(|c| c.get(0).ok())
            .map_or(Value::Missing, cell))
    }

    /// Replaces a column's values in place, or appends a new column.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Self> {
        if values.len() != self.height() && self.width() > 0 {
            return Err(NodeflowError::InputFormat(format!(
                "column '{name}' has {} rows, expected {}",
                values.len(),
                self.height()
            )));
        }
        let series = to_series(name, &values);
        let mut frame = self.frame.clone();
        if self.has_column(name) {
            frame.replace(name, series)?;
        } else {
            frame.with_column(series)?;
        }
        Ok(Self::from_frame(frame))
    }

    pub fn without_column(&self, name: &str) -> Self {
        self.frame
            .drop(name)
            .map_or_else(|_| self.clone(), Self::from_frame)
    }

    /// No-op when `from` is absent or `to` already names another column.
    pub fn renamed(&self, from: &str, to: &str) -> Self {
        if from == to || !self.has_column(from) || self.has_column(to) {
            return self.clone();
        }
        let mut frame = self.frame.clone();
        if frame.rename(from, to.into()).is_err() {
            return self.clone();
        }
        Self::from_frame(frame)
    }

    /// Returns `base` or `base_1`, `base_2`... whichever is not a column yet.
    pub fn unique_name(&self, base: &str) -> String {
        if !self.has_column(base) {
            return base.to_owned();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.has_column(candidate))
            .unwrap_or_else(|| base.to_owned())
    }
}
