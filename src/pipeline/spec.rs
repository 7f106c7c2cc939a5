//! Operation model.
//!
//! Transform nodes arrive as an operation name plus a loose JSON parameter bag whose keys
//! come in several spellings (`column`, `columnName`, `column_name`...). The bag is
//! resolved exactly once, here, into a typed [`Operation`]; nothing downstream looks at
//! raw parameter keys again.

use crate::error::{NodeflowError, Result};
use crate::processing::transforms::{
    AggFn, Aggregation, ColumnFill, CompareOp, ConvertTarget, FillStrategy, NormalizeMethod,
    TextOp,
};
use crate::processing::types::Value;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;

/// Raw parameters as they appear on a workflow node.
pub type Parameters = Map<String, JsonValue>;

const COLUMN_KEYS: &[&str] = &["column", "columnName", "column_name", "col"];
const OPERATOR_KEYS: &[&str] = &["operator", "condition", "op"];
const VALUE_KEYS: &[&str] = &["value", "targetValue", "target_value"];
const STRATEGY_KEYS: &[&str] = &["strategy"];
const FILL_VALUE_KEYS: &[&str] = &["fill_value", "fillValue"];
const SUBSET_KEYS: &[&str] = &["subset"];
const METHOD_KEYS: &[&str] = &["method"];
const GROUP_KEYS: &[&str] = &["group_columns", "group_by", "groupBy", "groupColumns"];
const AGGREGATION_KEYS: &[&str] = &["aggregations", "agg_dict", "aggDict", "operations"];
const SORT_KEYS: &[&str] = &["columns", "sort_columns"];
const ASCENDING_KEYS: &[&str] = &["ascending", "order"];
const NEW_NAME_KEYS: &[&str] = &["new_name", "newName", "targetValue", "target_value"];
const DECIMALS_KEYS: &[&str] = &["decimals", "decimal_places", "decimalPlaces", "targetValue"];
const TARGET_TYPE_KEYS: &[&str] = &["target_type", "targetType", "to"];
const COLUMN_FILL_KEYS: &[&str] = &["fill_value", "fillValue", "targetValue", "value"];

static CONDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(>=|<=|==|!=|>|<|=)\s*(.+?)\s*$").expect("pattern is valid")
});
static INTEGER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+$").expect("pattern is valid"));
static FLOAT_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").expect("pattern is valid"));

/// Every operation the dispatcher can apply, with its typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Filter {
        column: String,
        operator: CompareOp,
        value: Value,
    },
    FillMissing {
        strategy: FillStrategy,
        fill_value: Option<Value>,
    },
    RemoveDuplicates {
        subset: Option<Vec<String>>,
    },
    Normalize {
        column: String,
        method: NormalizeMethod,
    },
    Aggregate {
        group_columns: Vec<String>,
        aggregations: Vec<Aggregation>,
    },
    Sort {
        columns: Vec<String>,
        ascending: Vec<bool>,
    },
    Text {
        column: String,
        transform: TextOp,
    },
    Round {
        column: String,
        decimals: u32,
    },
    FormatNumbers {
        column: String,
        decimals: usize,
    },
    ConvertType {
        column: String,
        target: ConvertTarget,
    },
    DropColumn {
        column: String,
    },
    RenameColumn {
        column: String,
        new_name: String,
    },
    FillColumn {
        column: String,
        fill: ColumnFill,
    },
}

impl Operation {
    /// Canonical operation name recorded in the transform log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "filter",
            Self::FillMissing { .. } => "fill_missing",
            Self::RemoveDuplicates { .. } => "remove_duplicates",
            Self::Normalize { .. } => "normalize",
            Self::Aggregate { .. } => "aggregate",
            Self::Sort { .. } => "sort",
            Self::Text { transform, .. } => match transform {
                TextOp::Upper => "upper",
                TextOp::Lower => "lower",
                TextOp::Trim => "trim",
                TextOp::ExtractNumbers => "extract_numbers",
                TextOp::ExtractStrings => "extract_strings",
                TextOp::RemoveSpecialChars => "remove_special_chars",
            },
            Self::Round { .. } => "round",
            Self::FormatNumbers { .. } => "format_numbers",
            Self::ConvertType { .. } => "convert_type",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::FillColumn { .. } => "fill_na",
        }
    }

    /// Typed parameters as JSON, without the `op` tag.
    pub fn parameters(&self) -> JsonValue {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(mut map)) => {
                map.shift_remove("op");
                JsonValue::Object(map)
            }
            _ => JsonValue::Object(Map::new()),
        }
    }

    /// Builds an operation from an external name and parameter bag.
    ///
    /// Names are matched case-insensitively with `-`, `_` and spaces treated alike, so
    /// `FILL_NA`, `fill-na` and `fill na` are the same operation.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperator` for unknown names, operators, methods or functions;
    /// `MissingParameter` when no alias of a required parameter is present.
    pub fn from_parameters(name: &str, params: &Parameters) -> Result<Self> {
        let normalized = normalize_name(name);
        let bag = ParamBag {
            operation: normalized.clone(),
            params,
        };

        let operation = match normalized.as_str() {
            "filter" => bag.filter()?,
            "clean_missing" | "fill_missing" => {
                let strategy = match bag.string(STRATEGY_KEYS) {
                    Some(raw) => parse_strategy(&raw)?,
                    None => FillStrategy::Fill,
                };
                Self::FillMissing {
                    strategy,
                    fill_value: bag.value(FILL_VALUE_KEYS),
                }
            }
            "remove_duplicates" | "drop_duplicates" | "deduplicate" => Self::RemoveDuplicates {
                subset: bag
                    .string_list(SUBSET_KEYS)
                    .or_else(|| bag.string(COLUMN_KEYS).map(|c| vec![c])),
            },
            "normalize" | "normalise" => Self::Normalize {
                column: bag.require_string("column", COLUMN_KEYS)?,
                method: match bag.string(METHOD_KEYS) {
                    Some(raw) => parse_normalize_method(&raw)?,
                    None => NormalizeMethod::MinMax,
                },
            },
            "aggregate" | "group_by" | "groupby" => Self::Aggregate {
                group_columns: bag
                    .string_list(GROUP_KEYS)
                    .ok_or_else(|| bag.missing("group_columns"))?,
                aggregations: bag.aggregations()?,
            },
            "sort" => {
                let columns = bag
                    .string_list(SORT_KEYS)
                    .or_else(|| bag.string(COLUMN_KEYS).map(|c| vec![c]))
                    .ok_or_else(|| bag.missing("columns"))?;
                Self::Sort {
                    columns,
                    ascending: bag.ascending_flags(),
                }
            }
            "upper" | "to_upper" | "uppercase" => bag.text(TextOp::Upper)?,
            "lower" | "to_lower" | "lowercase" => bag.text(TextOp::Lower)?,
            "trim" | "strip_whitespace" => bag.text(TextOp::Trim)?,
            "extract_numbers" => bag.text(TextOp::ExtractNumbers)?,
            "extract_strings" => bag.text(TextOp::ExtractStrings)?,
            "remove_special_chars" => bag.text(TextOp::RemoveSpecialChars)?,
            "round" | "round_numbers" => Self::Round {
                column: bag.require_string("column", COLUMN_KEYS)?,
                decimals: bag.unsigned(DECIMALS_KEYS).map_or(0, |d| d.min(15) as u32),
            },
            "format" | "format_numbers" => Self::FormatNumbers {
                column: bag.require_string("column", COLUMN_KEYS)?,
                decimals: bag.unsigned(DECIMALS_KEYS).map_or(2, |d| d.min(15) as usize),
            },
            "convert_to_numeric" => Self::ConvertType {
                column: bag.require_string("column", COLUMN_KEYS)?,
                target: ConvertTarget::Numeric,
            },
            "convert_to_string" => Self::ConvertType {
                column: bag.require_string("column", COLUMN_KEYS)?,
                target: ConvertTarget::String,
            },
            "convert_type" => Self::ConvertType {
                column: bag.require_string("column", COLUMN_KEYS)?,
                target: parse_convert_target(&bag.require_string("target_type", TARGET_TYPE_KEYS)?)?,
            },
            "drop_column" => Self::DropColumn {
                column: bag.require_string("column", COLUMN_KEYS)?,
            },
            "rename_column" => Self::RenameColumn {
                column: bag.require_string("column", COLUMN_KEYS)?,
                new_name: bag.require_string("new_name", NEW_NAME_KEYS)?,
            },
            "fill_na" | "fill_column" => Self::FillColumn {
                column: bag.require_string("column", COLUMN_KEYS)?,
                fill: bag.column_fill()?,
            },
            _ => {
                return Err(NodeflowError::UnsupportedOperator(format!(
                    "unknown operation '{name}'"
                )));
            }
        };
        Ok(operation)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Splits a combined condition such as `">=40000"`, `"> 25"` or `"age > 25"` into an
/// operator and a coerced literal. A single bare token means equality.
///
/// # Errors
///
/// `UnsupportedOperator` when the condition has several tokens but no recognised
/// leading operator.
pub fn parse_condition(condition: &str, column: &str) -> Result<(CompareOp, Value)> {
    let mut rest = condition.trim();
    if let Some(stripped) = rest.strip_prefix(column)
        && stripped.starts_with(|c: char| c.is_whitespace() || "<>=!".contains(c))
    {
        rest = stripped.trim_start();
    }

    if let Some(caps) = CONDITION_PATTERN.captures(rest)
        && let (Some(op), Some(literal)) = (caps.get(1), caps.get(2))
        && let Some(op) = CompareOp::parse(op.as_str())
    {
        return Ok((op, coerce_literal(literal.as_str())));
    }

    if !rest.is_empty() && !rest.contains(char::is_whitespace) && !rest.starts_with(['<', '>', '=', '!']) {
        return Ok((CompareOp::Eq, coerce_literal(rest)));
    }

    Err(NodeflowError::UnsupportedOperator(format!(
        "no recognised operator in condition '{condition}'"
    )))
}

/// Integers and decimals become numbers; surrounding quotes are stripped from text.
pub fn coerce_literal(raw: &str) -> Value {
    let s = raw.trim();
    if INTEGER_LITERAL.is_match(s)
        && let Ok(i) = s.parse::<i64>()
    {
        return Value::Int(i);
    }
    if (INTEGER_LITERAL.is_match(s) || FLOAT_LITERAL.is_match(s))
        && let Ok(f) = s.parse::<f64>()
    {
        return Value::float(f);
    }
    let unquoted = s
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        .unwrap_or(s);
    Value::text(unquoted)
}

fn parse_strategy(raw: &str) -> Result<FillStrategy> {
    match normalize_name(raw).as_str() {
        "drop" => Ok(FillStrategy::Drop),
        "fill" => Ok(FillStrategy::Fill),
        "forward" | "forward_fill" | "ffill" => Ok(FillStrategy::Forward),
        "backward" | "backward_fill" | "bfill" => Ok(FillStrategy::Backward),
        other => Err(NodeflowError::UnsupportedOperator(format!(
            "unknown fill strategy '{other}'"
        ))),
    }
}

fn parse_normalize_method(raw: &str) -> Result<NormalizeMethod> {
    match normalize_name(raw).as_str() {
        "min_max" | "minmax" => Ok(NormalizeMethod::MinMax),
        "z_score" | "zscore" | "standard" => Ok(NormalizeMethod::ZScore),
        "unit_vector" | "unitvector" | "l2" => Ok(NormalizeMethod::UnitVector),
        other => Err(NodeflowError::UnsupportedOperator(format!(
            "unknown normalization method '{other}'"
        ))),
    }
}

fn parse_agg_fn(raw: &str) -> Result<AggFn> {
    match normalize_name(raw).as_str() {
        "sum" => Ok(AggFn::Sum),
        "mean" | "avg" | "average" => Ok(AggFn::Mean),
        "median" => Ok(AggFn::Median),
        "min" => Ok(AggFn::Min),
        "max" => Ok(AggFn::Max),
        "count" => Ok(AggFn::Count),
        "nunique" | "distinct" => Ok(AggFn::Nunique),
        "first" => Ok(AggFn::First),
        "last" => Ok(AggFn::Last),
        "std" => Ok(AggFn::Std),
        other => Err(NodeflowError::UnsupportedOperator(format!(
            "unknown aggregation function '{other}'"
        ))),
    }
}

fn parse_convert_target(raw: &str) -> Result<ConvertTarget> {
    match normalize_name(raw).as_str() {
        "numeric" | "number" | "float" | "int" | "integer" => Ok(ConvertTarget::Numeric),
        "string" | "str" | "text" => Ok(ConvertTarget::String),
        other => Err(NodeflowError::UnsupportedOperator(format!(
            "unknown target type '{other}'"
        ))),
    }
}

/// Alias-aware view over a parameter bag. Null values and empty strings count as absent.
struct ParamBag<'a> {
    operation: String,
    params: &'a Parameters,
}

impl ParamBag<'_> {
    fn lookup(&self, aliases: &[&str]) -> Option<&JsonValue> {
        aliases
            .iter()
            .filter_map(|key| self.params.get(*key))
            .find(|v| match v {
                JsonValue::Null => false,
                JsonValue::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    }

    fn missing(&self, parameter: &str) -> NodeflowError {
        NodeflowError::missing_parameter(self.operation.clone(), parameter)
    }

    fn string(&self, aliases: &[&str]) -> Option<String> {
        self.lookup(aliases).map(|v| match v {
            JsonValue::String(s) => s.trim().to_owned(),
            other => other.to_string(),
        })
    }

    fn require_string(&self, parameter: &str, aliases: &[&str]) -> Result<String> {
        self.string(aliases).ok_or_else(|| self.missing(parameter))
    }

    /// Literal values: JSON scalars map directly, strings are coerced like conditions.
    fn value(&self, aliases: &[&str]) -> Option<Value> {
        self.lookup(aliases).map(|v| match v {
            JsonValue::String(s) => coerce_literal(s),
            other => Value::from(other.clone()),
        })
    }

    fn unsigned(&self, aliases: &[&str]) -> Option<u64> {
        self.lookup(aliases).and_then(|v| match v {
            JsonValue::Number(n) => n.as_u64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// Accepts a JSON array or a comma-separated string.
    fn string_list(&self, aliases: &[&str]) -> Option<Vec<String>> {
        let list: Vec<String> = match self.lookup(aliases)? {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    JsonValue::String(s) => Some(s.trim().to_owned()),
                    JsonValue::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            JsonValue::String(s) => s.split(',').map(|p| p.trim().to_owned()).collect(),
            _ => return None,
        };
        let list: Vec<String> = list.into_iter().filter(|s| !s.is_empty()).collect();
        (!list.is_empty()).then_some(list)
    }

    /// Empty when absent; the sort falls back to ascending for every key.
    fn ascending_flags(&self) -> Vec<bool> {
        let as_flag = |v: &JsonValue| match v {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
                "asc" | "ascending" | "true" => Some(true),
                "desc" | "descending" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        };
        match self.lookup(ASCENDING_KEYS) {
            Some(JsonValue::Array(items)) => items.iter().map(|v| as_flag(v).unwrap_or(true)).collect(),
            Some(single) => as_flag(single).map(|b| vec![b]).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn filter(&self) -> Result<Operation> {
        let column = self.require_string("column", COLUMN_KEYS)?;
        let operator = self.string(OPERATOR_KEYS);
        let value = self.value(VALUE_KEYS);

        let (operator, value) = match (operator, value) {
            (Some(op), Some(value)) => match CompareOp::parse(&op) {
                Some(parsed) => (parsed, value),
                None if CONDITION_PATTERN.is_match(&op) => parse_condition(&op, &column)?,
                None => {
                    return Err(NodeflowError::UnsupportedOperator(format!(
                        "unknown comparison operator '{op}'"
                    )));
                }
            },
            (Some(condition), None) => parse_condition(&condition, &column)?,
            (None, Some(value)) => (CompareOp::Eq, value),
            (None, None) => return Err(self.missing("condition")),
        };

        Ok(Operation::Filter {
            column,
            operator,
            value,
        })
    }

    fn text(&self, transform: TextOp) -> Result<Operation> {
        Ok(Operation::Text {
            column: self.require_string("column", COLUMN_KEYS)?,
            transform,
        })
    }

    fn aggregations(&self) -> Result<Vec<Aggregation>> {
        let Some(JsonValue::Object(map)) = self.lookup(AGGREGATION_KEYS) else {
            return Err(self.missing("aggregations"));
        };
        map.iter()
            .map(|(column, function)| {
                let function = match function {
                    JsonValue::String(s) => parse_agg_fn(s)?,
                    other => {
                        return Err(NodeflowError::UnsupportedOperator(format!(
                            "aggregation for '{column}' must be a function name, found {other}"
                        )));
                    }
                };
                Ok(Aggregation {
                    column: column.clone(),
                    function,
                })
            })
            .collect()
    }

    fn column_fill(&self) -> Result<ColumnFill> {
        let Some(raw) = self.lookup(COLUMN_FILL_KEYS) else {
            return Err(self.missing("fill_value"));
        };
        let fill = match raw {
            JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
                "mean" => ColumnFill::Mean,
                "median" => ColumnFill::Median,
                "mode" => ColumnFill::Mode,
                _ => ColumnFill::Value(coerce_literal(s)),
            },
            other => ColumnFill::Value(Value::from(other.clone())),
        };
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: JsonValue) -> Parameters {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("test parameters must be an object"),
        }
    }

    #[test]
    fn test_combined_condition_is_split() {
        let (op, value) = parse_condition(">=40000", "salary").expect("valid condition");
        assert_eq!(op, CompareOp::Ge);
        assert_eq!(value, Value::Int(40000));

        let (op, value) = parse_condition("> 2.5", "score").expect("valid condition");
        assert_eq!(op, CompareOp::Gt);
        assert_eq!(value, Value::Float(2.5));
    }

    #[test]
    fn test_condition_may_repeat_column_name() {
        let (op, value) = parse_condition("age > 25", "age").expect("valid condition");
        assert_eq!(op, CompareOp::Gt);
        assert_eq!(value, Value::Int(25));
    }

    #[test]
    fn test_single_token_condition_means_equality() {
        let (op, value) = parse_condition("HR", "department").expect("single token");
        assert_eq!(op, CompareOp::Eq);
        assert_eq!(value, Value::text("HR"));
    }

    #[test]
    fn test_condition_without_operator_is_rejected() {
        let err = parse_condition("roughly 25", "age").expect_err("no operator");
        assert!(matches!(err, NodeflowError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_filter_aliases_resolve_to_same_operation() {
        let a = Operation::from_parameters(
            "FILTER",
            &params(json!({"columnName": "age", "condition": "> 25"})),
        )
        .expect("combined form");
        let b = Operation::from_parameters(
            "filter",
            &params(json!({"column": "age", "operator": ">", "value": 25})),
        )
        .expect("triple form");
        assert_eq!(a, b);
    }

    #[test]
    fn test_triple_with_unknown_operator_is_rejected() {
        let err = Operation::from_parameters(
            "filter",
            &params(json!({"column": "age", "operator": "~", "value": 25})),
        )
        .expect_err("unknown operator");
        assert!(matches!(err, NodeflowError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = Operation::from_parameters("normalize", &params(json!({"method": "z-score"})))
            .expect_err("column is required");
        assert!(
            matches!(err, NodeflowError::MissingParameter { ref parameter, .. } if parameter == "column"),
            "got {err}"
        );

        let err = Operation::from_parameters("filter", &params(json!({"column": "age"})))
            .expect_err("condition is required");
        assert!(matches!(err, NodeflowError::MissingParameter { .. }));
    }

    #[test]
    fn test_unknown_operation_name() {
        let err = Operation::from_parameters("explode", &Parameters::new())
            .expect_err("unknown operation");
        assert!(matches!(err, NodeflowError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_name_spellings_are_equivalent() {
        let p = params(json!({"columnName": "city"}));
        let a = Operation::from_parameters("TO_UPPER", &p).expect("upper");
        let b = Operation::from_parameters("to-upper", &p).expect("upper");
        assert_eq!(a, b);
        assert_eq!(a.name(), "upper");
    }

    #[test]
    fn test_aggregate_parameters() {
        let op = Operation::from_parameters(
            "group_by",
            &params(json!({"groupBy": "dept", "agg_dict": {"salary": "avg", "id": "count"}})),
        )
        .expect("aggregate");
        let Operation::Aggregate {
            group_columns,
            aggregations,
        } = op
        else {
            panic!("expected aggregate");
        };
        assert_eq!(group_columns, vec!["dept".to_owned()]);
        assert_eq!(aggregations.len(), 2);
        assert_eq!(aggregations[0].function, AggFn::Mean);
        assert_eq!(aggregations[1].function, AggFn::Count);
    }

    #[test]
    fn test_parameters_omit_tag() {
        let op = Operation::Normalize {
            column: "x".to_owned(),
            method: NormalizeMethod::ZScore,
        };
        assert_eq!(op.parameters(), json!({"column": "x", "method": "z-score"}));
    }

    #[test]
    fn test_fill_na_keywords() {
        let op = Operation::from_parameters(
            "FILL_NA",
            &params(json!({"columnName": "score", "targetValue": "median"})),
        )
        .expect("fill na");
        assert_eq!(
            op,
            Operation::FillColumn {
                column: "score".to_owned(),
                fill: ColumnFill::Median
            }
        );
    }
}
