//! Transformation dispatcher and the per-run table store.

use super::spec::{Operation, Parameters};
use crate::error::{NodeflowError, Result};
use crate::processing::transforms;
use crate::processing::types::Table;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Identifier → table bindings for one run. A bound identifier is never rebound.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: IndexMap<String, Arc<Table>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `TableConflict` if `id` is already bound.
    pub fn bind(&mut self, id: impl Into<String>, table: Arc<Table>) -> Result<()> {
        let id = id.into();
        if self.tables.contains_key(&id) {
            return Err(NodeflowError::TableConflict(id));
        }
        self.tables.insert(id, table);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Table>> {
        self.tables
            .get(id)
            .cloned()
            .ok_or_else(|| NodeflowError::TableNotFound(id.to_owned()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tables.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformRecord {
    #[serde(rename = "from")]
    pub source_table_id: String,
    #[serde(rename = "to")]
    pub result_table_id: String,
    pub operation: String,
    #[serde(rename = "params")]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformSummary {
    pub total_transformations: usize,
    pub dataframe_count: usize,
    pub transformations: Vec<TransformRecord>,
    pub available_dataframes: Vec<String>,
}

/// Applies operations to stored tables, binding every result under a fresh identifier
/// and appending to the transform log.
#[derive(Debug, Default)]
pub struct Dispatcher {
    store: TableStore,
    history: Vec<TransformRecord>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, id: impl Into<String>, table: Table) -> Result<()> {
        self.store.bind(id, Arc::new(table))
    }

    /// Binds an existing table under an additional identifier.
    pub fn alias(&mut self, id: impl Into<String>, existing: &str) -> Result<()> {
        let table = self.store.get(existing)?;
        self.store.bind(id, table)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Table>> {
        self.store.get(id)
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn history(&self) -> &[TransformRecord] {
        &self.history
    }

    /// Applies `operation` to the table bound at `table_id` and returns the new id,
    /// `{table_id}_transform_{n}` with `n` one past the current log length.
    pub fn apply(&mut self, table_id: &str, operation: &Operation) -> Result<String> {
        let source = self.store.get(table_id)?;
        let result = execute(&source, operation)?;

        let mut result_id = format!("{table_id}_transform_{}", self.history.len() + 1);
        if self.store.contains(&result_id) {
            result_id = format!("{result_id}_{}", self.store.len());
        }
        tracing::debug!(
            source = table_id,
            result = %result_id,
            operation = operation.name(),
            rows = result.height(),
            "Applied transformation"
        );
        self.store.bind(result_id.clone(), Arc::new(result))?;
        self.history.push(TransformRecord {
            source_table_id: table_id.to_owned(),
            result_table_id: result_id.clone(),
            operation: operation.name().to_owned(),
            parameters: operation.parameters(),
        });
        Ok(result_id)
    }

    /// Resolves `name` and `params` into an [`Operation`] and applies it.
    pub fn apply_named(&mut self, table_id: &str, name: &str, params: &Parameters) -> Result<String> {
        let operation = Operation::from_parameters(name, params)?;
        self.apply(table_id, &operation)
    }

    pub fn summary(&self) -> TransformSummary {
        TransformSummary {
            total_transformations: self.history.len(),
            dataframe_count: self.store.len(),
            transformations: self.history.clone(),
            available_dataframes: self.store.ids().map(str::to_owned).collect(),
        }
    }
}

/// Runs one operation against a table.
pub fn execute(table: &Table, operation: &Operation) -> Result<Table> {
    match operation {
        Operation::Filter {
            column,
            operator,
            value,
        } => transforms::filter(table, column, *operator, value),
        Operation::FillMissing {
            strategy,
            fill_value,
        } => transforms::fill_missing(table, *strategy, fill_value.as_ref()),
        Operation::RemoveDuplicates { subset } => {
            transforms::remove_duplicates(table, subset.as_deref())
        }
        Operation::Normalize { column, method } => transforms::normalize(table, column, *method),
        Operation::Aggregate {
            group_columns,
            aggregations,
        } => transforms::aggregate(table, group_columns, aggregations),
        Operation::Sort { columns, ascending } => transforms::sort(table, columns, ascending),
        Operation::Text { column, transform } => {
            transforms::apply_text_op(table, column, *transform)
        }
        Operation::Round { column, decimals } => transforms::round(table, column, *decimals),
        Operation::FormatNumbers { column, decimals } => {
            transforms::format_numbers(table, column, *decimals)
        }
        Operation::ConvertType { column, target } => transforms::convert(table, column, *target),
        Operation::DropColumn { column } => Ok(transforms::drop_column(table, column)),
        Operation::RenameColumn { column, new_name } => {
            Ok(transforms::rename_column(table, column, new_name))
        }
        Operation::FillColumn { column, fill } => transforms::fill_column(table, column, fill),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::transforms::CompareOp;
    use crate::processing::types::{Column, Value};

    fn ages() -> Table {
        Table::new(vec![Column::new(
            "age",
            vec![Value::Int(20), Value::Int(30), Value::Int(40)],
        )])
        .expect("valid table")
    }

    fn over(limit: i64) -> Operation {
        Operation::Filter {
            column: "age".to_owned(),
            operator: CompareOp::Gt,
            value: Value::Int(limit),
        }
    }

    #[test]
    fn test_apply_binds_fresh_ids_and_logs() -> Result<()> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.load("input", ages())?;

        let first = dispatcher.apply("input", &over(25))?;
        let second = dispatcher.apply(&first, &over(35))?;

        assert_eq!(first, "input_transform_1");
        assert_eq!(second, "input_transform_1_transform_2");
        assert_eq!(dispatcher.get(&first)?.height(), 2);
        assert_eq!(dispatcher.get(&second)?.height(), 1);
        // source table is untouched
        assert_eq!(dispatcher.get("input")?.height(), 3);

        let history = dispatcher.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source_table_id, "input");
        assert_eq!(history[1].result_table_id, second);
        assert_eq!(history[0].operation, "filter");
        Ok(())
    }

    #[test]
    fn test_store_never_rebinds() -> Result<()> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.load("input", ages())?;
        let err = dispatcher.load("input", Table::default()).expect_err("rebind");
        assert!(matches!(err, NodeflowError::TableConflict(_)));
        assert_eq!(dispatcher.get("input")?.height(), 3);
        Ok(())
    }

    #[test]
    fn test_unknown_table_id() {
        let mut dispatcher = Dispatcher::new();
        let err = dispatcher.apply("nope", &over(1)).expect_err("unknown id");
        assert!(matches!(err, NodeflowError::TableNotFound(_)));
    }

    #[test]
    fn test_failed_operation_leaves_log_untouched() -> Result<()> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.load("input", ages())?;
        let op = Operation::Filter {
            column: "salary".to_owned(),
            operator: CompareOp::Gt,
            value: Value::Int(1),
        };
        assert!(dispatcher.apply("input", &op).is_err(), "column is absent");
        assert!(dispatcher.history().is_empty(), "no record for a failed apply");
        assert_eq!(dispatcher.store().len(), 1);
        Ok(())
    }

    #[test]
    fn test_summary_lists_tables() -> Result<()> {
        let mut dispatcher = Dispatcher::new();
        dispatcher.load("input", ages())?;
        let params = serde_json::json!({"columnName": "age", "condition": ">=30"});
        let serde_json::Value::Object(params) = params else {
            unreachable!("literal object")
        };
        dispatcher.apply_named("input", "FILTER", &params)?;

        let summary = dispatcher.summary();
        assert_eq!(summary.total_transformations, 1);
        assert_eq!(summary.dataframe_count, 2);
        assert_eq!(
            summary.available_dataframes,
            vec!["input".to_owned(), "input_transform_1".to_owned()]
        );
        assert_eq!(
            summary.transformations[0].parameters,
            serde_json::json!({"column": "age", "operator": ">=", "value": 30})
        );
        Ok(())
    }
}
