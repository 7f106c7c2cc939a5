#![expect(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

mod io;
mod transforms;

use crate::processing::types::{Column, Table, Value};

/// Table from `(name, values)` pairs.
fn table(columns: Vec<(&str, Vec<Value>)>) -> Table {
    Table::new(
        columns
            .into_iter()
            .map(|(name, values)| Column::new(name, values))
            .collect(),
    )
    .expect("valid table")
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|s| Value::text(*s)).collect()
}
