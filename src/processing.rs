//! Tabular processing: the value model, type detection, the cleaning pipeline and the
//! transform library.

pub mod classify;
pub mod cleaning;
pub mod io;
pub mod transforms;
pub mod types;

pub use classify::{ColumnProfile, classify, classify_with_threshold, profile};
pub use cleaning::{CleaningOptions, CleaningReport, clean};
pub use io::{PayloadFormat, load_table, parse_records, parse_table, read_records};
pub use types::{Column, ColumnKind, Record, Shape, Table, Value};

#[cfg(test)]
mod tests;
