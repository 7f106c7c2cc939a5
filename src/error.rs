//! Centralized error handling for the nodeflow engine.
//!
//! Every failure the engine can report is a variant of [`NodeflowError`]. Variants are
//! grouped by what went wrong rather than where:
//!
//! - malformed payloads ([`NodeflowError::InputFormat`])
//! - references to columns that do not exist ([`NodeflowError::ColumnNotFound`])
//! - incomplete operation parameters ([`NodeflowError::MissingParameter`])
//! - unknown operators or operation names ([`NodeflowError::UnsupportedOperator`])
//! - columns that cannot be coerced to numbers ([`NodeflowError::TypeCoercion`])
//! - chart rendering failures ([`NodeflowError::GraphGeneration`])
//!
//! ```
//! use nodeflow::error::NodeflowError;
//!
//! fn describe(err: &NodeflowError) -> &'static str {
//!     match err {
//!         NodeflowError::ColumnNotFound { .. } => "bad column reference",
//!         NodeflowError::MissingParameter { .. } => "incomplete node",
//!         _ => "other failure",
//!     }
//! }
//! ```
//!
//! ## Context
//!
//! The `ResultExt` trait adds `.context()` to any `Result` whose error converts into
//! `NodeflowError`:
//!
//! ```no_run
//! use nodeflow::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_payload() -> nodeflow::error::Result<String> {
//!     let text = fs::read_to_string("data.csv").context("Failed to load dataset")?;
//!     Ok(text)
//! }
//! ```
//!
//! Errors abort the current run. The run boundary turns them into a
//! `{ "success": false, "error": "..." }` envelope (see [`crate::response`]).

use std::fmt;

/// Main error type for nodeflow operations.
#[derive(Debug)]
pub enum NodeflowError {
    /// I/O errors (reading payload files, writing exports)
    Io(std::io::Error),

    /// The payload could not be turned into a table
    InputFormat(String),

    /// A referenced column is not present in the table
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    /// No recognised alias was supplied for a required parameter
    MissingParameter {
        operation: String,
        parameter: String,
    },

    /// Unknown comparison operator, operation name or method
    UnsupportedOperator(String),

    /// A column could not be coerced to the requested type
    TypeCoercion { column: String, target: String },

    /// Chart rendering failed
    GraphGeneration(String),

    /// Unknown export or input format
    UnsupportedFormat(String),

    /// Table identifier is not bound in the store
    TableNotFound(String),

    /// Table identifier is already bound in the store
    TableConflict(String),

    /// The workflow graph cannot be executed
    Workflow(String),

    /// A dataframe operation failed inside polars
    DataProcessing(String),

    /// Configuration errors
    Config(String),

    /// Generic error with context
    Other(String),
}

impl NodeflowError {
    pub fn column_not_found<'a>(
        column: impl Into<String>,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
            available: available.into_iter().map(str::to_owned).collect(),
        }
    }

    pub fn missing_parameter(operation: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::MissingParameter {
            operation: operation.into(),
            parameter: parameter.into(),
        }
    }
}

impl fmt::Display for NodeflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InputFormat(msg) => write!(f, "Invalid input format: {msg}"),
            Self::ColumnNotFound { column, available } => write!(
                f,
                "Column '{column}' not found. Available columns: [{}]",
                available.join(", ")
            ),
            Self::MissingParameter {
                operation,
                parameter,
            } => write!(f, "Missing '{parameter}' parameter for {operation}"),
            Self::UnsupportedOperator(msg) => write!(f, "Unsupported operator: {msg}"),
            Self::TypeCoercion { column, target } => {
                write!(f, "Column '{column}' cannot be converted to {target}")
            }
            Self::GraphGeneration(msg) => write!(f, "Error generating graph: {msg}"),
            Self::UnsupportedFormat(format) => write!(f, "Unsupported format: {format}"),
            Self::TableNotFound(id) => write!(f, "DataFrame ID '{id}' not found"),
            Self::TableConflict(id) => write!(f, "DataFrame ID '{id}' is already bound"),
            Self::Workflow(msg) => write!(f, "Workflow error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for NodeflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NodeflowError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for NodeflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for NodeflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::InputFormat(format!("JSON error: {err}"))
    }
}

impl From<csv::Error> for NodeflowError {
    fn from(err: csv::Error) -> Self {
        Self::InputFormat(format!("CSV error: {err}"))
    }
}

impl From<polars::error::PolarsError> for NodeflowError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<quick_xml::Error> for NodeflowError {
    fn from(err: quick_xml::Error) -> Self {
        Self::InputFormat(format!("XML error: {err}"))
    }
}

// The CLI envelope carries errors as plain strings
impl From<NodeflowError> for String {
    fn from(err: NodeflowError) -> Self {
        err.to_string()
    }
}

/// Result type alias for nodeflow operations.
pub type Result<T> = std::result::Result<T, NodeflowError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<NodeflowError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: NodeflowError = e.into();
            NodeflowError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: NodeflowError = e.into();
            NodeflowError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_not_found_lists_available_columns() {
        let err = NodeflowError::column_not_found("salary", ["age", "name"]);
        assert_eq!(
            err.to_string(),
            "Column 'salary' not found. Available columns: [age, name]"
        );
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = NodeflowError::missing_parameter("filter", "column");
        assert_eq!(err.to_string(), "Missing 'column' parameter for filter");
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = NodeflowError::GraphGeneration("X column 'q' not found".to_owned());
        let s: String = err.into();
        assert_eq!(s, "Error generating graph: X column 'q' not found");
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read payload");
        assert!(result.is_err(), "context must keep the error");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read payload"),
            "context message should prefix the error"
        );
    }
}
