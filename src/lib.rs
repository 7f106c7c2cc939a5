//! # NodeFlow - Workflow Engine for Tabular Data
//!
//! NodeFlow runs user-built workflows over tables: a directed graph of input, transform
//! and output nodes is ordered, each transform is applied to the table produced upstream,
//! and every node's result is collected. It also offers an automatic cleaning pipeline
//! (type detection, imputation, deduplication, encoding and scaling) plus CSV/XML/JSON
//! export and SVG charts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nodeflow::processing::{CleaningOptions, clean, load_table};
//!
//! let table = load_table("employees.csv".as_ref())?;
//! let (cleaned, report) = clean(&table, &CleaningOptions::default())?;
//! for step in &report.processing_steps {
//!     println!("{step}");
//! }
//! println!("{:?}", cleaned.shape());
//! # Ok::<(), nodeflow::error::NodeflowError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`processing`]: value model, column type detection, cleaning and the transform library
//! - [`pipeline`]: operation model, dispatcher, graph ordering and the workflow executor
//! - [`export`]: CSV, XML and JSON documents
//! - [`chart`]: SVG charts
//! - [`error`]: error types and handling utilities
//! - [`config`], [`logging`], [`response`]: application plumbing used by the binary
//!
//! ## Immutable Tables
//!
//! Tables are never modified in place. Every operation returns a new table, and the
//! per-run table store refuses to rebind an identifier, so every intermediate result of a
//! run stays addressable:
//!
//! ```no_run
//! use nodeflow::pipeline::{Dispatcher, Parameters};
//! use nodeflow::processing::load_table;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.load("input", load_table("people.csv".as_ref())?)?;
//! let params: Parameters = serde_json::from_str(r#"{"column": "age", "condition": "> 25"}"#)?;
//! let id = dispatcher.apply_named("input", "filter", &params)?;
//! assert_eq!(id, "input_transform_1");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod chart;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod processing;
pub mod response;
