//! Workflow execution: operation model, dispatcher, graph resolution and the executor.
//!
//! # Overview
//!
//! A workflow is a directed graph of nodes. Input nodes carry a payload, transform nodes
//! name an operation plus its parameters, and output nodes expose the table that reaches
//! them. Execution happens in four layers:
//!
//! - [`spec`]: resolves an operation name and a loose parameter bag into a typed
//!   [`Operation`] once, at the boundary
//! - [`dispatcher`]: applies operations to tables held in a per-run store and keeps the
//!   transform log
//! - [`graph`]: parses the submission format and orders nodes with Kahn's algorithm
//! - [`executor`]: drives a run from loading inputs to collecting node results
//!
//! # Example
//!
//! ```no_run
//! use nodeflow::pipeline::{WorkflowDefinition, run_workflow};
//!
//! let json = std::fs::read_to_string("workflow.json")?;
//! let definition = WorkflowDefinition::from_json(&json)?;
//! let run = run_workflow(&definition)?;
//! println!("{}", run.describe());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Cyclic graphs are tolerated: nodes that cannot be ordered are appended in declaration
//! order and a warning is logged.

pub mod dispatcher;
pub mod executor;
pub mod graph;
pub mod input;
pub mod spec;

pub use dispatcher::{Dispatcher, TableStore, TransformRecord, TransformSummary};
pub use executor::{NodeResult, RunPhase, WorkflowExecutor, WorkflowRun, run_workflow};
pub use graph::{Edge, Node, NodeKind, WorkflowDefinition, WorkflowGraph};
pub use input::{InputLoader, PayloadLoader};
pub use spec::{Operation, Parameters, parse_condition};
