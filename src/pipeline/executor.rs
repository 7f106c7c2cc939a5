//! Workflow execution engine.
//!
//! A run moves through `Loading → Executing → Completed`, or stops in `Failed` on the
//! first error. Every run owns its own [`Dispatcher`], so nothing leaks between runs.

use super::dispatcher::{Dispatcher, TransformSummary};
use super::graph::{NodeKind, WorkflowDefinition, WorkflowGraph};
use super::input::{InputLoader, PayloadLoader};
use super::spec::{Operation, Parameters};
use crate::error::{NodeflowError, Result};
use crate::processing::types::{Record, Shape, Table};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

const TRANSFORM_TYPE_KEYS: &[&str] = &["transformType", "transform_type", "operation"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Loading,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Output of one transform or output node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
    pub data: Vec<Record>,
    pub shape: Shape,
}

impl From<&Table> for NodeResult {
    fn from(table: &Table) -> Self {
        Self {
            data: table.to_records(),
            shape: table.shape(),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub results: IndexMap<String, NodeResult>,
    pub summary: TransformSummary,
    #[serde(skip)]
    pub duration: std::time::Duration,
}

impl WorkflowRun {
    /// One-line description for logs and the CLI.
    pub fn describe(&self) -> String {
        format!(
            "Workflow completed: {} node results, {} transformations, {} tables, {:.2}s",
            self.results.len(),
            self.summary.total_transformations,
            self.summary.dataframe_count,
            self.duration.as_secs_f64()
        )
    }
}

/// Executes a submitted workflow with the default payload loader.
pub fn run_workflow(definition: &WorkflowDefinition) -> Result<WorkflowRun> {
    WorkflowExecutor::new(PayloadLoader).run(definition)
}

pub struct WorkflowExecutor<L> {
    loader: L,
}

impl<L: InputLoader> WorkflowExecutor<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    pub fn run(&self, definition: &WorkflowDefinition) -> Result<WorkflowRun> {
        let run_id = Uuid::new_v4();
        let start = std::time::Instant::now();
        let graph = WorkflowGraph::from_definition(definition);
        let mut run = Run {
            graph: &graph,
            dispatcher: Dispatcher::new(),
            results: IndexMap::new(),
            phase: RunPhase::Loading,
        };

        match run.execute(&self.loader) {
            Ok(()) => {
                run.transition(RunPhase::Completed);
                let finished = WorkflowRun {
                    run_id,
                    results: run.results,
                    summary: run.dispatcher.summary(),
                    duration: start.elapsed(),
                };
                tracing::info!(%run_id, "{}", finished.describe());
                Ok(finished)
            }
            Err(e) => {
                let failed_in = run.phase;
                run.transition(RunPhase::Failed);
                tracing::error!(%run_id, phase = %failed_in, "Workflow failed: {e}");
                Err(e)
            }
        }
    }
}

/// Mutable state of a single run.
struct Run<'g> {
    graph: &'g WorkflowGraph,
    dispatcher: Dispatcher,
    results: IndexMap<String, NodeResult>,
    phase: RunPhase,
}

impl Run<'_> {
    fn transition(&mut self, next: RunPhase) {
        tracing::debug!(from = %self.phase, to = %next, "Workflow phase change");
        self.phase = next;
    }

    fn execute(&mut self, loader: &impl InputLoader) -> Result<()> {
        let graph = self.graph;
        let inputs: Vec<_> = graph.input_nodes().collect();
        if inputs.is_empty() {
            return Err(NodeflowError::Workflow(
                "No input nodes found in workflow".to_owned(),
            ));
        }
        for node in inputs {
            let table = Table::from_records(&loader.extract(node))?;
            tracing::info!(node = %node.id, shape = ?table.shape(), "Loaded input");
            self.dispatcher.load(node.id.clone(), table)?;
        }

        self.transition(RunPhase::Executing);
        let cyclic = graph.cyclic_nodes();
        if !cyclic.is_empty() {
            tracing::warn!(
                nodes = ?cyclic,
                "Workflow graph has a cycle; affected nodes run in declaration order"
            );
        }

        for node_id in graph.execution_order() {
            let Some(node) = graph.node(&node_id) else {
                continue;
            };
            let source_id = graph.find_input(&node_id).ok_or_else(|| {
                NodeflowError::Workflow(format!("No input source found for node '{node_id}'"))
            })?;

            let table = match node.kind {
                NodeKind::Transform => {
                    let operation = operation_for(&node_id, &node.data)?;
                    let result_id = self.dispatcher.apply(&source_id, &operation)?;
                    self.dispatcher.alias(node_id.clone(), &result_id)?;
                    self.dispatcher.get(&result_id)?
                }
                NodeKind::Output => {
                    let table = self.dispatcher.get(&source_id)?;
                    self.dispatcher.alias(node_id.clone(), &source_id)?;
                    table
                }
                NodeKind::Input | NodeKind::Other => continue,
            };
            self.results.insert(node_id, NodeResult::from(table.as_ref()));
        }
        Ok(())
    }
}

/// Operation named by a transform node: `transformType` plus the remaining keys as
/// parameters.
fn operation_for(node_id: &str, data: &Parameters) -> Result<Operation> {
    let name = TRANSFORM_TYPE_KEYS
        .iter()
        .find_map(|key| data.get(*key).and_then(serde_json::Value::as_str))
        .ok_or_else(|| NodeflowError::missing_parameter(format!("node '{node_id}'"), "transformType"))?;
    Operation::from_parameters(name, data)
}
