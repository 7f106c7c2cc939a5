//! Workflow graph: submission format and execution ordering.

use super::spec::Parameters;
use crate::error::{NodeflowError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Input,
    Transform,
    Output,
    /// Any other node type; never executed.
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeRecord")]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: Parameters,
}

/// Wire shape of a node. Stored nodes often carry both `_id` and `id`; `_id` wins.
#[derive(Deserialize)]
struct NodeRecord {
    #[serde(rename = "_id", default)]
    underscore_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    data: Parameters,
}

impl From<NodeRecord> for Node {
    fn from(record: NodeRecord) -> Self {
        Self {
            id: record.underscore_id.or(record.id).unwrap_or_default(),
            kind: record.kind,
            data: record.data,
        }
    }
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, data: Parameters) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(deserialize_with = "node_ref")]
    pub source: String,
    #[serde(deserialize_with = "node_ref")]
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Edge endpoints arrive either as `{"_id": "..."}` or as a bare id string.
fn node_ref<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NodeRef {
        Id(String),
        Object {
            #[serde(rename = "_id", default)]
            underscore_id: Option<String>,
            #[serde(default)]
            id: Option<String>,
        },
    }

    match NodeRef::deserialize(deserializer)? {
        NodeRef::Id(id) => Ok(id),
        NodeRef::Object { underscore_id, id } => underscore_id
            .or(id)
            .ok_or_else(|| serde::de::Error::custom("edge endpoint has no '_id' or 'id'")),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A submitted workflow: `{"definition": {"nodes": [...], "edges": [...]}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub definition: GraphDefinition,
}

impl WorkflowDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| NodeflowError::InputFormat(format!("invalid workflow definition: {e}")))
    }
}

/// Nodes keyed by id in declaration order, plus the edges between them.
#[derive(Clone, Debug, Default)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Nodes without an id are skipped; a repeated id keeps its first position but takes
    /// the later definition.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut by_id = IndexMap::new();
        for node in nodes {
            if node.id.is_empty() {
                tracing::warn!("Skipping workflow node without an id");
                continue;
            }
            by_id.insert(node.id.clone(), node);
        }
        Self {
            nodes: by_id,
            edges,
        }
    }

    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        Self::new(
            definition.definition.nodes.clone(),
            definition.definition.edges.clone(),
        )
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn input_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.kind == NodeKind::Input)
    }

    /// Kahn's algorithm over every node. Nodes still holding in-degree when the queue
    /// drains (they sit on or behind a cycle) are appended in declaration order.
    fn full_order(&self) -> (Vec<&str>, Vec<&str>) {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            let (Some((source, _)), Some((target, _))) = (
                self.nodes.get_key_value(&edge.source),
                self.nodes.get_key_value(&edge.target),
            ) else {
                continue;
            };
            successors.entry(source.as_str()).or_default().push(target.as_str());
            if let Some(degree) = in_degree.get_mut(target.as_str()) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut ordered: Vec<&str> = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            ordered.push(id);
            for next in successors.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        let leftover: Vec<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|id| !ordered.contains(id))
            .collect();
        ordered.extend(leftover.iter().copied());
        (ordered, leftover)
    }

    /// Transform and output node ids in execution order.
    pub fn execution_order(&self) -> Vec<String> {
        let (ordered, _) = self.full_order();
        ordered
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|n| matches!(n.kind, NodeKind::Transform | NodeKind::Output))
            })
            .map(str::to_owned)
            .collect()
    }

    /// Nodes that could not be ordered topologically.
    pub fn cyclic_nodes(&self) -> Vec<String> {
        let (_, leftover) = self.full_order();
        leftover.into_iter().map(str::to_owned).collect()
    }

    /// Upstream table id for a node: the source of its first incoming edge (self-loops
    /// ignored), otherwise the first declared input node.
    pub fn find_input(&self, node_id: &str) -> Option<String> {
        self.edges
            .iter()
            .find(|e| e.target == node_id && e.source != node_id)
            .map(|e| e.source.clone())
            .or_else(|| self.input_nodes().next().map(|n| n.id.clone()))
    }
}
