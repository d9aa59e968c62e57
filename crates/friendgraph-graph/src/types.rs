use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use friendgraph_core::AccountId;

use crate::indexed::IndexedGraph;

/// Rendering hint attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StyleHint {
    /// The account a crawl started from.
    Root,
    /// On the highlighted shortest path.
    OnPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleHint>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: None,
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: Some(StyleHint::Root),
        }
    }
}

/// Directed parent → child relation, by display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Everything assembled from one crawl.
#[derive(Debug, Clone)]
pub struct Graph {
    pub root: AccountId,
    pub root_name: String,
    /// Unique by name, in discovery order.
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub indexed: IndexedGraph,
    pub id_to_name: BTreeMap<AccountId, String>,
}

impl Graph {
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
