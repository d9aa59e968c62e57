//! Combining graphs from two independent crawls.
//!
//! Display names identify accounts across crawls: the same name in both
//! inputs is the same account and collapses to one index.

use std::collections::{HashMap, HashSet};

use crate::indexed::{IndexedGraph, UserIndexMap};
use crate::types::{Graph, GraphEdge, GraphNode, StyleHint};

/// Union of two index maps.
///
/// Entries of `a` keep their index. Names only in `b` get fresh indices
/// after `a`'s range, in `b`'s index order.
pub fn merge_index_maps(a: &UserIndexMap, b: &UserIndexMap) -> UserIndexMap {
    let mut merged = a.clone();
    for (_, name) in b.iter() {
        merged.get_or_insert(name);
    }
    merged
}

/// Every arc of `a` and `b`, re-keyed through the merged index map.
pub fn merge_indexed_graphs(a: &IndexedGraph, b: &IndexedGraph) -> IndexedGraph {
    let merged_map = merge_index_maps(a.map(), b.map());
    let mut merged = IndexedGraph::with_map(merged_map);

    for (from, to) in a.arcs() {
        merged.insert_arc(from, to);
    }

    let translate = |idx: u32| -> Option<u32> {
        if idx == 0 {
            return None;
        }
        b.map()
            .name_of(idx)
            .and_then(|name| merged.map().index_of(name))
    };
    let remapped: Vec<(u32, u32)> = b
        .arcs()
        .filter_map(|(from, to)| Some((translate(from)?, translate(to)?)))
        .collect();
    for (from, to) in remapped {
        merged.insert_arc(from, to);
    }
    merged
}

/// Union of node lists by name, first occurrence first.
///
/// Style hints from later duplicates are folded in: `OnPath` beats `Root`,
/// and a node that is a root in either input stays marked.
pub fn merge_nodes(a: &[GraphNode], b: &[GraphNode]) -> Vec<GraphNode> {
    let mut merged: Vec<GraphNode> = Vec::with_capacity(a.len() + b.len());
    let mut position: HashMap<String, usize> = HashMap::new();

    for node in a.iter().chain(b) {
        match position.get(&node.name) {
            Some(&i) => {
                merged[i].style = stronger(merged[i].style, node.style);
            }
            None => {
                position.insert(node.name.clone(), merged.len());
                merged.push(node.clone());
            }
        }
    }
    merged
}

fn stronger(x: Option<StyleHint>, y: Option<StyleHint>) -> Option<StyleHint> {
    match (x, y) {
        (Some(StyleHint::OnPath), _) | (_, Some(StyleHint::OnPath)) => Some(StyleHint::OnPath),
        (Some(StyleHint::Root), _) | (_, Some(StyleHint::Root)) => Some(StyleHint::Root),
        _ => None,
    }
}

/// Union of edge lists, first occurrence first.
pub fn merge_edges(a: &[GraphEdge], b: &[GraphEdge]) -> Vec<GraphEdge> {
    let mut seen = HashSet::new();
    a.iter()
        .chain(b)
        .filter(|e| seen.insert((*e).clone()))
        .cloned()
        .collect()
}

/// Two crawls combined into one graph.
#[derive(Debug, Clone)]
pub struct MergedGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub indexed: IndexedGraph,
}

pub fn merge_graphs(a: &Graph, b: &Graph) -> MergedGraph {
    MergedGraph {
        nodes: merge_nodes(&a.nodes, &b.nodes),
        edges: merge_edges(&a.edges, &b.edges),
        indexed: merge_indexed_graphs(&a.indexed, &b.indexed),
    }
}
