//! Shortest path between two accounts and path highlighting.

use tracing::{debug, warn};

use friendgraph_core::{AccountId, Error};
use friendgraph_store::AccountCache;

use crate::indexed::IndexedGraph;
use crate::types::{GraphNode, StyleHint};

/// Shortest hop path between two accounts, as display names.
///
/// Each account's current display name is read from the cache. `None` when
/// either account was never crawled or indexed, or no path connects them.
pub fn shortest_path(
    cache: &AccountCache,
    graph: &IndexedGraph,
    start: &AccountId,
    end: &AccountId,
) -> Option<Vec<String>> {
    let start_name = cached_name(cache, start)?;
    let end_name = cached_name(cache, end)?;
    shortest_path_by_name(graph, &start_name, &end_name)
}

pub fn shortest_path_by_name(graph: &IndexedGraph, start: &str, end: &str) -> Option<Vec<String>> {
    let path = graph.shortest_name_path(start, end);
    match &path {
        Some(p) => debug!("Path {} -> {}: {} hops", start, end, p.len().saturating_sub(1)),
        None => debug!("No path between {} and {}", start, end),
    }
    path
}

fn cached_name(cache: &AccountCache, id: &AccountId) -> Option<String> {
    match cache.display_name(id) {
        Ok(name) => Some(name),
        Err(Error::NotFound(_)) => {
            debug!("{} was never crawled", id);
            None
        }
        Err(e) => {
            warn!("Cannot read display name for {}: {}", id, e);
            None
        }
    }
}

/// Copy of `nodes` with every node named in `path` marked as on the path.
pub fn apply_path_highlight(nodes: &[GraphNode], path: &[String]) -> Vec<GraphNode> {
    nodes
        .iter()
        .map(|node| {
            if path.iter().any(|p| p == &node.name) {
                GraphNode {
                    name: node.name.clone(),
                    style: Some(StyleHint::OnPath),
                }
            } else {
                node.clone()
            }
        })
        .collect()
}
