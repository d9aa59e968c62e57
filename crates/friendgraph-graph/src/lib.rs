//! Graph assembly, merge and shortest path.
//!
//! [`GraphAssembler`] walks the account cache the same way the crawl walked
//! the network and produces a [`Graph`]: display-name nodes, parent → child
//! edges, and an [`IndexedGraph`] for path search. Two graphs from separate
//! crawls are combined with [`merge_graphs`] and queried with
//! [`shortest_path`].

pub mod assembler;
pub mod indexed;
pub mod merge;
pub mod path;
pub mod types;

pub use assembler::GraphAssembler;
pub use indexed::{IndexedGraph, UserIndexMap};
pub use merge::{
    merge_edges, merge_graphs, merge_index_maps, merge_indexed_graphs, merge_nodes, MergedGraph,
};
pub use path::{apply_path_highlight, shortest_path, shortest_path_by_name};
pub use types::{Graph, GraphEdge, GraphNode, StyleHint};
