//! Integer-indexed friendship graph for path search.
//!
//! Display names are mapped to dense `u32` indices starting at 1; index 0 is
//! never assigned. Every connection is stored as two unit-weight arcs.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::astar;
use petgraph::graphmap::DiGraphMap;

/// Bijection between display names and graph indices.
#[derive(Debug, Clone)]
pub struct UserIndexMap {
    next_index: u32,
    by_name: HashMap<String, u32>,
    by_index: BTreeMap<u32, String>,
}

impl Default for UserIndexMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserIndexMap {
    pub fn new() -> Self {
        Self {
            next_index: 1,
            by_name: HashMap::new(),
            by_index: BTreeMap::new(),
        }
    }

    /// Index for `name`, assigning the next free one if unseen.
    pub fn get_or_insert(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.by_name.get(name) {
            return idx;
        }
        let idx = self.next_index;
        self.next_index += 1;
        self.by_name.insert(name.to_string(), idx);
        self.by_index.insert(idx, name.to_string());
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, index: u32) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_index.iter().map(|(i, n)| (*i, n.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexedGraph {
    map: UserIndexMap,
    adjacency: DiGraphMap<u32, u32>,
}

impl IndexedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over an existing index map, with no arcs yet.
    pub fn with_map(map: UserIndexMap) -> Self {
        let mut adjacency = DiGraphMap::new();
        for (idx, _) in map.iter() {
            adjacency.add_node(idx);
        }
        Self { map, adjacency }
    }

    pub fn map(&self) -> &UserIndexMap {
        &self.map
    }

    /// Make sure `name` has an index and a vertex.
    pub fn add_user(&mut self, name: &str) -> u32 {
        let idx = self.map.get_or_insert(name);
        self.adjacency.add_node(idx);
        idx
    }

    /// Connect two users in both directions with unit weight.
    pub fn connect(&mut self, a: &str, b: &str) {
        let a = self.add_user(a);
        let b = self.add_user(b);
        self.insert_arc(a, b);
    }

    /// Insert `a ⇄ b`. Arcs touching the 0 sentinel are ignored.
    pub fn insert_arc(&mut self, a: u32, b: u32) {
        if a == 0 || b == 0 {
            return;
        }
        self.adjacency.add_edge(a, b, 1);
        self.adjacency.add_edge(b, a, 1);
    }

    pub fn has_arc(&self, a: u32, b: u32) -> bool {
        self.adjacency.contains_edge(a, b)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.adjacency.contains_node(index)
    }

    pub fn arcs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.adjacency.all_edges().map(|(a, b, _)| (a, b))
    }

    pub fn arc_count(&self) -> usize {
        self.adjacency.edge_count()
    }

    /// Minimum-weight index path from `start` to `end`, inclusive.
    ///
    /// A* with a zero heuristic, i.e. Dijkstra.
    pub fn shortest_index_path(&self, start: u32, end: u32) -> Option<Vec<u32>> {
        if !self.contains(start) || !self.contains(end) {
            return None;
        }
        astar(
            &self.adjacency,
            start,
            |n| n == end,
            |(_, _, w)| *w,
            |_| 0,
        )
        .map(|(_, path)| path)
    }

    /// Shortest path between two display names, as display names.
    pub fn shortest_name_path(&self, start: &str, end: &str) -> Option<Vec<String>> {
        let path = self.shortest_index_path(self.map.index_of(start)?, self.map.index_of(end)?)?;
        path.into_iter()
            .map(|idx| self.map.name_of(idx).map(str::to_string))
            .collect()
    }
}
