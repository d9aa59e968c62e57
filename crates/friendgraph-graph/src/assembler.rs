//! Graph assembly from the account cache.
//!
//! Same bounded breadth-first walk as the crawl, but reading only cached
//! records. Loads run concurrently on the blocking pool; nodes, edges and
//! indices are built on the driver task as each load settles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, info, warn};

use friendgraph_core::{
    run_bounded, AccountId, Error, FriendRecord, Frontier, GraphSettings, Result, Settled,
};
use friendgraph_store::AccountCache;

use crate::indexed::IndexedGraph;
use crate::types::{Graph, GraphEdge, GraphNode};

pub struct GraphAssembler {
    cache: AccountCache,
    settings: GraphSettings,
}

#[derive(Clone)]
struct Visit {
    depth: u8,
    id: AccountId,
    /// Name the account was discovered under; its own record may disagree.
    name: String,
}

impl GraphAssembler {
    pub fn new(cache: AccountCache, settings: GraphSettings) -> Self {
        Self { cache, settings }
    }

    /// Assemble the graph rooted at `root` from whatever the cache holds.
    ///
    /// The root's record must exist. Any other missing or unreadable record
    /// leaves that account as a leaf.
    pub async fn build(&self, root: &AccountId) -> Result<Graph> {
        self.settings.validate()?;
        let started = Instant::now();

        let cache = self.cache.clone();
        let key = root.clone();
        let root_record = tokio::task::spawn_blocking(move || cache.load(&key))
            .await
            .map_err(|e| Error::Internal(format!("cache task failed: {}", e)))??;

        let root_name = root_record.display_name().to_string();
        let mut state = AssemblyState::new(root, &root_name, &self.settings);

        let work = {
            let cache = self.cache.clone();
            move |visit: Visit| {
                let cache = cache.clone();
                async move {
                    let loaded = tokio::task::spawn_blocking({
                        let id = visit.id.clone();
                        move || cache.load(&id)
                    })
                    .await
                    .unwrap_or_else(|e| Err(Error::Internal(e.to_string())));
                    (visit, loaded)
                }
            }
        };

        // The root was loaded above; seed with its record directly.
        let mut seed_frontier = Vec::new();
        state.expand(1, &root_name, &root_record, &mut |v| seed_frontier.push(v));

        let stats = run_bounded(seed_frontier, self.settings.workers, work, |settled, frontier| {
            match settled {
                Settled::Finished((visit, loaded)) => state.settle(visit, loaded, frontier),
                Settled::Panicked(visit) => {
                    warn!("[depth {}] reading {} panicked, left as a leaf", visit.depth, visit.id)
                }
            }
            Ok(())
        })
        .await?;

        let graph = state.finish(root.clone());
        info!(
            "Assembled graph for {} in {}ms: {} nodes, {} edges, {} records read",
            root,
            started.elapsed().as_millis(),
            graph.nodes.len(),
            graph.edges.len(),
            stats.settled + 1
        );
        Ok(graph)
    }
}

struct AssemblyState {
    depth_cap: u8,
    include_frontier: bool,
    root_name: String,
    nodes: Vec<GraphNode>,
    node_names: HashSet<String>,
    edges: Vec<GraphEdge>,
    edge_set: HashSet<GraphEdge>,
    indexed: IndexedGraph,
    id_to_name: BTreeMap<AccountId, String>,
    min_depth: HashMap<AccountId, u8>,
}

impl AssemblyState {
    fn new(root: &AccountId, root_name: &str, settings: &GraphSettings) -> Self {
        let mut state = Self {
            depth_cap: settings.depth_cap,
            include_frontier: settings.include_frontier,
            root_name: root_name.to_string(),
            nodes: Vec::new(),
            node_names: HashSet::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
            indexed: IndexedGraph::new(),
            id_to_name: BTreeMap::new(),
            min_depth: HashMap::from([(root.clone(), 1)]),
        };
        state.add_node(GraphNode::root(root_name));
        state.indexed.add_user(root_name);
        state.id_to_name.insert(root.clone(), root_name.to_string());
        state
    }

    fn add_node(&mut self, node: GraphNode) {
        if self.node_names.insert(node.name.clone()) {
            self.nodes.push(node);
        }
    }

    fn settle(&mut self, visit: Visit, loaded: Result<FriendRecord>, frontier: &mut Frontier<Visit>) {
        match loaded {
            Ok(record) => self.expand(visit.depth, &visit.name, &record, &mut |v| frontier.push(v)),
            Err(Error::NotFound(_)) => {
                debug!("[depth {}] {} not cached, left as a leaf", visit.depth, visit.id);
            }
            Err(e) => warn!("[depth {}] unreadable record for {}: {}", visit.depth, visit.id, e),
        }
    }

    /// Add `record`'s friends as nodes and edges, and hand back the ones
    /// that still need their own record read.
    ///
    /// Edges start at `parent`, the node the account already has, so a
    /// renamed account never splits into two vertices.
    fn expand(
        &mut self,
        depth: u8,
        parent: &str,
        record: &FriendRecord,
        enqueue: &mut dyn FnMut(Visit),
    ) {
        let parent = parent.to_string();
        let child_depth = depth + 1;
        if child_depth > self.depth_cap && !self.include_frontier {
            return;
        }

        for friend in &record.friends {
            // First name seen for an account is the one it keeps.
            let child = self
                .id_to_name
                .entry(friend.account_id.clone())
                .or_insert_with(|| friend.display_name().to_string())
                .clone();
            self.add_node(GraphNode::new(child.clone()));

            let edge = GraphEdge::new(parent.clone(), child.clone());
            if self.edge_set.insert(edge.clone()) {
                self.edges.push(edge);
            }
            self.indexed.connect(&parent, &child);

            if child_depth > self.depth_cap {
                continue;
            }
            match self.min_depth.get(&friend.account_id) {
                Some(&seen) if seen <= child_depth => {}
                _ => {
                    self.min_depth.insert(friend.account_id.clone(), child_depth);
                    enqueue(Visit {
                        depth: child_depth,
                        id: friend.account_id.clone(),
                        name: child.clone(),
                    });
                }
            }
        }
    }

    fn finish(self, root: AccountId) -> Graph {
        Graph {
            root,
            root_name: self.root_name,
            nodes: self.nodes,
            edges: self.edges,
            indexed: self.indexed,
            id_to_name: self.id_to_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StyleHint;
    use friendgraph_core::FriendEdge;

    fn id(n: u32) -> AccountId {
        AccountId::new(format!("765611980000{:05}", n))
    }

    fn seed(cache: &AccountCache, n: u32, name: &str, friends: &[(u32, &str)]) {
        let record = FriendRecord {
            account_id: id(n),
            username: name.into(),
            friends: friends
                .iter()
                .map(|(f, fname)| FriendEdge {
                    username: fname.to_string(),
                    ..FriendEdge::new(id(*f))
                })
                .collect(),
        };
        cache.store(&id(n), &record).unwrap();
    }

    /// R(1) - F1(2), R - F2(3), F1 - M(4), F2 - M, as a depth-2 crawl leaves it.
    fn diamond_cache(dir: &std::path::Path) -> AccountCache {
        let cache = AccountCache::open(dir).unwrap();
        seed(&cache, 1, "R", &[(2, "F1"), (3, "F2")]);
        seed(&cache, 2, "F1", &[(1, "R"), (4, "M")]);
        seed(&cache, 3, "F2", &[(1, "R"), (4, "M")]);
        cache
    }

    fn settings(depth_cap: u8, include_frontier: bool) -> GraphSettings {
        GraphSettings {
            depth_cap,
            workers: 3,
            include_frontier,
        }
    }

    fn edge(a: &str, b: &str) -> GraphEdge {
        GraphEdge::new(a, b)
    }

    #[tokio::test]
    async fn test_diamond_with_frontier() {
        let dir = tempfile::tempdir().unwrap();
        let cache = diamond_cache(dir.path());
        let graph = GraphAssembler::new(cache, settings(2, true))
            .build(&id(1))
            .await
            .unwrap();

        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names.len(), 4);
        for expected in ["R", "F1", "F2", "M"] {
            assert!(names.contains(&expected));
        }
        assert_eq!(graph.node("R").unwrap().style, Some(StyleHint::Root));
        assert_eq!(graph.node("M").unwrap().style, None);

        for e in [edge("R", "F1"), edge("R", "F2"), edge("F1", "M"), edge("F2", "M")] {
            assert!(graph.edges.contains(&e), "missing {:?}", e);
        }
        assert_eq!(
            graph.indexed.shortest_name_path("F1", "F2").unwrap().len(),
            3
        );
        assert_eq!(graph.id_to_name[&id(4)], "M");
    }

    #[tokio::test]
    async fn test_strict_depth_excludes_frontier() {
        let dir = tempfile::tempdir().unwrap();
        let cache = diamond_cache(dir.path());
        let graph = GraphAssembler::new(cache, settings(2, false))
            .build(&id(1))
            .await
            .unwrap();

        assert_eq!(graph.nodes.len(), 3);
        assert!(graph.node("M").is_none());
        assert_eq!(graph.edges, vec![edge("R", "F1"), edge("R", "F2")]);
    }

    #[tokio::test]
    async fn test_depth_one_is_root_and_friends() {
        let dir = tempfile::tempdir().unwrap();
        let cache = diamond_cache(dir.path());
        let graph = GraphAssembler::new(cache, settings(1, true))
            .build(&id(1))
            .await
            .unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_node_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccountCache::open(dir.path()).unwrap();
        // Complete graph on five accounts: every name is reachable many ways.
        for a in 1..=5u32 {
            let friends: Vec<(u32, String)> = (1..=5u32)
                .filter(|b| *b != a)
                .map(|b| (b, format!("user{}", b)))
                .collect();
            let borrowed: Vec<(u32, &str)> =
                friends.iter().map(|(b, n)| (*b, n.as_str())).collect();
            seed(&cache, a, &format!("user{}", a), &borrowed);
        }

        let graph = GraphAssembler::new(cache, settings(4, true))
            .build(&id(1))
            .await
            .unwrap();

        let unique: HashSet<_> = graph.nodes.iter().map(|n| n.name.clone()).collect();
        assert_eq!(unique.len(), graph.nodes.len());
        assert_eq!(graph.nodes.len(), 5);
        let unique_edges: HashSet<_> = graph.edges.iter().cloned().collect();
        assert_eq!(unique_edges.len(), graph.edges.len());
        assert_eq!(graph.edges.len(), 20);
    }

    #[tokio::test]
    async fn test_missing_records_become_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccountCache::open(dir.path()).unwrap();
        seed(&cache, 1, "R", &[(2, ""), (3, "F2")]);

        let graph = GraphAssembler::new(cache, settings(3, true))
            .build(&id(1))
            .await
            .unwrap();
        // Unnamed friends are shown by id.
        assert!(graph.node(id(2).as_str()).is_some());
        assert_eq!(graph.nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_renamed_account_keeps_discovered_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccountCache::open(dir.path()).unwrap();
        // R's record predates the rename; id(2)'s own record has the old name.
        seed(&cache, 1, "R", &[(2, "F1new")]);
        seed(&cache, 2, "F1old", &[(1, "Rold"), (4, "M")]);

        let graph = GraphAssembler::new(cache, settings(2, true))
            .build(&id(1))
            .await
            .unwrap();

        let names: HashSet<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, HashSet::from(["R", "F1new", "M"]));
        for e in &graph.edges {
            assert!(names.contains(e.source.as_str()), "dangling {:?}", e);
            assert!(names.contains(e.target.as_str()), "dangling {:?}", e);
        }
        assert!(graph.edges.contains(&edge("F1new", "M")));
        assert!(graph.edges.contains(&edge("F1new", "R")));
        assert_eq!(graph.indexed.map().len(), 3);
        assert_eq!(
            graph.indexed.shortest_name_path("R", "M").unwrap(),
            vec!["R", "F1new", "M"]
        );
    }

    #[tokio::test]
    async fn test_uncrawled_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AccountCache::open(dir.path()).unwrap();
        let err = GraphAssembler::new(cache, settings(2, true))
            .build(&id(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
