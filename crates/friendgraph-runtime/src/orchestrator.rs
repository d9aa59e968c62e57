//! Crawl, assemble, merge and persist.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use friendgraph_core::{
    targets_identifier, AccountId, CrawlSettings, Credential, DataPaths, Error, FriendGraphConfig,
    GraphSettings, Result,
};
use friendgraph_crawl::{CrawlEngine, CrawlReport};
use friendgraph_graph::{
    apply_path_highlight, merge_graphs, shortest_path, Graph, GraphAssembler,
};
use friendgraph_source::{AccountSource, ProfileSummary};
use friendgraph_store::{AccountCache, ShortLinkMap};

use crate::types::*;

/// Top-level driver shared by the CLI and the HTTP front door.
pub struct Orchestrator<S> {
    source: Arc<S>,
    cache: AccountCache,
    links: ShortLinkMap,
    paths: DataPaths,
    credentials: Vec<Credential>,
    crawl_settings: CrawlSettings,
    graph_settings: GraphSettings,
    always_regraph: bool,
}

impl<S: AccountSource> Orchestrator<S> {
    pub fn new(
        config: &FriendGraphConfig,
        source: Arc<S>,
        credentials: Vec<Credential>,
    ) -> Result<Self> {
        config.crawl.validate()?;
        if credentials.is_empty() {
            return Err(Error::Config("at least one API key is required".into()));
        }
        let paths = config.data_paths.clone();
        let cache = AccountCache::open(&paths.cache)?;
        let links = ShortLinkMap::open(&paths.link_map_file);

        info!(
            "Orchestrator initialized: data={}, depth={}, workers={}, keys={}",
            paths.root.display(),
            config.crawl.depth_cap,
            config.crawl.workers,
            credentials.len()
        );

        Ok(Self {
            source,
            cache,
            links,
            paths,
            credentials,
            crawl_settings: config.crawl.clone(),
            graph_settings: config.graph.clone(),
            always_regraph: config.always_regraph,
        })
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    /// Where the document for `short_id` lives.
    pub fn document_path(&self, short_id: &str) -> PathBuf {
        self.paths.finished_graphs.join(format!("{}.json", short_id))
    }

    /// Look up a finished document by its short id.
    pub fn document(&self, short_id: &str) -> Result<GraphDocument> {
        if self.links.identifier_for(short_id).is_none() {
            return Err(Error::NotFound(format!("no graph with id {}", short_id)));
        }
        GraphDocument::read_from(&self.document_path(short_id))
    }

    pub async fn crawl_one(&self, root: &AccountId) -> Result<CrawlOutcome> {
        self.run(&[root.clone()], self.crawl_settings.depth_cap).await
    }

    pub async fn crawl_two(&self, a: &AccountId, b: &AccountId) -> Result<CrawlOutcome> {
        self.run(&[a.clone(), b.clone()], self.crawl_settings.depth_cap)
            .await
    }

    /// Crawl one or two targets to `depth_cap` and write their graph document.
    ///
    /// An existing document for the same identifier is returned as is unless
    /// `always_regraph` is set.
    pub async fn run(&self, targets: &[AccountId], depth_cap: u8) -> Result<CrawlOutcome> {
        let targets = targets
            .iter()
            .map(|t| AccountId::parse(t.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let identifier = targets_identifier(&targets)?;

        let crawl_settings = CrawlSettings {
            depth_cap,
            ..self.crawl_settings.clone()
        };
        crawl_settings.validate()?;
        let graph_settings = GraphSettings {
            depth_cap,
            ..self.graph_settings.clone()
        };

        if !self.always_regraph {
            if let Some(outcome) = self.existing(&identifier) {
                info!("Reusing graph {} for {}", outcome.short_id, identifier);
                return Ok(outcome);
            }
        }

        let started = Instant::now();
        let engine = CrawlEngine::new(self.source.clone(), self.cache.clone(), crawl_settings);
        let assembler = GraphAssembler::new(self.cache.clone(), graph_settings);

        let (reports, document) = match targets.as_slice() {
            [root] => {
                let report = engine.crawl(root, &self.credentials).await?;
                let graph = assembler.build(root).await?;
                (vec![report], self.single_document(&identifier, graph))
            }
            [a, b] => {
                let (report_a, report_b) = tokio::try_join!(
                    engine.crawl(a, &self.credentials),
                    engine.crawl(b, &self.credentials)
                )?;
                let (graph_a, graph_b) = tokio::try_join!(assembler.build(a), assembler.build(b))?;
                (
                    vec![report_a, report_b],
                    self.paired_document(&identifier, a, b, &graph_a, &graph_b),
                )
            }
            _ => {
                return Err(Error::Internal(format!(
                    "unexpected target count {}",
                    targets.len()
                )))
            }
        };

        let (short_id, _) = self.links.get_or_create(&identifier)?;
        let document_path = self.document_path(&short_id);
        document.write_to(&document_path)?;

        info!(
            "Graph {} for {} written in {}ms ({} nodes, {} edges)",
            short_id,
            identifier,
            started.elapsed().as_millis(),
            document.nodes.len(),
            document.edges.len()
        );
        log_failures(&reports);

        let found = document.path.is_some();
        Ok(CrawlOutcome {
            identifier,
            short_id,
            reused: false,
            path: document.path,
            found,
            document_path,
            reports,
        })
    }

    fn existing(&self, identifier: &str) -> Option<CrawlOutcome> {
        let short_id = self.links.get(identifier)?;
        let document_path = self.document_path(&short_id);
        match GraphDocument::read_from(&document_path) {
            Ok(doc) => Some(CrawlOutcome {
                identifier: identifier.to_string(),
                short_id,
                reused: true,
                found: doc.path.is_some(),
                path: doc.path,
                document_path,
                reports: Vec::new(),
            }),
            Err(e) => {
                warn!("Mapping for {} exists but its document does not: {}", identifier, e);
                None
            }
        }
    }

    fn single_document(&self, identifier: &str, graph: Graph) -> GraphDocument {
        GraphDocument {
            identifier: identifier.to_string(),
            nodes: graph.nodes,
            edges: graph.edges,
            path: None,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn paired_document(
        &self,
        identifier: &str,
        a: &AccountId,
        b: &AccountId,
        graph_a: &Graph,
        graph_b: &Graph,
    ) -> GraphDocument {
        let merged = merge_graphs(graph_a, graph_b);
        let path = shortest_path(&self.cache, &merged.indexed, a, b);
        let nodes = match &path {
            Some(p) => {
                info!("Shortest path {} -> {}: {}", a, b, p.join(" -> "));
                apply_path_highlight(&merged.nodes, p)
            }
            None => {
                info!("No path between {} and {}", a, b);
                merged.nodes
            }
        };

        GraphDocument {
            identifier: identifier.to_string(),
            nodes,
            edges: merged.edges,
            path,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Check every configured credential.
    pub async fn check_credentials(&self) -> Vec<CredentialCheck> {
        let mut checks = Vec::with_capacity(self.credentials.len());
        for credential in &self.credentials {
            let status = self.source.validate_credential(credential).await;
            checks.push(CredentialCheck {
                key: credential.redacted(),
                status,
            });
        }
        checks
    }

    /// Profile summary for one account, fetched with the first credential.
    pub async fn profile(&self, id: &AccountId) -> Result<ProfileSummary> {
        let id = AccountId::parse(id.as_str())?;
        let credential = self
            .credentials
            .first()
            .ok_or_else(|| Error::Config("at least one API key is required".into()))?;
        let mut summaries = self
            .source
            .fetch_profile_summaries(std::slice::from_ref(&id), credential)
            .await?;
        summaries
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("no profile for {}", id)))
    }
}

fn log_failures(reports: &[CrawlReport]) {
    for report in reports {
        for failure in &report.failures {
            warn!(
                "  {} (depth {}) not crawled: {}",
                failure.account_id, failure.depth, failure.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use friendgraph_graph::StyleHint;
    use friendgraph_source::{CredentialStatus, InMemorySource};

    fn id(n: u32) -> AccountId {
        AccountId::new(format!("765611980000{:05}", n))
    }

    fn keys() -> Vec<Credential> {
        vec![Credential::new("KEY-AAAA"), Credential::new("KEY-BBBB")]
    }

    /// alice(1) - bob(2) - carol(3), dave(4) alone with erin(5).
    fn source() -> Arc<InMemorySource> {
        let source = InMemorySource::new();
        source.befriend(&id(1), &id(2));
        source.befriend(&id(2), &id(3));
        source.befriend(&id(4), &id(5));
        for (n, name) in [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave"), (5, "erin")] {
            source.add_account(id(n), name);
        }
        Arc::new(source)
    }

    fn orchestrator(
        dir: &std::path::Path,
        source: &Arc<InMemorySource>,
        always_regraph: bool,
    ) -> Orchestrator<InMemorySource> {
        let mut config = FriendGraphConfig::new(dir).unwrap();
        config.crawl.depth_cap = 1;
        config.graph.depth_cap = 1;
        config.always_regraph = always_regraph;
        Orchestrator::new(&config, source.clone(), keys()).unwrap()
    }

    #[tokio::test]
    async fn test_crawl_one_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let orch = orchestrator(dir.path(), &source, false);

        let outcome = orch.crawl_one(&id(2)).await.unwrap();
        assert_eq!(outcome.identifier, id(2).to_string());
        assert!(!outcome.reused);
        assert!(!outcome.found);
        assert!(outcome.document_path.exists());

        let doc = orch.document(&outcome.short_id).unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.nodes[0].name, "bob");
        assert_eq!(doc.nodes[0].style, Some(StyleHint::Root));
        assert!(doc.path.is_none());
    }

    #[tokio::test]
    async fn test_existing_mapping_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let orch = orchestrator(dir.path(), &source, false);

        let first = orch.crawl_one(&id(1)).await.unwrap();
        let calls = source.total_calls();
        let second = orch.crawl_one(&id(1)).await.unwrap();

        assert!(second.reused);
        assert_eq!(second.short_id, first.short_id);
        assert_eq!(source.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_always_regraph_rebuilds_under_same_short_id() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let first = orchestrator(dir.path(), &source, false)
            .crawl_one(&id(1))
            .await
            .unwrap();

        let again = orchestrator(dir.path(), &source, true)
            .crawl_one(&id(1))
            .await
            .unwrap();
        assert!(!again.reused);
        assert_eq!(again.short_id, first.short_id);
        assert_eq!(again.reports.len(), 1);
    }

    #[tokio::test]
    async fn test_crawl_two_finds_path_in_either_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let orch = orchestrator(dir.path(), &source, false);

        let outcome = orch.crawl_two(&id(3), &id(1)).await.unwrap();
        assert!(outcome.found);
        assert_eq!(outcome.identifier, format!("{},{}", id(1), id(3)));
        // Path runs from the first target given to the second.
        assert_eq!(
            outcome.path.as_deref().unwrap(),
            &["carol".to_string(), "bob".to_string(), "alice".to_string()]
        );

        let doc = orch.document(&outcome.short_id).unwrap();
        let on_path = doc
            .nodes
            .iter()
            .filter(|n| n.style == Some(StyleHint::OnPath))
            .count();
        assert_eq!(on_path, 3);

        let swapped = orch.crawl_two(&id(1), &id(3)).await.unwrap();
        assert!(swapped.reused);
        assert_eq!(swapped.short_id, outcome.short_id);
    }

    #[tokio::test]
    async fn test_crawl_two_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let orch = orchestrator(dir.path(), &source, false);

        let outcome = orch.crawl_two(&id(1), &id(4)).await.unwrap();
        assert!(!outcome.found);
        assert!(outcome.path.is_none());
        let doc = orch.document(&outcome.short_id).unwrap();
        assert!(doc.nodes.iter().all(|n| n.style != Some(StyleHint::OnPath)));
        let roots = doc
            .nodes
            .iter()
            .filter(|n| n.style == Some(StyleHint::Root))
            .count();
        assert_eq!(roots, 2);
    }

    #[tokio::test]
    async fn test_invalid_targets_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let orch = orchestrator(dir.path(), &source, false);

        assert!(matches!(
            orch.crawl_one(&AccountId::new("123")).await,
            Err(Error::InvalidAccountId(_))
        ));
        assert!(matches!(orch.run(&[], 2).await, Err(Error::Config(_))));
        assert!(matches!(orch.run(&[id(1)], 9).await, Err(Error::Config(_))));
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_check_credentials_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        source.reject_credential(&keys()[1]);
        let orch = orchestrator(dir.path(), &source, false);

        let checks = orch.check_credentials().await;
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].status, CredentialStatus::Valid);
        assert_eq!(checks[1].status, CredentialStatus::Invalid);
        assert_eq!(checks[1].key, "…BBBB");

        let profile = orch.profile(&id(3)).await.unwrap();
        assert_eq!(profile.display_name, "carol");
        assert!(matches!(orch.profile(&id(9)).await, Err(Error::NotFound(_))));
    }
}
