//! Crawl engine.
//!
//! The coordinator seeds the root job at depth 1 and hands jobs to at most
//! `workers` concurrent resolvers through [`friendgraph_core::run_bounded`].
//! Every finished job comes back to the coordinator, which expands its
//! friends into new jobs (while `depth + 1 <= depth_cap`), assigns
//! credentials round-robin and records failures. The crawl is complete when
//! nothing is queued and nothing is in flight.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use friendgraph_core::{
    run_bounded, AccountId, CrawlSettings, Credential, Error, Frontier, Rejection, Result,
    Settled,
};
use friendgraph_source::AccountSource;
use friendgraph_store::AccountCache;

use crate::credentials::CredentialRing;
use crate::report::{CrawlReport, JobFailure};
use crate::resolve::{resolve_record, Resolved};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// One unit of crawl work.
#[derive(Debug, Clone)]
pub struct Job {
    /// 1 for the root, +1 per expansion.
    pub depth: u8,
    pub origin: AccountId,
    pub target: AccountId,
    pub credential: Credential,
}

struct JobOutcome {
    job: Job,
    result: Result<Resolved>,
}

pub struct CrawlEngine<S> {
    source: Arc<S>,
    cache: AccountCache,
    settings: CrawlSettings,
    retry_backoff: Duration,
}

impl<S: AccountSource> CrawlEngine<S> {
    pub fn new(source: Arc<S>, cache: AccountCache, settings: CrawlSettings) -> Self {
        Self {
            source,
            cache,
            settings,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Base delay between transient retries; attempt `n` waits `n * backoff`.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Crawl from `root`, caching a record for every account expanded.
    ///
    /// Configuration problems and a malformed root are rejected before any
    /// remote call. A root that cannot be resolved, or running out of usable
    /// credentials, fails the crawl; any other job failure is recorded in
    /// the report and the crawl carries on.
    pub async fn crawl(&self, root: &AccountId, credentials: &[Credential]) -> Result<CrawlReport> {
        self.settings.validate()?;
        let mut ring = CredentialRing::new(credentials)?;
        let root = AccountId::parse(root.as_str())?;

        let started = Instant::now();
        let depth_cap = self.settings.depth_cap;
        info!(
            "Crawling {} to depth {} with {} workers and {} keys",
            root,
            depth_cap,
            self.settings.workers,
            credentials.len()
        );

        let root_credential = ring
            .next()
            .ok_or_else(|| Error::Config("no usable API keys".into()))?;
        let root_job = Job {
            depth: 1,
            origin: root.clone(),
            target: root.clone(),
            credential: root_credential,
        };

        let mut state = CrawlState {
            depth_cap,
            ring,
            min_depth: HashMap::from([(root.clone(), 1)]),
            discovered: HashSet::from([root.clone()]),
            report: CrawlReport::new(root.clone(), depth_cap),
        };

        let work = {
            let source = self.source.clone();
            let cache = self.cache.clone();
            let force = self.settings.force_recrawl;
            let retries = self.settings.transient_retries;
            let backoff = self.retry_backoff;
            move |job: Job| {
                let source = source.clone();
                let cache = cache.clone();
                async move {
                    let started = Instant::now();
                    let result =
                        resolve_with_retry(&*source, &cache, &job, force, retries, backoff).await;
                    log_call(&job, &result, started.elapsed());
                    JobOutcome { job, result }
                }
            }
        };

        let outcome = run_bounded([root_job], self.settings.workers, work, |settled, frontier| {
            match settled {
                Settled::Finished(out) => state.settle(out, frontier),
                Settled::Panicked(job) => state.settle_panicked(job),
            }
        })
        .await;

        let mut report = state.finish();
        report.duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(stats) => {
                debug!(
                    "Crawl fan-out: {} jobs, peak queue {}",
                    stats.spawned, stats.peak_queued
                );
                report.log_summary();
                Ok(report)
            }
            Err(e) => {
                warn!(
                    "Crawl of {} aborted after {}ms with {} failures: {}",
                    report.root,
                    report.duration_ms,
                    report.failures.len(),
                    e
                );
                Err(e)
            }
        }
    }
}

async fn resolve_with_retry<S: AccountSource>(
    source: &S,
    cache: &AccountCache,
    job: &Job,
    force: bool,
    retries: u32,
    backoff: Duration,
) -> Result<Resolved> {
    let mut attempt = 0;
    loop {
        match resolve_record(source, cache, &job.target, &job.credential, force).await {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(
                    "Transient failure for {} (attempt {}/{}): {}",
                    job.target, attempt, retries, e
                );
                tokio::time::sleep(backoff * attempt).await;
            }
            other => return other,
        }
    }
}

fn log_call(job: &Job, result: &Result<Resolved>, elapsed: Duration) {
    match result {
        Ok(resolved) => {
            let status = if resolved.from_cache { "cached" } else { "fetched" };
            debug!(
                "[depth {}] {} ({}) {} {} friends in {}ms",
                job.depth,
                job.target,
                resolved.record.display_name(),
                status,
                resolved.record.friends.len(),
                elapsed.as_millis()
            );
        }
        Err(e) => {
            debug!(
                "[depth {}] {} failed with key {} in {}ms: {}",
                job.depth,
                job.target,
                job.credential,
                elapsed.as_millis(),
                e
            );
        }
    }
}

// ---------------------------------------------------------------
// Coordinator state
// ---------------------------------------------------------------

struct CrawlState {
    depth_cap: u8,
    ring: CredentialRing,
    /// Smallest depth each account has been enqueued at.
    min_depth: HashMap<AccountId, u8>,
    discovered: HashSet<AccountId>,
    report: CrawlReport,
}

impl CrawlState {
    fn settle(&mut self, outcome: JobOutcome, frontier: &mut Frontier<Job>) -> Result<()> {
        let JobOutcome { job, result } = outcome;
        match result {
            Ok(resolved) => {
                self.expand(&job, resolved, frontier);
                Ok(())
            }
            Err(e) if e.rejection() == Some(Rejection::InvalidCredential) => {
                self.requeue_after_revocation(job, e, frontier)
            }
            Err(e) if job.depth == 1 => Err(e),
            Err(e) => {
                self.record_failure(&job, &e);
                Ok(())
            }
        }
    }

    /// A worker died mid-job. Treated like any other failure of that job.
    fn settle_panicked(&mut self, job: Job) -> Result<()> {
        let error = Error::Internal(format!("worker for {} panicked", job.target));
        if job.depth == 1 {
            return Err(error);
        }
        self.record_failure(&job, &error);
        Ok(())
    }

    fn expand(&mut self, job: &Job, resolved: Resolved, frontier: &mut Frontier<Job>) {
        self.report.accounts_expanded += 1;
        if resolved.from_cache {
            self.report.cache_hits += 1;
        } else {
            self.report.fetched += 1;
        }

        let child_depth = job.depth + 1;
        for friend in &resolved.record.friends {
            self.report.total_friends_seen += 1;
            *self.report.friends_per_level.entry(child_depth).or_insert(0) += 1;
            self.discovered.insert(friend.account_id.clone());

            if child_depth > self.depth_cap {
                continue;
            }
            match self.min_depth.get(&friend.account_id) {
                Some(&seen) if seen <= child_depth => continue,
                _ => {}
            }
            // Only reachable while at least one credential is active.
            let Some(credential) = self.ring.next() else {
                continue;
            };
            self.min_depth.insert(friend.account_id.clone(), child_depth);
            frontier.push(Job {
                depth: child_depth,
                origin: job.origin.clone(),
                target: friend.account_id.clone(),
                credential,
            });
        }
    }

    fn requeue_after_revocation(
        &mut self,
        job: Job,
        error: Error,
        frontier: &mut Frontier<Job>,
    ) -> Result<()> {
        if self.ring.revoke(&job.credential) {
            warn!(
                "API key {} rejected, {} keys left in rotation",
                job.credential,
                self.ring.active()
            );
        }

        match self.ring.next() {
            Some(credential) => {
                frontier.push_front(Job { credential, ..job });
                Ok(())
            }
            None => {
                self.record_failure(&job, &error);
                for pending in frontier.drain() {
                    self.record_failure(&pending, &error);
                }
                Err(Error::InvalidCredential(format!(
                    "every API key was rejected ({} accounts not crawled)",
                    self.report.failures.len()
                )))
            }
        }
    }

    fn record_failure(&mut self, job: &Job, error: &Error) {
        warn!("[depth {}] skipping {}: {}", job.depth, job.target, error);
        self.report.failures.push(JobFailure {
            account_id: job.target.clone(),
            depth: job.depth,
            reason: error.rejection(),
            message: error.to_string(),
        });
    }

    fn finish(self) -> CrawlReport {
        let mut report = self.report;
        report.reachable_friends = self.discovered.len().saturating_sub(1);
        report.revoked_credentials = self.ring.revoked().iter().map(Credential::redacted).collect();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use friendgraph_source::InMemorySource;

    fn id(n: u32) -> AccountId {
        AccountId::new(format!("765611980000{:05}", n))
    }

    fn keys(n: usize) -> Vec<Credential> {
        (0..n).map(|i| Credential::new(format!("KEY-{:04}", i))).collect()
    }

    fn settings(depth_cap: u8, workers: usize) -> CrawlSettings {
        CrawlSettings {
            depth_cap,
            workers,
            ..Default::default()
        }
    }

    fn engine(
        source: &Arc<InMemorySource>,
        dir: &std::path::Path,
        settings: CrawlSettings,
    ) -> CrawlEngine<InMemorySource> {
        CrawlEngine::new(source.clone(), AccountCache::open(dir).unwrap(), settings)
            .with_retry_backoff(Duration::from_millis(1))
    }

    /// 1 - 2 - 3 - 4 - 5 - 6
    fn chain() -> Arc<InMemorySource> {
        let source = InMemorySource::new();
        for n in 1..6 {
            source.befriend(&id(n), &id(n + 1));
        }
        for n in 1..=6 {
            source.add_account(id(n), &format!("user{}", n));
        }
        Arc::new(source)
    }

    /// R with friends F1, F2 who share M.
    fn diamond() -> Arc<InMemorySource> {
        let source = InMemorySource::new();
        source.befriend(&id(1), &id(2));
        source.befriend(&id(1), &id(3));
        source.befriend(&id(2), &id(4));
        source.befriend(&id(3), &id(4));
        for (n, name) in [(1, "R"), (2, "F1"), (3, "F2"), (4, "M")] {
            source.add_account(id(n), name);
        }
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_depth_bound() {
        for depth in 1..=4u8 {
            let dir = tempfile::tempdir().unwrap();
            let source = chain();
            let engine = engine(&source, dir.path(), settings(depth, 4));
            engine.crawl(&id(1), &keys(1)).await.unwrap();

            let cached = AccountCache::open(dir.path()).unwrap().cached_ids().unwrap();
            let expected: Vec<_> = (1..=depth as u32).map(id).collect();
            assert_eq!(cached, expected, "depth cap {}", depth);
            assert_eq!(source.friend_list_calls(), depth as usize);
        }
    }

    #[tokio::test]
    async fn test_records_carry_display_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        let engine = engine(&source, dir.path(), settings(2, 4));
        let report = engine.crawl(&id(1), &keys(2)).await.unwrap();

        let cache = AccountCache::open(dir.path()).unwrap();
        let root = cache.load(&id(1)).unwrap();
        assert_eq!(root.username, "R");
        let names: Vec<_> = root.friends.iter().map(|f| f.username.as_str()).collect();
        assert_eq!(names, vec!["F1", "F2"]);
        assert_eq!(cache.load(&id(2)).unwrap().friends[1].username, "M");

        assert_eq!(report.accounts_expanded, 3);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.reachable_friends, 3);
        assert_eq!(report.friends_per_level.get(&2), Some(&2));
        assert_eq!(report.friends_per_level.get(&3), Some(&4));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_second_crawl_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        let engine = engine(&source, dir.path(), settings(3, 4));

        engine.crawl(&id(1), &keys(1)).await.unwrap();
        let calls = source.total_calls();
        let cache = AccountCache::open(dir.path()).unwrap();
        let before: Vec<_> = (1..=4).map(|n| cache.load(&id(n)).unwrap()).collect();

        let report = engine.crawl(&id(1), &keys(1)).await.unwrap();
        assert_eq!(source.total_calls(), calls);
        assert_eq!(report.fetched, 0);
        assert_eq!(report.cache_hits, report.accounts_expanded);

        let after: Vec<_> = (1..=4).map(|n| cache.load(&id(n)).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_force_recrawl_bypasses_reads_but_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        engine(&source, dir.path(), settings(1, 2))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();
        let calls = source.friend_list_calls();

        source.add_account(id(1), "renamed");
        let forced = CrawlSettings {
            force_recrawl: true,
            ..settings(1, 2)
        };
        let report = engine(&source, dir.path(), forced)
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();

        assert_eq!(source.friend_list_calls(), calls + 1);
        assert_eq!(report.fetched, 1);
        let cache = AccountCache::open(dir.path()).unwrap();
        assert_eq!(cache.load(&id(1)).unwrap().username, "R");
    }

    #[tokio::test]
    async fn test_terminates_on_dense_cyclic_graph() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new().with_latency(Duration::from_millis(1));
        for a in 1..=8 {
            for b in (a + 1)..=8 {
                source.befriend(&id(a), &id(b));
            }
        }
        let source = Arc::new(source);
        let engine = engine(&source, dir.path(), settings(4, 3));

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            engine.crawl(&id(1), &keys(3)),
        )
        .await
        .expect("crawl did not terminate")
        .unwrap();

        assert_eq!(report.reachable_friends, 7);
        // Dedup by minimum depth: each account is fetched exactly once.
        assert_eq!(report.fetched, 8);
        assert_eq!(source.friend_list_calls(), 8);
    }

    #[tokio::test]
    async fn test_credentials_rotate_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(InMemorySource::new());
        for n in 2..=8 {
            source.befriend(&id(1), &id(n));
        }
        let creds = keys(3);
        // One worker: jobs run in the order they were enqueued.
        engine(&source, dir.path(), settings(2, 1))
            .crawl(&id(1), &creds)
            .await
            .unwrap();

        let log = source.call_log();
        assert_eq!(log.len(), 8);
        assert_eq!(log[0].0, id(1));
        for (i, (_, cred)) in log.iter().enumerate() {
            assert_eq!(cred, &creds[i % creds.len()], "job {}", i);
        }
    }

    #[tokio::test]
    async fn test_rejected_credential_is_revoked_and_job_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        let creds = keys(2);
        source.reject_credential(&creds[0]);

        let report = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &creds)
            .await
            .unwrap();

        assert_eq!(report.revoked_credentials, vec![creds[0].redacted()]);
        assert!(report.failures.is_empty());
        assert_eq!(report.accounts_expanded, 3);
        let cache = AccountCache::open(dir.path()).unwrap();
        assert!(cache.exists(&id(2)) && cache.exists(&id(3)));
    }

    #[tokio::test]
    async fn test_all_credentials_rejected_fails_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        let creds = keys(2);
        for c in &creds {
            source.reject_credential(c);
        }

        let err = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &creds)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential(_)));
        assert!(!AccountCache::open(dir.path()).unwrap().exists(&id(1)));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        source.fail_transiently(&id(2), 2);
        let retrying = CrawlSettings {
            transient_retries: 2,
            ..settings(2, 2)
        };

        let report = engine(&source, dir.path(), retrying)
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();
        assert!(report.failures.is_empty());
        assert!(AccountCache::open(dir.path()).unwrap().exists(&id(2)));
    }

    #[tokio::test]
    async fn test_child_failures_are_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        source.fail_transiently(&id(2), 1);
        source.reject_account(&id(3));

        let report = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 2);
        let transient = report
            .failures
            .iter()
            .find(|f| f.account_id == id(2))
            .unwrap();
        assert_eq!(transient.reason, Some(Rejection::Transient));
        let private = report
            .failures
            .iter()
            .find(|f| f.account_id == id(3))
            .unwrap();
        assert_eq!(private.reason, Some(Rejection::InvalidAccount));
        assert_eq!(private.depth, 2);
        assert!(AccountCache::open(dir.path()).unwrap().exists(&id(1)));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        source.crash_on(&id(2));

        let report = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        let crashed = &report.failures[0];
        assert_eq!(crashed.account_id, id(2));
        assert_eq!(crashed.depth, 2);
        assert_eq!(crashed.reason, None);
        assert!(crashed.message.contains("panicked"));
        // The sibling is still crawled.
        assert!(AccountCache::open(dir.path()).unwrap().exists(&id(3)));
    }

    #[tokio::test]
    async fn test_root_failure_fails_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        source.reject_account(&id(1));
        let err = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAccount(_)));
    }

    #[tokio::test]
    async fn test_bad_configuration_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();

        let err = engine(&source, dir.path(), settings(5, 2))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = engine(&source, dir.path(), settings(2, 0))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = engine(&source, dir.path(), settings(2, 2))
            .crawl(&id(1), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = engine(&source, dir.path(), settings(2, 2))
            .crawl(&AccountId::new("not-an-id"), &keys(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAccountId(_)));

        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_report_serializes_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let source = diamond();
        let report = engine(&source, dir.path(), settings(1, 1))
            .crawl(&id(1), &keys(1))
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["depthCap"], 1);
        assert_eq!(json["accountsExpanded"], 1);
        assert!(json["startedAt"].is_string());
    }
}
