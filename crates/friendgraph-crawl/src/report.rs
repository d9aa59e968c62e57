//! Crawl summary.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use friendgraph_core::{AccountId, Rejection};

/// One job that could not be resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub account_id: AccountId,
    pub depth: u8,
    /// `None` for local failures (cache I/O, malformed identifiers).
    pub reason: Option<Rejection>,
    pub message: String,
}

/// What a crawl did: totals, per-level counts, failures.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub root: AccountId,
    pub depth_cap: u8,
    /// RFC 3339.
    pub started_at: String,
    pub duration_ms: u64,
    /// Jobs whose record was resolved and whose friends were considered.
    pub accounts_expanded: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    /// Friend-list entries seen across every expanded record.
    pub total_friends_seen: usize,
    /// Distinct accounts discovered, excluding the root.
    pub reachable_friends: usize,
    /// Friend-list entries seen, keyed by the level they were found at.
    pub friends_per_level: BTreeMap<u8, usize>,
    pub failures: Vec<JobFailure>,
    /// Redacted.
    pub revoked_credentials: Vec<String>,
}

impl CrawlReport {
    pub(crate) fn new(root: AccountId, depth_cap: u8) -> Self {
        Self {
            root,
            depth_cap,
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 0,
            accounts_expanded: 0,
            cache_hits: 0,
            fetched: 0,
            total_friends_seen: 0,
            reachable_friends: 0,
            friends_per_level: BTreeMap::new(),
            failures: Vec::new(),
            revoked_credentials: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.revoked_credentials.is_empty()
    }

    pub(crate) fn log_summary(&self) {
        info!(
            "Crawl of {} (depth {}) finished in {}ms: {} expanded, {} cache hits, {} fetched",
            self.root,
            self.depth_cap,
            self.duration_ms,
            self.accounts_expanded,
            self.cache_hits,
            self.fetched
        );
        info!(
            "Total friends: {} | Reachable friends: {} | Friends per level: {:?}",
            self.total_friends_seen, self.reachable_friends, self.friends_per_level
        );
        if !self.failures.is_empty() {
            warn!("{} accounts could not be crawled", self.failures.len());
        }
        if !self.revoked_credentials.is_empty() {
            warn!("Revoked API keys: {}", self.revoked_credentials.join(", "));
        }
    }
}
