//! Deterministic in-process account source.
//!
//! Used by tests across the workspace. All state sits behind `parking_lot`
//! locks so the source can be shared by every crawl worker through an `Arc`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use friendgraph_core::{AccountId, Credential, Error, FriendEdge, Result};

use crate::{AccountSource, CredentialStatus, ProfileSummary, SUMMARY_BATCH_LIMIT};

#[derive(Debug, Clone, Default)]
struct Account {
    name: String,
    friends: Vec<AccountId>,
}

#[derive(Default)]
pub struct InMemorySource {
    accounts: RwLock<HashMap<AccountId, Account>>,
    rejected_credentials: RwLock<HashSet<Credential>>,
    rejected_accounts: RwLock<HashSet<AccountId>>,
    crashing: RwLock<HashSet<AccountId>>,
    /// Remaining transient failures to inject per account.
    flaky: Mutex<HashMap<AccountId, u32>>,
    /// (account, credential) for every friend-list call, in call order.
    call_log: Mutex<Vec<(AccountId, Credential)>>,
    friend_list_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to give concurrent workers a chance
    /// to overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_account(&self, id: AccountId, name: &str) {
        self.accounts.write().entry(id).or_default().name = name.to_string();
    }

    /// Record a mutual friendship, creating either account if needed.
    pub fn befriend(&self, a: &AccountId, b: &AccountId) {
        let mut accounts = self.accounts.write();
        for (from, to) in [(a, b), (b, a)] {
            let entry = accounts.entry(from.clone()).or_default();
            if !entry.friends.contains(to) {
                entry.friends.push(to.clone());
            }
        }
    }

    pub fn reject_credential(&self, credential: &Credential) {
        self.rejected_credentials.write().insert(credential.clone());
    }

    /// Report `id` as invalid/private on friend-list calls.
    pub fn reject_account(&self, id: &AccountId) {
        self.rejected_accounts.write().insert(id.clone());
    }

    /// Panic inside friend-list calls for `id`, as a buggy source would.
    pub fn crash_on(&self, id: &AccountId) {
        self.crashing.write().insert(id.clone());
    }

    /// Fail the next `times` friend-list calls for `id` with a transient error.
    pub fn fail_transiently(&self, id: &AccountId, times: u32) {
        self.flaky.lock().insert(id.clone(), times);
    }

    pub fn friend_list_calls(&self) -> usize {
        self.friend_list_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.friend_list_calls() + self.summary_calls()
    }

    pub fn call_log(&self) -> Vec<(AccountId, Credential)> {
        self.call_log.lock().clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_credential(&self, credential: &Credential) -> Result<()> {
        if self.rejected_credentials.read().contains(credential) {
            Err(Error::InvalidCredential(credential.redacted()))
        } else {
            Ok(())
        }
    }
}

impl AccountSource for InMemorySource {
    async fn fetch_friend_list(
        &self,
        id: &AccountId,
        credential: &Credential,
    ) -> Result<Vec<FriendEdge>> {
        self.friend_list_calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().push((id.clone(), credential.clone()));
        self.pause().await;

        self.check_credential(credential)?;
        let crash = self.crashing.read().contains(id);
        if crash {
            panic!("simulated crash fetching {}", id);
        }
        {
            let mut flaky = self.flaky.lock();
            if let Some(remaining) = flaky.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Upstream(format!("simulated 503 for {}", id)));
                }
            }
        }
        if self.rejected_accounts.read().contains(id) {
            return Err(Error::InvalidAccount(id.to_string()));
        }

        let accounts = self.accounts.read();
        let account = accounts
            .get(id)
            .ok_or_else(|| Error::InvalidAccount(id.to_string()))?;
        Ok(account
            .friends
            .iter()
            .map(|f| FriendEdge::new(f.clone()))
            .collect())
    }

    async fn fetch_profile_summaries(
        &self,
        ids: &[AccountId],
        credential: &Credential,
    ) -> Result<HashMap<AccountId, ProfileSummary>> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        self.check_credential(credential)?;
        if ids.len() > SUMMARY_BATCH_LIMIT {
            return Err(Error::Internal(format!(
                "summary batch of {} exceeds {}",
                ids.len(),
                SUMMARY_BATCH_LIMIT
            )));
        }

        let accounts = self.accounts.read();
        Ok(ids
            .iter()
            .filter_map(|id| {
                let account = accounts.get(id)?;
                if account.name.is_empty() {
                    return None;
                }
                Some((
                    id.clone(),
                    ProfileSummary {
                        account_id: id.clone(),
                        display_name: account.name.clone(),
                        ..Default::default()
                    },
                ))
            })
            .collect())
    }

    async fn validate_credential(&self, credential: &Credential) -> CredentialStatus {
        match self.check_credential(credential) {
            Ok(()) => CredentialStatus::Valid,
            Err(_) => CredentialStatus::Invalid,
        }
    }
}
