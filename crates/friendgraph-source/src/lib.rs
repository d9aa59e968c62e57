//! Account sources: where friend lists and profile summaries come from.
//!
//! [`AccountSource`] is the narrow interface the crawl depends on. Failures
//! carry a structured [`friendgraph_core::Rejection`] through the error
//! variant, never a message to be pattern-matched.

pub mod memory;
pub mod steam;

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use friendgraph_core::{AccountId, Credential, FriendEdge, Result};

pub use memory::InMemorySource;
pub use steam::SteamWebApi;

/// Upper bound on ids per profile summary call.
pub const SUMMARY_BATCH_LIMIT: usize = 100;

/// Public profile details for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub account_id: AccountId,
    pub display_name: String,
    #[serde(default)]
    pub profile_url: String,
    #[serde(default)]
    pub avatar: String,
    /// Unix seconds.
    #[serde(default)]
    pub time_created: Option<i64>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Outcome of probing a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Valid,
    Invalid,
    /// The check itself failed; nothing is known about the credential.
    Unknown,
}

/// Remote provider of friend lists and profile summaries.
pub trait AccountSource: Send + Sync + 'static {
    /// Friends of `id`. Usernames are left empty; see [`fetch_display_names`].
    fn fetch_friend_list(
        &self,
        id: &AccountId,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<FriendEdge>>> + Send;

    /// Summaries for at most [`SUMMARY_BATCH_LIMIT`] ids. Accounts upstream
    /// does not know are simply absent from the map.
    fn fetch_profile_summaries(
        &self,
        ids: &[AccountId],
        credential: &Credential,
    ) -> impl Future<Output = Result<HashMap<AccountId, ProfileSummary>>> + Send;

    fn validate_credential(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = CredentialStatus> + Send;
}

/// Display names for any number of ids, fetched in batches.
pub async fn fetch_display_names<S: AccountSource>(
    source: &S,
    ids: &[AccountId],
    credential: &Credential,
) -> Result<HashMap<AccountId, String>> {
    let mut names = HashMap::with_capacity(ids.len());
    for (i, batch) in ids.chunks(SUMMARY_BATCH_LIMIT).enumerate() {
        debug!("Summary batch {} ({} ids)", i, batch.len());
        let summaries = source.fetch_profile_summaries(batch, credential).await?;
        names.extend(
            summaries
                .into_iter()
                .map(|(id, summary)| (id, summary.display_name)),
        );
    }
    Ok(names)
}
