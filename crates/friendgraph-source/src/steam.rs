//! Steam Web API account source.

use std::collections::HashMap;
use std::time::Instant;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use friendgraph_core::{AccountId, Credential, Error, FriendEdge, Result};

use crate::{AccountSource, CredentialStatus, ProfileSummary, SUMMARY_BATCH_LIMIT};

pub const DEFAULT_BASE_URL: &str = "https://api.steampowered.com";

/// Public account whose friend list is used to check credentials.
const CHECK_ACCOUNT: &str = "76561198282036055";

// ---------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FriendListResponse {
    #[serde(default)]
    friendslist: FriendList,
}

#[derive(Debug, Default, Deserialize)]
struct FriendList {
    #[serde(default)]
    friends: Vec<WireFriend>,
}

#[derive(Debug, Deserialize)]
struct WireFriend {
    steamid: String,
    #[serde(default)]
    relationship: String,
    #[serde(default)]
    friend_since: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SummariesResponse {
    response: Players,
}

#[derive(Debug, Default, Deserialize)]
struct Players {
    #[serde(default)]
    players: Vec<WirePlayer>,
}

#[derive(Debug, Deserialize)]
struct WirePlayer {
    steamid: String,
    #[serde(default)]
    personaname: String,
    #[serde(default)]
    profileurl: String,
    #[serde(default)]
    avatar: String,
    #[serde(default)]
    timecreated: Option<i64>,
    #[serde(default)]
    loccountrycode: Option<String>,
}

impl From<WirePlayer> for ProfileSummary {
    fn from(p: WirePlayer) -> Self {
        Self {
            account_id: AccountId::new(p.steamid),
            display_name: p.personaname,
            profile_url: p.profileurl,
            avatar: p.avatar,
            time_created: p.timecreated,
            country: p.loccountrycode,
        }
    }
}

// ---------------------------------------------------------------
// Client
// ---------------------------------------------------------------

/// [`AccountSource`] backed by the public Steam Web API.
#[derive(Debug, Clone)]
pub struct SteamWebApi {
    client: Client,
    base_url: String,
}

impl Default for SteamWebApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SteamWebApi {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client somewhere other than Steam (a proxy, or a test server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request to {} failed: {}", path, e.without_url())))
    }
}

/// Map a non-success status to the error the crawl acts on.
fn classify_status(status: StatusCode, subject: &str, credential: &Credential) -> Error {
    match status {
        StatusCode::FORBIDDEN => Error::InvalidCredential(credential.redacted()),
        // 401 is what Steam answers for private friend lists.
        StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR => {
            Error::InvalidAccount(format!("{} ({})", subject, status))
        }
        other => Error::Upstream(format!("{} answered {}", subject, other)),
    }
}

impl AccountSource for SteamWebApi {
    async fn fetch_friend_list(
        &self,
        id: &AccountId,
        credential: &Credential,
    ) -> Result<Vec<FriendEdge>> {
        let start = Instant::now();
        let response = self
            .get(
                "/ISteamUser/GetFriendList/v0001/",
                &[
                    ("key", credential.expose()),
                    ("steamid", id.as_str()),
                    ("relationship", "friend"),
                ],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, id.as_str(), credential));
        }

        let body: FriendListResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed friend list for {}: {}", id, e.without_url())))?;

        debug!(
            "GetFriendList {} -> {} friends in {}ms",
            id,
            body.friendslist.friends.len(),
            start.elapsed().as_millis()
        );

        Ok(body
            .friendslist
            .friends
            .into_iter()
            .map(|f| FriendEdge {
                account_id: AccountId::new(f.steamid),
                username: String::new(),
                relationship: if f.relationship.is_empty() {
                    "friend".into()
                } else {
                    f.relationship
                },
                friend_since: f.friend_since,
            })
            .collect())
    }

    async fn fetch_profile_summaries(
        &self,
        ids: &[AccountId],
        credential: &Credential,
    ) -> Result<HashMap<AccountId, ProfileSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if ids.len() > SUMMARY_BATCH_LIMIT {
            return Err(Error::Internal(format!(
                "summary batch of {} exceeds {}",
                ids.len(),
                SUMMARY_BATCH_LIMIT
            )));
        }

        let joined = ids
            .iter()
            .map(AccountId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .get(
                "/ISteamUser/GetPlayerSummaries/v0002/",
                &[("key", credential.expose()), ("steamids", joined.as_str())],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "GetPlayerSummaries", credential));
        }

        let body: SummariesResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed player summaries: {}", e.without_url())))?;

        Ok(body
            .response
            .players
            .into_iter()
            .map(|p| {
                let summary = ProfileSummary::from(p);
                (summary.account_id.clone(), summary)
            })
            .collect())
    }

    async fn validate_credential(&self, credential: &Credential) -> CredentialStatus {
        let result = self
            .get(
                "/ISteamUser/GetFriendList/v0001/",
                &[
                    ("key", credential.expose()),
                    ("steamid", CHECK_ACCOUNT),
                    ("relationship", "friend"),
                ],
            )
            .await;

        match result {
            Ok(r) if r.status().is_success() => CredentialStatus::Valid,
            Ok(r) if r.status() == StatusCode::FORBIDDEN => CredentialStatus::Invalid,
            Ok(r) => {
                warn!("Credential check for {} answered {}", credential, r.status());
                CredentialStatus::Unknown
            }
            Err(e) => {
                warn!("Credential check for {} failed: {}", credential, e);
                CredentialStatus::Unknown
            }
        }
    }
}
