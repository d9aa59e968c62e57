//! Account identifiers, friend records and credentials.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static ACCOUNT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{17}$").unwrap());

/// Opaque account identifier (a 17-digit SteamID64 in practice).
///
/// Identifiers read back from upstream or from the cache are kept as-is;
/// [`AccountId::parse`] is the checked constructor used at the edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an identifier without checking its format.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wrap an identifier, rejecting anything that is not 17 ASCII digits.
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if ACCOUNT_ID_RE.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidAccountId(id.to_string()))
        }
    }

    pub fn is_well_formed(&self) -> bool {
        ACCOUNT_ID_RE.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric ordering for well-formed identifiers, lexicographic otherwise.
fn compare_ids(a: &AccountId, b: &AccountId) -> Ordering {
    match (a.0.parse::<u64>(), b.0.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.0.cmp(&b.0),
    }
}

/// Order a pair so that {A,B} and {B,A} produce the same key.
pub fn canonical_pair(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if compare_ids(&a, &b) == Ordering::Greater {
        (b, a)
    } else {
        (a, b)
    }
}

/// Output key for one or two crawl targets: `id` or `smaller,larger`.
pub fn targets_identifier(targets: &[AccountId]) -> Result<String> {
    match targets {
        [one] => Ok(one.to_string()),
        [a, b] => {
            let (first, second) = canonical_pair(a.clone(), b.clone());
            Ok(format!("{},{}", first, second))
        }
        _ => Err(Error::Config(format!(
            "expected one or two target accounts, got {}",
            targets.len()
        ))),
    }
}

/// One entry of an account's friend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEdge {
    pub account_id: AccountId,
    /// Display name resolved at fetch time; empty when upstream had none.
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_relationship")]
    pub relationship: String,
    /// Unix seconds at which the friendship was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend_since: Option<i64>,
}

fn default_relationship() -> String {
    "friend".into()
}

impl FriendEdge {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            username: String::new(),
            relationship: default_relationship(),
            friend_since: None,
        }
    }

    /// Name used for graph nodes: the username, or the identifier when unknown.
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            self.account_id.as_str()
        } else {
            &self.username
        }
    }
}

/// Everything cached for one account: who it is and who it is friends with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRecord {
    pub account_id: AccountId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub friends: Vec<FriendEdge>,
}

impl FriendRecord {
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            self.account_id.as_str()
        } else {
            &self.username
        }
    }
}

/// Upstream access token. `Debug` and `Display` only ever show a redacted form.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last four characters, prefixed with an ellipsis.
    pub fn redacted(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("…{}", tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.redacted())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
