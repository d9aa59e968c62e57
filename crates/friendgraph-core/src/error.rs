//! Error types for friendgraph.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid account identifier: {0}")]
    InvalidAccountId(String),

    #[error("Account rejected by source: {0}")]
    InvalidAccount(String),

    #[error("Credential rejected by source: {0}")]
    InvalidCredential(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How the account source refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The identifier does not name a readable account.
    InvalidAccount,
    /// The credential used for the call is not accepted.
    InvalidCredential,
    /// Anything else coming back from upstream; may succeed on retry.
    Transient,
}

impl Error {
    /// Classification of upstream failures. `None` for local errors.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::InvalidAccount(_) => Some(Rejection::InvalidAccount),
            Self::InvalidCredential(_) => Some(Rejection::InvalidCredential),
            Self::Upstream(_) => Some(Rejection::Transient),
            _ => None,
        }
    }

    /// Whether a retry of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        self.rejection() == Some(Rejection::Transient)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
