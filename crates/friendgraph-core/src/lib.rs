//! friendgraph core: account and friend-record types, error taxonomy,
//! configuration and the bounded fan-out driver.

pub mod config;
pub mod error;
pub mod fanout;
pub mod types;

pub use config::{
    load_credentials, CrawlSettings, DataPaths, FriendGraphConfig, GraphSettings, MAX_DEPTH,
    MAX_WORKERS,
};
pub use error::{Error, Rejection, Result};
pub use fanout::{run_bounded, FanoutStats, Frontier, Settled};
pub use types::{canonical_pair, targets_identifier, AccountId, Credential, FriendEdge, FriendRecord};
