//! friendgraph storage: one compressed record per account, plus the
//! identifier to short-id mapping used to name graph documents.

pub mod cache;
pub mod links;

pub use cache::AccountCache;
pub use links::ShortLinkMap;
