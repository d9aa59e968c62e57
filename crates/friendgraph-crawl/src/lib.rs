//! Crawl engine: breadth-first expansion of the friend graph from a root
//! account up to a depth cap, caching one record per discovered account.

pub mod credentials;
pub mod engine;
pub mod report;
mod resolve;

pub use credentials::CredentialRing;
pub use engine::{CrawlEngine, Job};
pub use report::{CrawlReport, JobFailure};
