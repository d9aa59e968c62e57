//! Runtime orchestrator: drives crawl → assemble → (merge → path) for one
//! or two target accounts and persists the resulting graph document.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
