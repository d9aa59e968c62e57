//! Shared application state.

use std::time::Instant;

use friendgraph_runtime::Orchestrator;

/// State shared by every route handler.
pub struct AppState<S> {
    pub orchestrator: Orchestrator<S>,
    started: Instant,
}

impl<S> AppState<S> {
    pub fn new(orchestrator: Orchestrator<S>) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
