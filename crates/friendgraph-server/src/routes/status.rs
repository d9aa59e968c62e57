use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use friendgraph_source::AccountSource;

use crate::state::AppState;

pub fn routes<S: AccountSource>() -> Router<Arc<AppState<S>>> {
    Router::new().route("/status", get(get_status::<S>))
}

/// GET /api/status
async fn get_status<S: AccountSource>(State(state): State<Arc<AppState<S>>>) -> Json<serde_json::Value> {
    let cache = state.orchestrator.cache().clone();
    let cached = match tokio::task::spawn_blocking(move || cache.record_count()).await {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => {
            warn!("Cannot count cached records: {}", e);
            0
        }
        Err(e) => {
            warn!("Cache count task failed: {}", e);
            0
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "cachedAccounts": cached,
    }))
}
