//! Crawl and graph document routes.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use friendgraph_core::config::validate_depth;
use friendgraph_core::{AccountId, Error, Result};
use friendgraph_source::AccountSource;

use crate::state::AppState;

pub fn routes<S: AccountSource>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/crawl", post(post_crawl::<S>))
        .route("/graphs/{short_id}", get(get_graph::<S>))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest {
    level: u8,
    account_ids: Vec<String>,
}

impl CrawlRequest {
    fn targets(&self) -> Result<Vec<AccountId>> {
        validate_depth(self.level)?;
        if !(1..=2).contains(&self.account_ids.len()) {
            return Err(Error::Config(format!(
                "expected one or two account ids, got {}",
                self.account_ids.len()
            )));
        }
        self.account_ids.iter().map(|id| AccountId::parse(id)).collect()
    }
}

fn error_body(status: StatusCode, err: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

/// POST /api/crawl
async fn post_crawl<S: AccountSource>(
    State(state): State<Arc<AppState<S>>>,
    payload: std::result::Result<Json<CrawlRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    // Malformed bodies are validation failures like any other.
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return error_body(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let targets = match req.targets() {
        Ok(targets) => targets,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, e),
    };

    match state.orchestrator.run(&targets, req.level).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "identifier": outcome.identifier,
                "shortId": outcome.short_id,
                "reused": outcome.reused,
                "path": outcome.path,
                "found": outcome.found,
            })),
        ),
        Err(e) => {
            warn!("Crawl of {:?} failed: {}", req.account_ids, e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// GET /api/graphs/{short_id}
async fn get_graph<S: AccountSource>(
    State(state): State<Arc<AppState<S>>>,
    Path(short_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.orchestrator.document(&short_id) {
        Ok(doc) => (StatusCode::OK, Json(serde_json::json!(doc))),
        Err(e @ Error::NotFound(_)) => error_body(StatusCode::NOT_FOUND, e),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
