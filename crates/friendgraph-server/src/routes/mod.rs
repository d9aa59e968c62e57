//! HTTP route handlers.

pub mod crawl;
pub mod status;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use friendgraph_source::AccountSource;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router<S: AccountSource>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .nest("/api", api_routes::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes<S: AccountSource>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .merge(status::routes::<S>())
        .merge(crawl::routes::<S>())
}
