//! REST API routes (Axum)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use holidaycache_core::{CacheManager, HolidayResolver, RefreshScheduler};

mod handlers;

/// Shared handles to the holiday data store.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub resolver: Arc<HolidayResolver>,
    pub scheduler: Arc<RefreshScheduler>,
}

/// Create the REST API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/query", get(handlers::query))
        .route("/api/query", post(handlers::query_post))
        .route("/refresh", get(handlers::refresh))
        .with_state(state)
}
