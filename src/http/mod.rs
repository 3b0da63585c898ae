//! HTTP surface of the directory: listing, map pins and profile detail.

mod error;
mod handlers;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::search::SearchEngine;

pub use error::ApiError;
pub use handlers::{DetailParams, ListingParams, MapParams, MapResponse};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

impl AppState {
    pub fn new(engine: SearchEngine) -> Self {
        Self { engine: Arc::new(engine) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/profiles", get(handlers::list_profiles))
        .route("/api/profiles/", get(handlers::list_profiles))
        .route("/api/profiles/map", get(handlers::map_profiles))
        .route("/api/profiles/detail", get(handlers::profile_detail))
        .with_state(state)
}
