// HTTP routes: report ingest, latest view, tier history, downsampled history

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::service::StatusService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<StatusService>,
    pub(crate) default_points: usize,
}

pub fn app(service: Arc<StatusService>, default_points: usize) -> Router {
    let state = AppState {
        service,
        default_points,
    };
    Router::new()
        .route(
            "/status",
            get(|| async { "kunlun" }).post(http::ingest_handler),
        ) // GET, POST /status
        .route("/status/latest", get(http::latest_handler)) // GET /status/latest
        .route("/status/history", get(http::history_handler)) // GET /status/history
        .route("/status/{tier}", get(http::tier_handler)) // GET /status/{seconds|minutes|hours}
        .route("/version", get(http::version_handler)) // GET /version
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
