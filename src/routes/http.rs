// Handlers: ingest, latest, tier history, downsampled history, version

use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::downsample::{HistoryQuery, HistoryRange};
use crate::error::{IngestError, QueryError, StoreError};
use crate::models::Tier;

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn store_status(e: &StoreError) -> StatusCode {
    if e.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            IngestError::StoreContention { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "report not stored");
        }
        error_body(status, self.to_string())
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::UnknownClient(_) => StatusCode::NOT_FOUND,
            QueryError::UnknownField(_) | QueryError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            QueryError::Store(e) => store_status(e),
        };
        error_body(status, self.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct IngestForm {
    values: String,
}

/// POST /status: one comma-separated report. `{"ok":1}` on first contact, `{"ok":2}` once stored.
pub(super) async fn ingest_handler(
    State(state): State<AppState>,
    Form(form): Form<IngestForm>,
) -> Result<Json<serde_json::Value>, IngestError> {
    let outcome = state.service.ingest_line(&form.values).await?;
    Ok(Json(json!({ "ok": outcome.code() })))
}

/// GET /status/latest
pub(super) async fn latest_handler(State(state): State<AppState>) -> Response {
    match state.service.latest().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TierParams {
    client_id: i64,
    limit: Option<u64>,
}

/// GET /status/{seconds|minutes|hours}?client_id=&limit=: newest first.
pub(super) async fn tier_handler(
    State(state): State<AppState>,
    Path(tier): Path<String>,
    Query(params): Query<TierParams>,
) -> Response {
    let Some(tier) = Tier::from_name(&tier) else {
        return error_body(StatusCode::NOT_FOUND, format!("unknown tier {:?}", tier));
    };
    match state
        .service
        .tier_history(tier, params.client_id, params.limit)
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    client_id: i64,
    /// Comma-separated metric names; omitted means all.
    fields: Option<String>,
    /// Trailing window in seconds. Takes precedence over `tier`.
    window: Option<i64>,
    tier: Option<String>,
    points: Option<usize>,
}

/// GET /status/history: index-stride spot samples, not averages.
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let range = match (params.window, params.tier.as_deref()) {
        (Some(seconds), _) => HistoryRange::Window { seconds },
        (None, Some(name)) => match Tier::from_name(name) {
            Some(tier) => HistoryRange::Tier(tier),
            None => {
                return error_body(StatusCode::BAD_REQUEST, format!("unknown tier {:?}", name));
            }
        },
        (None, None) => HistoryRange::Tier(Tier::FINEST),
    };
    let fields = params
        .fields
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let query = HistoryQuery {
        client_id: params.client_id,
        range,
        fields,
        target_points: params.points.unwrap_or(state.default_points),
    };
    match state.service.history(&query).await {
        Ok(series) => Json(series).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
