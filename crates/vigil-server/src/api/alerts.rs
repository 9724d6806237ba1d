use crate::api::{error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use vigil_common::types::Alert;
use vigil_store::StoreError;

/// One tracked alert, as presented to management surfaces.
#[derive(Serialize, ToSchema)]
pub struct AlertResponse {
    pub uuid: String,
    /// Severity: warn / error.
    pub level: String,
    /// Monitored metric or condition.
    pub attribute: String,
    /// Threshold expression that fired.
    pub pattern: String,
    /// False while firing, true once recovered.
    pub back_to_normal: bool,
    /// Rule tagged as responsible, if flagged.
    pub rule_name: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Full original event property bag.
    pub properties: HashMap<String, Value>,
}

impl From<Alert> for AlertResponse {
    fn from(a: Alert) -> Self {
        Self {
            uuid: a.uuid,
            level: a.level.to_string(),
            attribute: a.attribute,
            pattern: a.pattern,
            back_to_normal: a.back_to_normal,
            rule_name: a.rule_name,
            first_seen: a.first_seen,
            last_seen: a.last_seen,
            properties: a.properties,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct AlertQueryParams {
    /// `field:value` query; empty or absent lists every alert.
    #[param(required = false)]
    q: Option<String>,
}

/// Result of storing one alert event.
#[derive(Serialize, ToSchema)]
struct StoreResponse {
    /// Affected alert uuid; null when a redundant recovery was ignored.
    uuid: Option<String>,
}

/// Ingest one alert-shaped event (a JSON property bag with at least
/// `alertLevel`, `alertAttribute`, `alertPattern`).
#[utoipa::path(
    post,
    path = "/v1/alerts",
    tag = "Alerts",
    request_body = HashMap<String, Value>,
    responses(
        (status = 200, description = "Event applied", body = StoreResponse),
        (status = 400, description = "Missing required alert fields", body = ApiError)
    )
)]
async fn store_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(event): Json<HashMap<String, Value>>,
) -> impl IntoResponse {
    match state.store.store(&event) {
        Ok(uuid) => success_response(StatusCode::OK, &trace_id, StoreResponse { uuid }),
        Err(e @ StoreError::InvalidAlertFields { .. }) => error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_alert_fields",
            &e.to_string(),
        ),
        Err(e) => {
            tracing::error!(trace_id = %trace_id.0, error = %e, "Failed to store alert event");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Alert store error",
            )
        }
    }
}

/// List or query tracked alerts.
#[utoipa::path(
    get,
    path = "/v1/alerts",
    tag = "Alerts",
    params(AlertQueryParams),
    responses(
        (status = 200, description = "Matching alerts", body = Vec<AlertResponse>)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<AlertQueryParams>,
) -> impl IntoResponse {
    let q = params.q.unwrap_or_default();
    let items: Vec<AlertResponse> = state
        .store
        .query(&q)
        .into_iter()
        .map(AlertResponse::from)
        .collect();
    success_response(StatusCode::OK, &trace_id, items)
}

/// All known alert uuids, for operator-facing completion.
#[utoipa::path(
    get,
    path = "/v1/alerts/uuids",
    tag = "Alerts",
    responses(
        (status = 200, description = "Known alert uuids", body = Vec<String>)
    )
)]
async fn alert_uuids(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(StatusCode::OK, &trace_id, state.store.known_uuids())
}

#[derive(Deserialize, ToSchema)]
struct FlagRequest {
    /// `field:value` query selecting the alerts to tag.
    q: String,
    /// Rule name to record on the matches.
    rule_name: String,
}

/// Count of alerts affected by a mutating operation.
#[derive(Serialize, ToSchema)]
struct AffectedResponse {
    affected: usize,
}

/// Tag matching alerts with the name of the responsible rule.
#[utoipa::path(
    post,
    path = "/v1/alerts/flag",
    tag = "Alerts",
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Number of alerts flagged", body = AffectedResponse)
    )
)]
async fn flag_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(req): Json<FlagRequest>,
) -> impl IntoResponse {
    let affected = state.store.flag(&req.q, &req.rule_name);
    success_response(StatusCode::OK, &trace_id, AffectedResponse { affected })
}

/// Delete matching alerts. The query is required: an empty query would
/// match everything, and wholesale removal must be spelled out via
/// cleanup instead.
#[utoipa::path(
    delete,
    path = "/v1/alerts",
    tag = "Alerts",
    params(AlertQueryParams),
    responses(
        (status = 200, description = "Number of alerts deleted", body = AffectedResponse),
        (status = 400, description = "Missing query", body = ApiError)
    )
)]
async fn delete_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<AlertQueryParams>,
) -> impl IntoResponse {
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "missing_query",
            "delete requires a non-empty q parameter",
        );
    };
    let affected = state.store.delete(&q);
    success_response(StatusCode::OK, &trace_id, AffectedResponse { affected })
}

/// Remove all recovered alerts regardless of age.
#[utoipa::path(
    post,
    path = "/v1/alerts/cleanup",
    tag = "Alerts",
    responses(
        (status = 200, description = "Number of alerts removed", body = AffectedResponse)
    )
)]
async fn cleanup_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let affected = state.store.cleanup();
    success_response(StatusCode::OK, &trace_id, AffectedResponse { affected })
}

/// Remove recovered alerts older than the configured retention.
#[utoipa::path(
    post,
    path = "/v1/alerts/eviction",
    tag = "Alerts",
    responses(
        (status = 200, description = "Number of alerts evicted", body = AffectedResponse)
    )
)]
async fn evict_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let affected = state.store.evict();
    success_response(StatusCode::OK, &trace_id, AffectedResponse { affected })
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(store_alert, list_alerts, delete_alerts))
        .routes(routes!(alert_uuids))
        .routes(routes!(flag_alerts))
        .routes(routes!(cleanup_alerts))
        .routes(routes!(evict_alerts))
}
