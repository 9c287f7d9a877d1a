//! HTTP route handlers: records, transitions, workflows, summary.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use provost_engine::{summarize, EngineError};
use provost_storage::{RecordFilter, RecordStorage, StorageError};

use super::{json_error, AppState};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "service": "provost",
    });
    (StatusCode::OK, Json(response))
}

/// GET /workflows
pub(crate) async fn handle_workflows<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
) -> Response {
    match serde_json::to_value(state.engine.registry().defs()) {
        Ok(defs) => (StatusCode::OK, Json(serde_json::json!({"workflows": defs}))).into_response(),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub(crate) struct CreateBody {
    #[serde(rename = "type")]
    record_type: String,
    /// Initial status literal; defaults to the type's start status.
    status: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
}

/// POST /records
pub(crate) async fn handle_create<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateBody>,
) -> Response {
    let initial_status = match body.status {
        Some(s) => s,
        None => match state.engine.registry().get(&body.record_type) {
            Ok(def) => def.initial.clone(),
            Err(e) => {
                return json_error(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
                    .into_response()
            }
        },
    };
    let payload = if body.payload.is_null() {
        serde_json::json!({})
    } else {
        body.payload
    };

    match state
        .engine
        .create(&body.record_type, &initial_status, payload)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

/// GET /records/{id}
pub(crate) async fn handle_get<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.get(&id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ListParams {
    #[serde(rename = "type")]
    record_type: String,
    status: Option<String>,
    actor: Option<String>,
    created_after: Option<String>,
    created_before: Option<String>,
}

/// GET /records?type=...&status=...&actor=...
pub(crate) async fn handle_list<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListParams>,
) -> Response {
    let filter = RecordFilter {
        status: params.status,
        actor: params.actor,
        created_after: params.created_after,
        created_before: params.created_before,
    };
    match state.engine.list(&params.record_type, &filter).await {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!({"records": records})))
            .into_response(),
        Err(e) => engine_error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct TransitionBody {
    to: String,
    actor: String,
    note: Option<String>,
}

/// POST /records/{id}/transition
pub(crate) async fn handle_transition<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response {
    match state
        .engine
        .transition(&id, &body.to, &body.actor, body.note)
        .await
    {
        Ok(receipt) => {
            let failures: Vec<serde_json::Value> = receipt
                .observer_failures
                .iter()
                .map(|f| serde_json::json!({"observer": f.observer, "error": f.error.message}))
                .collect();
            let body = serde_json::json!({
                "record": receipt.record,
                "observer_failures": failures,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => engine_error_response(&e),
    }
}

/// PATCH /records/{id} -- merge top-level fields into the payload.
pub(crate) async fn handle_update<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Response {
    let patch = match patch {
        serde_json::Value::Object(map) => map,
        _ => {
            return json_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "patch body must be a JSON object",
            )
            .into_response()
        }
    };

    let result = state
        .engine
        .update(&id, move |payload| match payload.as_object_mut() {
            Some(target) => {
                for (key, value) in patch {
                    target.insert(key, value);
                }
            }
            None => *payload = serde_json::Value::Object(patch),
        })
        .await;

    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

/// DELETE /records/{id}
pub(crate) async fn handle_delete<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => engine_error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct SummaryParams {
    #[serde(rename = "type")]
    record_type: String,
    group_by: Option<String>,
}

/// GET /summary?type=...&group_by=...
pub(crate) async fn handle_summary<S: RecordStorage>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<SummaryParams>,
) -> Response {
    let records = match state
        .engine
        .list(&params.record_type, &RecordFilter::default())
        .await
    {
        Ok(records) => records,
        Err(e) => return engine_error_response(&e),
    };
    let aggregate = summarize(&records, params.group_by.as_deref());
    let sums: serde_json::Map<String, serde_json::Value> = aggregate
        .sums_by_group
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.to_string())))
        .collect();
    let body = serde_json::json!({
        "record_type": params.record_type,
        "total": aggregate.total,
        "counts_by_status": aggregate.counts_by_status,
        "sums_by_group": sums,
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// Map an engine error to its HTTP response. Conflict-class errors carry
/// the refreshed record so the front-end can re-render without another
/// round trip.
fn engine_error_response(e: &EngineError) -> Response {
    let message = e.to_string();
    match e {
        EngineError::Workflow(_) | EngineError::InvalidInitialState { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, &message).into_response()
        }
        EngineError::NotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, &message).into_response()
        }
        EngineError::IllegalTransition { current, .. }
        | EngineError::ConcurrentModification { current, .. } => {
            let record = serde_json::to_value(current.as_ref())
                .unwrap_or(serde_json::Value::Null);
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": message, "record": record})),
            )
                .into_response()
        }
        EngineError::Forbidden { .. } => {
            json_error(StatusCode::FORBIDDEN, &message).into_response()
        }
        EngineError::Store(StorageError::Unavailable(_)) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, &message).into_response()
        }
        EngineError::Store(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &message).into_response()
        }
    }
}
