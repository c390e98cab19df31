use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{auth::AuthenticatedUser, notice::CreateNoticeRequest, user::UserRole},
    services::{metrics, notices::NoticeService},
    AppState,
};

/// GET /notices — every authenticated role sees active notices.
pub async fn list_notices(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    NoticeService::list_active(&state.db)
        .await
        .map(|ns| Json(serde_json::to_value(ns).unwrap()))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// POST /notices — staff only.
pub async fn create_notice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateNoticeRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !user.role.is_staff() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }

    NoticeService::create(&state.db, &state.notifications, &body, user.user_id)
        .await
        .map(|n| {
            metrics::NOTICES_COUNTER.with_label_values(&[&n.audience]).inc();
            Json(serde_json::to_value(n).unwrap())
        })
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// DELETE /notices/:id — admin only.
pub async fn deactivate_notice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }
    NoticeService::deactivate(&state.db, id)
        .await
        .map(|_| Json(json!({ "ok": true })))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}
