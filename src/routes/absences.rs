use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{
        absence::{CreateAbsenceRequest, ReviewAbsenceRequest},
        auth::AuthenticatedUser,
        user::UserRole,
    },
    services::{absences::AbsenceService, students::StudentService},
    AppState,
};

fn internal(e: anyhow::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// POST /absences — parents file requests for their own children only.
pub async fn create_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateAbsenceRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let UserRole::Parent = user.role {
        let linked = StudentService::is_parent_of(&state.db, body.student_id, user.user_id)
            .await
            .map_err(internal)?;
        if !linked {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Access denied" })),
            ));
        }
    } else if !user.role.is_staff() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }

    AbsenceService::create(&state.db, &body, user.user_id)
        .await
        .map(|r| Json(serde_json::to_value(r).unwrap()))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// GET /absences/pending — staff review queue.
pub async fn list_pending(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !user.role.is_staff() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }
    AbsenceService::list_pending(&state.db)
        .await
        .map(|rs| Json(serde_json::to_value(rs).unwrap()))
        .map_err(internal)
}

/// GET /absences/mine — a parent's own requests, newest first.
pub async fn list_mine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AbsenceService::list_for_parent(&state.db, user.user_id)
        .await
        .map(|rs| Json(serde_json::to_value(rs).unwrap()))
        .map_err(internal)
}

/// POST /absences/:id/review — admin approves or rejects.
pub async fn review_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewAbsenceRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }
    AbsenceService::review(&state.db, id, body.approve)
        .await
        .map(|r| Json(serde_json::to_value(r).unwrap()))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}
