use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{
        auth::AuthenticatedUser,
        student::{CreateStudentRequest, UpdateStudentRequest},
        user::UserRole,
    },
    services::students::StudentService,
    AppState,
};

fn internal(e: anyhow::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Access denied" })),
    )
}

/// GET /students — staff see the whole roster, parents only their own.
pub async fn list_students(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let students = match user.role {
        UserRole::Admin | UserRole::Teacher => {
            StudentService::list(&state.db).await.map_err(internal)?
        }
        UserRole::Parent => StudentService::list_for_parent(&state.db, user.user_id)
            .await
            .map_err(internal)?,
        _ => return Err(forbidden()),
    };
    Ok(Json(serde_json::to_value(students).unwrap()))
}

/// POST /students — admin only
pub async fn create_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateStudentRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::Admin {
        return Err(forbidden());
    }
    StudentService::create(&state.db, &body)
        .await
        .map(|s| Json(serde_json::to_value(s).unwrap()))
        .map_err(internal)
}

/// PUT /students/:id — admin only
pub async fn update_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStudentRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if user.role != UserRole::Admin {
        return Err(forbidden());
    }
    StudentService::update(&state.db, id, &body)
        .await
        .map(|s| Json(serde_json::to_value(s).unwrap()))
        .map_err(internal)
}

/// GET /classes
pub async fn list_classes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let classes = match user.role {
        UserRole::Teacher => StudentService::classes_for_teacher(&state.db, user.user_id)
            .await
            .map_err(internal)?,
        _ => StudentService::list_classes(&state.db).await.map_err(internal)?,
    };
    Ok(Json(serde_json::to_value(classes).unwrap()))
}
