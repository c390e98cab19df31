use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    models::{
        auth::AuthenticatedUser,
        user::{ChangePasswordRequest, LoginRequest, RegisterPushTokenRequest},
    },
    services::{auth::AuthService, metrics, notifications::NotificationService},
    AppState,
};

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match AuthService::login(
        &state.db,
        &body.email,
        &body.password,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
    )
    .await
    {
        Ok(response) => {
            metrics::LOGINS_COUNTER.with_label_values(&["success"]).inc();
            Ok(Json(serde_json::to_value(response).unwrap()))
        }
        Err(e) => {
            metrics::LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::profile(&state.db, user.user_id)
        .await
        .map(|profile| Json(serde_json::to_value(profile).unwrap()))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AuthService::change_password(&state.db, user.user_id, &body.current_password, &body.new_password)
        .await
        .map(|_| Json(json!({ "ok": true })))
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

/// POST /auth/push-token
pub async fn register_push_token(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<RegisterPushTokenRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    NotificationService::register_push_token(&state.db, user.user_id, &body.platform, &body.token)
        .await
        .map(|_| Json(json!({ "ok": true })))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}
