use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::{
    models::{
        auth::AuthenticatedUser,
        commitment::{AdvanceCellRequest, BoardQuery, SendReportsRequest},
    },
    services::{
        board::{BoardError, CommitmentBoard, PgBoardStore},
        metrics,
        students::StudentService,
    },
    AppState,
};

fn board_error(e: BoardError) -> (StatusCode, Json<Value>) {
    let status = match e {
        BoardError::AlreadySent | BoardError::StaleCell => StatusCode::CONFLICT,
        BoardError::NothingChecked | BoardError::UnknownCell => StatusCode::BAD_REQUEST,
        BoardError::Persist(_) | BoardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Access denied" })),
    )
}

/// GET /commitments/board?class_id=...&date=YYYY-MM-DD — staff only.
pub async fn get_board(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<BoardQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !user.role.is_staff() {
        return Err(forbidden());
    }

    let board = CommitmentBoard::load(PgBoardStore::new(state.db.clone()), params.class_id, params.date)
        .await
        .map_err(board_error)?;
    Ok(Json(serde_json::to_value(board.view()).unwrap()))
}

/// POST /commitments/advance — one tap, one step in the cycle.
pub async fn advance_cell(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AdvanceCellRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !user.role.is_staff() {
        return Err(forbidden());
    }

    let mut board =
        CommitmentBoard::load(PgBoardStore::new(state.db.clone()), body.class_id, body.date)
            .await
            .map_err(board_error)?;

    match board
        .advance_cell(body.student_id, body.item_id, user.user_id)
        .await
    {
        Ok(status) => {
            metrics::CELL_ADVANCES_COUNTER
                .with_label_values(&["success"])
                .inc();
            Ok(Json(json!({ "status": status })))
        }
        Err(e) => {
            metrics::CELL_ADVANCES_COUNTER
                .with_label_values(&["failure"])
                .inc();
            Err(board_error(e))
        }
    }
}

/// POST /commitments/send-to-parents — one-way gate per (class, date).
pub async fn send_to_parents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SendReportsRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !user.role.is_staff() {
        return Err(forbidden());
    }

    let mut board =
        CommitmentBoard::load(PgBoardStore::new(state.db.clone()), body.class_id, body.date)
            .await
            .map_err(board_error)?;

    if let Err(e) = board.send_to_parents().await {
        metrics::REPORT_SENDS_COUNTER
            .with_label_values(&["refused"])
            .inc();
        return Err(board_error(e));
    }

    metrics::REPORT_SENDS_COUNTER
        .with_label_values(&["success"])
        .inc();
    info!(class_id = %body.class_id, date = %body.date, "daily reports sent");

    // Push failures never unwind the send — the gate is already closed.
    if let Ok(parent_ids) = StudentService::parents_of_class(&state.db, body.class_id).await {
        for parent_id in parent_ids {
            let _ = state
                .notifications
                .notify_user(
                    &state.db,
                    parent_id,
                    "Daily report",
                    "Today's coaching report is ready.",
                    Some(json!({ "class_id": body.class_id, "date": body.date })),
                )
                .await;
        }
    }

    Ok(Json(json!({ "ok": true })))
}
