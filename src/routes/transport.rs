use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    models::{
        auth::AuthenticatedUser,
        transport::{TimeSlot, Vehicle},
        user::UserRole,
    },
    services::{
        metrics,
        roster::{PgTransportStore, RosterAssembler},
    },
    AppState,
};

/// GET /transport/slots
pub async fn list_slots(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let slots = sqlx::query_as::<_, TimeSlot>("SELECT * FROM time_slots ORDER BY direction, departure")
        .fetch_all(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;
    Ok(Json(serde_json::to_value(slots).unwrap()))
}

/// GET /transport/vehicles — drivers see their own vehicles, admins all.
pub async fn list_vehicles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let query = match user.role {
        UserRole::Admin => sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles ORDER BY name"),
        UserRole::Driver => {
            sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE driver_id = $1 ORDER BY name")
                .bind(user.user_id)
        }
        _ => {
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Access denied" })),
            ))
        }
    };
    let vehicles = query.fetch_all(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(serde_json::to_value(vehicles).unwrap()))
}

#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
}

/// GET /transport/roster?vehicle_id=...&slot_id=...&date=YYYY-MM-DD
///
/// An empty stop list is a valid "not operating today" answer, not a 404.
pub async fn get_roster(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<RosterQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !matches!(user.role, UserRole::Admin | UserRole::Driver) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        ));
    }

    let assembler = RosterAssembler::new(PgTransportStore::new(state.db.clone()));
    match assembler
        .assemble(params.vehicle_id, params.slot_id, params.date)
        .await
    {
        Ok(roster) => {
            metrics::ROSTER_ASSEMBLIES_COUNTER
                .with_label_values(&["success"])
                .inc();
            Ok(Json(serde_json::to_value(roster).unwrap()))
        }
        Err(e) => {
            metrics::ROSTER_ASSEMBLIES_COUNTER
                .with_label_values(&["failure"])
                .inc();
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ))
        }
    }
}
