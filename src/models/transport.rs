use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteDirection {
    Pickup,
    Dropoff,
}

impl std::fmt::Display for RouteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDirection::Pickup => write!(f, "pickup"),
            RouteDirection::Dropoff => write!(f, "dropoff"),
        }
    }
}

/// A named scheduled departure (direction + label), e.g. "pickup / Morning A".
/// Direction is fetched as TEXT, same convention as `users.role`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeSlot {
    pub id: Uuid,
    pub direction: String,
    pub label: String,
    pub departure: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub plate: Option<String>,
    pub driver_id: Option<Uuid>,
}

/// One stop along a vehicle's route for a slot. `leg_minutes` is the travel
/// time from the previous stop, not from departure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteBlock {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub position: i32,
    pub label: String,
    pub leg_minutes: i32,
}

/// (block, student) assignment joined with the student's name fields.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRider {
    pub block_id: Uuid,
    pub student_id: Uuid,
    pub native_name: String,
    pub english_name: Option<String>,
    pub contact_phone: Option<String>,
}

// View DTOs produced by the roster assembler.

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RiderView {
    pub student_id: Uuid,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopView {
    pub block_id: Uuid,
    pub label: String,
    /// "HH:MM", departure plus the accumulated leg minutes.
    pub time: String,
    pub riders: Vec<RiderView>,
}

/// A bus-change request surfaced to the driver. Reporting only — the student
/// stays on the roster.
#[derive(Debug, Clone, Serialize)]
pub struct BusChangeAdvisory {
    pub student_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterView {
    pub vehicle_id: Uuid,
    pub slot_id: Uuid,
    pub stops: Vec<StopView>,
    pub advisories: Vec<BusChangeAdvisory>,
}

/// Departure plus an accumulated offset, wrapping hour-of-day at 24.
/// `NaiveTime` addition wraps around midnight, which is exactly the
/// mod-1440 arithmetic the stop times need.
pub fn stop_time(departure: NaiveTime, offset_minutes: i64) -> NaiveTime {
    departure + Duration::minutes(offset_minutes)
}
