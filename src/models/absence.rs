use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceKind {
    Absence,
    EarlyPickup,
    BusChange,
}

impl AbsenceKind {
    /// Only full-day absence and early pickup pull a student off the shuttle
    /// roster. A bus change relabels; it never excuses.
    pub fn excuses_from_roster(&self) -> bool {
        matches!(self, AbsenceKind::Absence | AbsenceKind::EarlyPickup)
    }
}

impl std::fmt::Display for AbsenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbsenceKind::Absence => "absence",
            AbsenceKind::EarlyPickup => "early_pickup",
            AbsenceKind::BusChange => "bus_change",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AbsenceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absence" => Ok(AbsenceKind::Absence),
            "early_pickup" => Ok(AbsenceKind::EarlyPickup),
            "bus_change" => Ok(AbsenceKind::BusChange),
            _ => Err(anyhow::anyhow!("Unknown absence kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// DB row — kind and status are fetched as TEXT.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AbsenceRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub kind: String,
    pub date_start: NaiveDate,
    pub date_end: Option<NaiveDate>,
    pub pickup_time: Option<NaiveTime>,
    pub change_type: Option<String>,
    pub note: Option<String>,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AbsenceRequest {
    pub fn kind(&self) -> Option<AbsenceKind> {
        self.kind.parse().ok()
    }

    /// Pending and `date` falls inside [date_start, date_end-or-date_start],
    /// bounds inclusive. An open-ended request covers only its start date.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        if self.status != "pending" {
            return false;
        }
        let end = self.date_end.unwrap_or(self.date_start);
        self.date_start <= date && date <= end
    }

    /// Driver-facing one-liner for a bus-change advisory.
    pub fn advisory_reason(&self) -> String {
        let change = self.change_type.as_deref().unwrap_or("bus change");
        match self.note.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(note) => format!("{change}: {note}"),
            None => change.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAbsenceRequest {
    pub student_id: Uuid,
    pub kind: AbsenceKind,
    pub date_start: NaiveDate,
    pub date_end: Option<NaiveDate>,
    pub pickup_time: Option<NaiveTime>,
    pub change_type: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewAbsenceRequest {
    pub approve: bool,
}
