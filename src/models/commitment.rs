use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Coaching status of one (student, curriculum item, date) cell.
///
/// The only exposed mutation is a single-step cyclic advance:
/// unchecked → done → partial → not_done → unchecked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentStatus {
    #[default]
    Unchecked,
    Done,
    Partial,
    NotDone,
}

impl CommitmentStatus {
    /// One tap forward in the fixed cycle, wrapping at the end.
    pub fn next(&self) -> CommitmentStatus {
        match self {
            CommitmentStatus::Unchecked => CommitmentStatus::Done,
            CommitmentStatus::Done => CommitmentStatus::Partial,
            CommitmentStatus::Partial => CommitmentStatus::NotDone,
            CommitmentStatus::NotDone => CommitmentStatus::Unchecked,
        }
    }
}

impl std::fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommitmentStatus::Unchecked => "unchecked",
            CommitmentStatus::Done => "done",
            CommitmentStatus::Partial => "partial",
            CommitmentStatus::NotDone => "not_done",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for CommitmentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unchecked" => Ok(CommitmentStatus::Unchecked),
            "done" => Ok(CommitmentStatus::Done),
            "partial" => Ok(CommitmentStatus::Partial),
            "not_done" => Ok(CommitmentStatus::NotDone),
            _ => Err(anyhow::anyhow!("Unknown commitment status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CurriculumItem {
    pub id: Uuid,
    pub class_id: Uuid,
    pub subject: String,
    pub title: String,
    pub scheduled_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// DB row — status is fetched as TEXT.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommitmentEntry {
    pub id: Uuid,
    pub student_id: Uuid,
    pub item_id: Uuid,
    pub entry_date: NaiveDate,
    pub status: String,
    pub note: Option<String>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-student send record for one date. Once sent, the class board for that
/// date stays sent — there is no unsend.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyReport {
    pub id: Uuid,
    pub student_id: Uuid,
    pub report_date: NaiveDate,
    pub send_status: String, // "pending" | "sent"
    pub sent_at: Option<DateTime<Utc>>,
}

// Board DTOs

#[derive(Debug, Clone, Serialize)]
pub struct BoardCellView {
    pub student_id: Uuid,
    pub item_id: Uuid,
    pub status: CommitmentStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub students: Vec<super::student::Student>,
    pub items: Vec<CurriculumItem>,
    pub cells: Vec<BoardCellView>,
    pub sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub class_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceCellRequest {
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub student_id: Uuid,
    pub item_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendReportsRequest {
    pub class_id: Uuid,
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_advances_close_the_cycle() {
        let mut status = CommitmentStatus::Unchecked;
        let seen: Vec<CommitmentStatus> = (0..4)
            .map(|_| {
                status = status.next();
                status
            })
            .collect();
        assert_eq!(
            seen,
            vec![
                CommitmentStatus::Done,
                CommitmentStatus::Partial,
                CommitmentStatus::NotDone,
                CommitmentStatus::Unchecked,
            ]
        );
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            CommitmentStatus::Unchecked,
            CommitmentStatus::Done,
            CommitmentStatus::Partial,
            CommitmentStatus::NotDone,
        ] {
            let parsed: CommitmentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("half_done".parse::<CommitmentStatus>().is_err());
    }
}
