use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Placeholder shown when a student has neither name on file.
pub const UNKNOWN_NAME: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub native_name: String,
    pub english_name: Option<String>,
    pub campus: String,
    pub class_id: Option<Uuid>,
    pub contact_phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// English name first, then the native-script name, then "unknown".
    pub fn display_name(&self) -> &str {
        display_name(self.english_name.as_deref(), &self.native_name)
    }
}

/// Name preference shared by every roster-facing view.
pub fn display_name<'a>(english: Option<&'a str>, native: &'a str) -> &'a str {
    match english {
        Some(e) if !e.trim().is_empty() => e,
        _ => {
            if native.trim().is_empty() {
                UNKNOWN_NAME
            } else {
                native
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub campus: String,
    pub homeroom_teacher_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentParent {
    pub student_id: Uuid,
    pub user_id: Uuid,
    pub relationship: String, // "parent", "guardian", etc.
}

#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub native_name: String,
    pub english_name: Option<String>,
    pub campus: String,
    pub class_id: Option<Uuid>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    pub native_name: Option<String>,
    pub english_name: Option<String>,
    pub campus: Option<String>,
    pub class_id: Option<Uuid>,
    pub contact_phone: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_name_wins_when_present() {
        assert_eq!(display_name(Some("Amy"), "김하은"), "Amy");
    }

    #[test]
    fn blank_english_name_falls_back_to_native() {
        assert_eq!(display_name(Some("  "), "김하은"), "김하은");
        assert_eq!(display_name(None, "김하은"), "김하은");
    }

    #[test]
    fn no_name_at_all_yields_placeholder() {
        assert_eq!(display_name(None, ""), UNKNOWN_NAME);
    }
}
