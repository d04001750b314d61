use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::proto::common::UserSummary;

#[derive(Debug, Clone, FromRow)]
pub struct UserModel {
    pub id: Uuid,
    pub sequential_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserModel {
    pub const COLUMNS: &'static str =
        "id, sequential_id, email, first_name, last_name, is_admin, created_at";
}

impl From<UserModel> for UserSummary {
    fn from(u: UserModel) -> Self {
        UserSummary {
            id: u.id.to_string(),
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name.unwrap_or_default(),
            is_admin: u.is_admin,
            sequential_id: u.sequential_id,
        }
    }
}

/// Lowercased and trimmed; used for the unique login lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn summary_fills_missing_last_name() {
        let summary: UserSummary = UserModel {
            id: Uuid::nil(),
            sequential_id: 4,
            email: "a@b.c".into(),
            first_name: "Ana".into(),
            last_name: None,
            is_admin: true,
            created_at: Utc::now(),
        }
        .into();
        assert_eq!(summary.last_name, "");
        assert_eq!(summary.sequential_id, 4);
        assert!(summary.is_admin);
    }
}
