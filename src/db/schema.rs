use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::auth::User;

/// Persisted representation of a user account in SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database record identifier (table: `user`)
    pub id: RecordId,
    /// Numeric user identity, unique, used as the token subject
    pub uid: i64,
    pub first_name: String,
    pub last_name: String,
    /// Unique, compared case-sensitively
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    /// RFC 3339 creation time
    pub created_at: Option<String>,
    /// RFC 3339 last update time
    pub updated_at: Option<String>,
}

/// Payload used when inserting a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Payload used when updating an existing user's profile fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub uid: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
}

/// Persisted profile picture reference (table: `user_image`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserImageRecord {
    pub id: RecordId,
    /// Sequential image id
    pub image_id: i64,
    /// `uid` of the owning user
    pub user_id: i64,
    /// Name of the stored file inside the upload directory
    pub file_name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Payload used when recording an uploaded picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserImageCreate {
    pub user_id: i64,
    pub file_name: String,
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.uid,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            password_hash: record.password_hash,
            is_admin: record.is_admin,
            created_at: parse_timestamp(record.created_at),
            updated_at: parse_timestamp(record.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_record() {
        let record = UserRecord {
            id: RecordId::from_table_key("user", "abc"),
            uid: 7,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            is_admin: true,
            created_at: Some("2024-01-02T03:04:05+00:00".to_string()),
            updated_at: Some("not a timestamp".to_string()),
        };

        let user = User::from(record);
        assert_eq!(user.id, 7);
        assert_eq!(user.email, "ada@example.com");
        assert!(user.is_admin);
        assert_eq!(
            user.created_at.map(|t| t.to_rfc3339()),
            Some("2024-01-02T03:04:05+00:00".to_string())
        );
        assert!(user.updated_at.is_none());
    }
}
