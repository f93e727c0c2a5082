// User repository queries for SurrealDB.
//
// Numeric user ids are allocated here (max + 1); the unique index on `uid`
// turns a concurrent allocation race into an insert error rather than a
// duplicate identity.

use crate::db::Db;
use crate::db::schema::*;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::fmt;

/// Name of the unique index on `user.email`.
const EMAIL_INDEX: &str = "user_email";

pub struct QueryBuilder;

/// A write would give two users the same email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateEmail;

impl fmt::Display for DuplicateEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "email already in use")
    }
}

impl std::error::Error for DuplicateEmail {}

/// Map a violation of the email index to `DuplicateEmail`.
fn classify_write_error(err: surrealdb::Error) -> anyhow::Error {
    if err.to_string().contains(EMAIL_INDEX) {
        anyhow::Error::new(DuplicateEmail)
    } else {
        err.into()
    }
}

#[derive(Deserialize)]
struct UidRow {
    uid: i64,
}

#[derive(Deserialize)]
struct ImageIdRow {
    image_id: i64,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl QueryBuilder {
    /// All users, ordered by last name.
    pub async fn all_users(db: &Db) -> Result<Vec<UserRecord>> {
        let mut res = db
            .query("SELECT * FROM user ORDER BY last_name ASC, first_name ASC")
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users)
    }

    /// Find a user by numeric id.
    pub async fn get_user(db: &Db, uid: i64) -> Result<Option<UserRecord>> {
        let mut res = db
            .query("SELECT * FROM user WHERE uid = $uid LIMIT 1")
            .bind(("uid", uid))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Find a user by exact email.
    pub async fn get_user_by_email(db: &Db, email: &str) -> Result<Option<UserRecord>> {
        let email = email.to_string();

        let mut res = db
            .query("SELECT * FROM user WHERE email = $email LIMIT 1")
            .bind(("email", email))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Insert a new user and return its numeric id.
    ///
    /// Fails with `DuplicateEmail` when the email is already taken.
    pub async fn insert_user(db: &Db, data: &UserCreate) -> Result<i64> {
        let mut res = db
            .query("SELECT uid FROM user ORDER BY uid DESC LIMIT 1")
            .await?;
        let last: Vec<UidRow> = res.take(0)?;
        let uid = last.first().map(|row| row.uid + 1).unwrap_or(1);

        let now = now_rfc3339();
        let mut res = db
            .query(
                r#"
                CREATE user CONTENT {
                    uid: $uid,
                    first_name: $first_name,
                    last_name: $last_name,
                    email: $email,
                    password_hash: $password_hash,
                    is_admin: $is_admin,
                    created_at: $now,
                    updated_at: $now
                }
                "#,
            )
            .bind(("uid", uid))
            .bind(("first_name", data.first_name.clone()))
            .bind(("last_name", data.last_name.clone()))
            .bind(("email", data.email.clone()))
            .bind(("password_hash", data.password_hash.clone()))
            .bind(("is_admin", data.is_admin))
            .bind(("now", now))
            .await
            .map_err(classify_write_error)?;

        let created: Vec<UserRecord> = res.take(0).map_err(classify_write_error)?;
        created
            .into_iter()
            .next()
            .map(|record| record.uid)
            .ok_or_else(|| anyhow!("failed to create user record"))
    }

    /// Update a user's profile fields. Returns `false` when no such user exists.
    ///
    /// Fails with `DuplicateEmail` when another user already has the email.
    pub async fn update_user(db: &Db, data: &UserUpdate) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE user SET
                    first_name = $first_name,
                    last_name = $last_name,
                    email = $email,
                    is_admin = $is_admin,
                    updated_at = $now
                WHERE uid = $uid
                "#,
            )
            .bind(("uid", data.uid))
            .bind(("first_name", data.first_name.clone()))
            .bind(("last_name", data.last_name.clone()))
            .bind(("email", data.email.clone()))
            .bind(("is_admin", data.is_admin))
            .bind(("now", now_rfc3339()))
            .await
            .map_err(classify_write_error)?;

        let updated: Vec<UserRecord> = res.take(0).map_err(classify_write_error)?;
        Ok(!updated.is_empty())
    }

    /// Delete a user. Deleting a missing user is not an error.
    pub async fn delete_user(db: &Db, uid: i64) -> Result<()> {
        db.query("DELETE user WHERE uid = $uid")
            .bind(("uid", uid))
            .await?
            .check()?;

        Ok(())
    }

    /// Replace a user's password hash.
    pub async fn reset_password(db: &Db, uid: i64, password_hash: &str) -> Result<()> {
        let password_hash = password_hash.to_string();

        db.query(
            r#"
            UPDATE user SET
                password_hash = $password_hash,
                updated_at = $now
            WHERE uid = $uid
            "#,
        )
        .bind(("uid", uid))
        .bind(("password_hash", password_hash))
        .bind(("now", now_rfc3339()))
        .await?
        .check()?;

        Ok(())
    }

    /// Record an uploaded profile picture and return the image id.
    /// The user must exist.
    pub async fn insert_user_image(db: &Db, data: &UserImageCreate) -> Result<i64> {
        if Self::get_user(db, data.user_id).await?.is_none() {
            return Err(anyhow!("no user with id {}", data.user_id));
        }

        let mut res = db
            .query("SELECT image_id FROM user_image ORDER BY image_id DESC LIMIT 1")
            .await?;
        let last: Vec<ImageIdRow> = res.take(0)?;
        let image_id = last.first().map(|row| row.image_id + 1).unwrap_or(1);

        let mut res = db
            .query(
                r#"
                CREATE user_image CONTENT {
                    image_id: $image_id,
                    user_id: $user_id,
                    file_name: $file_name,
                    created_at: $now,
                    updated_at: $now
                }
                "#,
            )
            .bind(("image_id", image_id))
            .bind(("user_id", data.user_id))
            .bind(("file_name", data.file_name.clone()))
            .bind(("now", now_rfc3339()))
            .await?;

        let created: Vec<UserImageRecord> = res.take(0)?;
        created
            .into_iter()
            .next()
            .map(|record| record.image_id)
            .ok_or_else(|| anyhow!("failed to create user image record"))
    }

    /// Most recently uploaded picture of a user.
    pub async fn latest_user_image(db: &Db, user_id: i64) -> Result<Option<UserImageRecord>> {
        let mut res = db
            .query(
                "SELECT * FROM user_image WHERE user_id = $user_id ORDER BY image_id DESC LIMIT 1",
            )
            .bind(("user_id", user_id))
            .await?;

        let images: Vec<UserImageRecord> = res.take(0)?;
        Ok(images.into_iter().next())
    }
}
