//! Repository for the `users` and `profiles` tables.

use sqlx::PgPool;
use crowdship_core::types::DbId;

use crate::models::user::{CreateProfile, CreateUser, Profile, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, username, password_hash, role, email_verified, \
                        phone_verified, is_active, token_version, last_login_at, \
                        created_at, updated_at";

const PROFILE_COLUMNS: &str = "user_id, first_name, last_name, phone, created_at, updated_at";

/// Provides credential-store operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a user and its profile in one transaction.
    pub async fn create_with_profile(
        pool: &PgPool,
        user: &CreateUser,
        profile: &CreateProfile,
    ) -> Result<(User, Profile), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO users (email, username, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&query)
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.role)
            .fetch_one(&mut *tx)
            .await?;

        let query = format!(
            "INSERT INTO profiles (user_id, first_name, last_name, phone)
             VALUES ($1, $2, $3, $4)
             RETURNING {PROFILE_COLUMNS}"
        );
        let created_profile = sqlx::query_as::<_, Profile>(&query)
            .bind(created.id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.phone)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((created, created_profile))
    }

    /// Find a user by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by normalized email.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by username (case-sensitive).
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Load the profile belonging to a user.
    pub async fn find_profile(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<Profile>, sqlx::Error> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");
        sqlx::query_as::<_, Profile>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Set `last_login_at` to now.
    pub async fn record_successful_login(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update a user's password hash. Returns `true` if the row was updated.
    pub async fn update_password(
        pool: &PgPool,
        id: DbId,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the email address verified. Returns `true` if the row changed.
    pub async fn mark_email_verified(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = true WHERE id = $1 AND email_verified = false",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Increment `token_version`, returning the new value.
    pub async fn bump_token_version(pool: &PgPool, id: DbId) -> Result<i32, sqlx::Error> {
        let row: (i32,) = sqlx::query_as(
            "UPDATE users SET token_version = token_version + 1 WHERE id = $1
             RETURNING token_version",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}
