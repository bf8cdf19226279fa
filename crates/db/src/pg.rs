//! PostgreSQL implementation of the store traits, delegating to the
//! repositories.

use async_trait::async_trait;
use crowdship_core::otp::OtpPurpose;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId, Timestamp};

use crate::error::StoreError;
use crate::models::attempt::{AttemptQuery, AttemptWindow, NewAttempt};
use crate::models::otp::{CreateOtp, OtpCode};
use crate::models::reset::{CreateResetToken, PasswordResetToken};
use crate::models::session::{CreateSession, UserSession};
use crate::models::user::{CreateProfile, CreateUser, Profile, User};
use crate::repositories::{AttemptRepo, OtpRepo, ResetTokenRepo, SessionRepo, UserRepo};
use crate::store::{AttemptLog, OtpStore, ResetTokenStore, SessionStore, StoreHealth, UserStore};
use crate::DbPool;

/// Stores backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_with_profile(
        &self,
        user: &CreateUser,
        profile: &CreateProfile,
    ) -> Result<(User, Profile), StoreError> {
        Ok(UserRepo::create_with_profile(&self.pool, user, profile).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_email(&self.pool, email).await?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_username(&self.pool, username).await?)
    }

    async fn find_profile(&self, user_id: DbId) -> Result<Option<Profile>, StoreError> {
        Ok(UserRepo::find_profile(&self.pool, user_id).await?)
    }

    async fn record_login(&self, id: DbId) -> Result<(), StoreError> {
        Ok(UserRepo::record_successful_login(&self.pool, id).await?)
    }

    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError> {
        Ok(UserRepo::update_password(&self.pool, id, password_hash).await?)
    }

    async fn mark_email_verified(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(UserRepo::mark_email_verified(&self.pool, id).await?)
    }

    async fn bump_token_version(&self, id: DbId) -> Result<i32, StoreError> {
        Ok(UserRepo::bump_token_version(&self.pool, id).await?)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create(&self, input: &CreateSession) -> Result<UserSession, StoreError> {
        Ok(SessionRepo::create(&self.pool, input).await?)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<UserSession>, StoreError> {
        Ok(SessionRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_active_for_user(&self, user_id: DbId) -> Result<Vec<UserSession>, StoreError> {
        Ok(SessionRepo::list_active_for_user(&self.pool, user_id).await?)
    }

    async fn claim_for_rotation(&self, hash: &str) -> Result<Option<UserSession>, StoreError> {
        Ok(SessionRepo::claim_for_rotation(&self.pool, hash).await?)
    }

    async fn revoke_by_hash(&self, hash: &str, reason: RevokeReason) -> Result<bool, StoreError> {
        Ok(SessionRepo::revoke_by_hash(&self.pool, hash, reason).await?)
    }

    async fn revoke(
        &self,
        id: SessionId,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<bool, StoreError> {
        Ok(SessionRepo::revoke(&self.pool, id, user_id, reason).await?)
    }

    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<u64, StoreError> {
        let revoked = SessionRepo::revoke_all_for_user(&self.pool, user_id, reason).await?;
        tracing::debug!(user_id, revoked, reason = reason.as_str(), "Revoked user sessions");
        Ok(revoked)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let deleted = SessionRepo::cleanup_expired(&self.pool).await?;
        tracing::debug!(deleted, "Deleted expired sessions");
        Ok(deleted)
    }
}

#[async_trait]
impl AttemptLog for PgStore {
    async fn record(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        Ok(AttemptRepo::record(&self.pool, attempt).await?)
    }

    async fn window(&self, query: &AttemptQuery) -> Result<AttemptWindow, StoreError> {
        Ok(AttemptRepo::window(&self.pool, query).await?)
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(AttemptRepo::delete_older_than(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn issue(&self, input: &CreateOtp) -> Result<OtpCode, StoreError> {
        Ok(OtpRepo::issue(&self.pool, input).await?)
    }

    async fn consume(
        &self,
        user_id: DbId,
        purpose: OtpPurpose,
        code_hash: &str,
    ) -> Result<Option<OtpCode>, StoreError> {
        Ok(OtpRepo::consume(&self.pool, user_id, purpose, code_hash).await?)
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn create(&self, input: &CreateResetToken) -> Result<PasswordResetToken, StoreError> {
        Ok(ResetTokenRepo::create(&self.pool, input).await?)
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        Ok(ResetTokenRepo::consume(&self.pool, token_hash).await?)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
