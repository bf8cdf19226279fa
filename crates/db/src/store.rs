//! Store traits the auth core is written against, and the [`Stores`] bundle
//! handed to the server at startup.

use std::sync::Arc;

use async_trait::async_trait;
use crowdship_core::otp::OtpPurpose;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId, Timestamp};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::models::attempt::{AttemptQuery, AttemptWindow, NewAttempt};
use crate::models::otp::{CreateOtp, OtpCode};
use crate::models::reset::{CreateResetToken, PasswordResetToken};
use crate::models::session::{CreateSession, UserSession};
use crate::models::user::{CreateProfile, CreateUser, Profile, User};
use crate::pg::PgStore;
use crate::DbPool;

/// Credential store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create the user and its profile atomically. Uniqueness violations
    /// surface as [`StoreError::Conflict`].
    async fn create_with_profile(
        &self,
        user: &CreateUser,
        profile: &CreateProfile,
    ) -> Result<(User, Profile), StoreError>;
    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_profile(&self, user_id: DbId) -> Result<Option<Profile>, StoreError>;
    async fn record_login(&self, id: DbId) -> Result<(), StoreError>;
    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError>;
    async fn mark_email_verified(&self, id: DbId) -> Result<bool, StoreError>;
    async fn bump_token_version(&self, id: DbId) -> Result<i32, StoreError>;
}

/// Refresh-token session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, input: &CreateSession) -> Result<UserSession, StoreError>;
    async fn find_by_id(&self, id: SessionId) -> Result<Option<UserSession>, StoreError>;
    async fn list_active_for_user(&self, user_id: DbId) -> Result<Vec<UserSession>, StoreError>;
    /// Atomically flip the valid session holding `hash` to revoked
    /// (`rotated`) and return it. At most one caller wins per session.
    async fn claim_for_rotation(&self, hash: &str) -> Result<Option<UserSession>, StoreError>;
    async fn revoke_by_hash(&self, hash: &str, reason: RevokeReason) -> Result<bool, StoreError>;
    async fn revoke(
        &self,
        id: SessionId,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<bool, StoreError>;
    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<u64, StoreError>;
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}

/// Append-only attempt log.
#[async_trait]
pub trait AttemptLog: Send + Sync {
    async fn record(&self, attempt: &NewAttempt) -> Result<(), StoreError>;
    async fn window(&self, query: &AttemptQuery) -> Result<AttemptWindow, StoreError>;
    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

/// One-time code store.
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn issue(&self, input: &CreateOtp) -> Result<OtpCode, StoreError>;
    /// Consume a matching unused, unexpired code exactly once.
    async fn consume(
        &self,
        user_id: DbId,
        purpose: OtpPurpose,
        code_hash: &str,
    ) -> Result<Option<OtpCode>, StoreError>;
}

/// Password-reset token store.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn create(&self, input: &CreateResetToken) -> Result<PasswordResetToken, StoreError>;
    /// Consume a matching unused, unexpired token exactly once.
    async fn consume(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, StoreError>;
}

/// Reachability probe for `/health`.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Every store the auth core needs, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub attempts: Arc<dyn AttemptLog>,
    pub otps: Arc<dyn OtpStore>,
    pub resets: Arc<dyn ResetTokenStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// All stores backed by one PostgreSQL pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self::from_backend(Arc::new(PgStore::new(pool)))
    }

    /// All stores backed by one fresh in-process [`MemoryStore`].
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::default()))
    }

    /// Wire every trait to the same backend instance.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + SessionStore + AttemptLog + OtpStore + ResetTokenStore + StoreHealth + 'static,
    {
        Self {
            users: backend.clone(),
            sessions: backend.clone(),
            attempts: backend.clone(),
            otps: backend.clone(),
            resets: backend.clone(),
            health: backend,
        }
    }
}
