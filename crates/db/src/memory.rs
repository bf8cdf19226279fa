//! In-process store backend.
//!
//! Mirrors the PostgreSQL semantics closely enough for handler tests and
//! single-node development: uniqueness on email/username, atomic rotation
//! claims and single-use OTP/reset consumption. Every operation runs under
//! one lock, which gives the same all-or-nothing behaviour as the
//! conditional updates in the repositories.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use crowdship_core::otp::OtpPurpose;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId, Timestamp};

use crate::error::StoreError;
use crate::models::attempt::{AttemptKey, AttemptQuery, AttemptWindow, LoginAttempt, NewAttempt};
use crate::models::otp::{CreateOtp, OtpCode};
use crate::models::reset::{CreateResetToken, PasswordResetToken};
use crate::models::session::{CreateSession, UserSession};
use crate::models::user::{CreateProfile, CreateUser, Profile, User};
use crate::store::{AttemptLog, OtpStore, ResetTokenStore, SessionStore, StoreHealth, UserStore};

#[derive(Default)]
struct Inner {
    next_id: DbId,
    users: Vec<User>,
    profiles: Vec<Profile>,
    sessions: Vec<UserSession>,
    attempts: Vec<LoginAttempt>,
    otps: Vec<OtpCode>,
    resets: Vec<PasswordResetToken>,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, id: DbId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }
}

fn revoke_session(session: &mut UserSession, reason: RevokeReason, now: Timestamp) {
    session.is_active = false;
    session.revoked_at = Some(now);
    session.revoked_reason = Some(reason.as_str().to_string());
}

/// All stores in one mutex-guarded struct.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-applied write:
        // every mutation is a single push or field assignment.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Flip a user's `is_active` flag.
    pub fn set_user_active(&self, id: DbId, active: bool) -> bool {
        let mut inner = self.lock();
        match inner.user_mut(id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Copy of every session row, including revoked ones.
    pub fn sessions_snapshot(&self) -> Vec<UserSession> {
        self.lock().sessions.clone()
    }

    /// Copy of every attempt-log row.
    pub fn attempts_snapshot(&self) -> Vec<LoginAttempt> {
        self.lock().attempts.clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_with_profile(
        &self,
        user: &CreateUser,
        profile: &CreateProfile,
    ) -> Result<(User, Profile), StoreError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict { field: "email" });
        }
        if inner.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict { field: "username" });
        }

        let now = Utc::now();
        let created = User {
            id: inner.next_id(),
            email: user.email.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.clone(),
            email_verified: false,
            phone_verified: false,
            is_active: true,
            token_version: 0,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        let created_profile = Profile {
            user_id: created.id,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            phone: profile.phone.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.users.push(created.clone());
        inner.profiles.push(created_profile.clone());
        Ok((created, created_profile))
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_profile(&self, user_id: DbId) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .lock()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn record_login(&self, id: DbId) -> Result<(), StoreError> {
        if let Some(user) = self.lock().user_mut(id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_password(&self, id: DbId, password_hash: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(match inner.user_mut(id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn mark_email_verified(&self, id: DbId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(match inner.user_mut(id) {
            Some(user) if !user.email_verified => {
                user.email_verified = true;
                true
            }
            _ => false,
        })
    }

    async fn bump_token_version(&self, id: DbId) -> Result<i32, StoreError> {
        let mut inner = self.lock();
        match inner.user_mut(id) {
            Some(user) => {
                user.token_version += 1;
                Ok(user.token_version)
            }
            None => Err(StoreError::Unavailable(format!("user {id} does not exist"))),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, input: &CreateSession) -> Result<UserSession, StoreError> {
        let now = Utc::now();
        let session = UserSession {
            id: input.id,
            user_id: input.user_id,
            refresh_token_hash: input.refresh_token_hash.clone(),
            user_agent: input.user_agent.clone(),
            ip_address: input.ip_address.clone(),
            device_name: input.device_name.clone(),
            created_at: now,
            last_accessed_at: now,
            expires_at: input.expires_at,
            revoked_at: None,
            revoked_reason: None,
            is_active: true,
        };
        let mut inner = self.lock();
        if inner
            .sessions
            .iter()
            .any(|s| s.id == session.id || s.refresh_token_hash == session.refresh_token_hash)
        {
            return Err(StoreError::Unavailable("duplicate session".into()));
        }
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<UserSession>, StoreError> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_active_for_user(&self, user_id: DbId) -> Result<Vec<UserSession>, StoreError> {
        let now = Utc::now();
        let mut sessions: Vec<UserSession> = self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_valid_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        Ok(sessions)
    }

    async fn claim_for_rotation(&self, hash: &str) -> Result<Option<UserSession>, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let claimed = inner
            .sessions
            .iter_mut()
            .find(|s| s.refresh_token_hash == hash && s.is_valid_at(now))
            .map(|session| {
                revoke_session(session, RevokeReason::Rotated, now);
                session.last_accessed_at = now;
                session.clone()
            });
        Ok(claimed)
    }

    async fn revoke_by_hash(&self, hash: &str, reason: RevokeReason) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        Ok(
            match inner
                .sessions
                .iter_mut()
                .find(|s| s.refresh_token_hash == hash && s.is_active)
            {
                Some(session) => {
                    revoke_session(session, reason, now);
                    true
                }
                None => false,
            },
        )
    }

    async fn revoke(
        &self,
        id: SessionId,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        Ok(
            match inner
                .sessions
                .iter_mut()
                .find(|s| s.id == id && s.user_id == user_id && s.is_active)
            {
                Some(session) => {
                    revoke_session(session, reason, now);
                    true
                }
                None => false,
            },
        )
    }

    async fn revoke_all_for_user(
        &self,
        user_id: DbId,
        reason: RevokeReason,
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let mut count = 0;
        for session in inner
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            revoke_session(session, reason, now);
            count += 1;
        }
        Ok(count)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.expires_at >= now);
        Ok((before - inner.sessions.len()) as u64)
    }
}

fn matches_query(attempt: &LoginAttempt, query: &AttemptQuery) -> bool {
    let keyed = match &query.key {
        AttemptKey::Ip(ip) => attempt.ip_address == *ip,
        AttemptKey::Email(email) => attempt.email.as_deref() == Some(email.as_str()),
    };
    keyed
        && attempt.kind == query.kind.as_str()
        && attempt.created_at >= query.since
        && !(query.failures_only && attempt.success)
}

#[async_trait]
impl AttemptLog for MemoryStore {
    async fn record(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let row = LoginAttempt {
            id: inner.next_id(),
            kind: attempt.kind.as_str().to_string(),
            ip_address: attempt.ip_address.clone(),
            email: attempt.email.clone(),
            user_agent: attempt.user_agent.clone(),
            success: attempt.success,
            failure_reason: attempt.failure_reason.map(str::to_string),
            created_at: attempt.created_at,
        };
        inner.attempts.push(row);
        Ok(())
    }

    async fn window(&self, query: &AttemptQuery) -> Result<AttemptWindow, StoreError> {
        let inner = self.lock();
        let window = inner
            .attempts
            .iter()
            .filter(|a| matches_query(a, query))
            .fold(AttemptWindow::default(), |acc, a| AttemptWindow {
                count: acc.count + 1,
                oldest: Some(acc.oldest.map_or(a.created_at, |o| o.min(a.created_at))),
            });
        Ok(window)
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.attempts.len();
        inner.attempts.retain(|a| a.created_at >= cutoff);
        Ok((before - inner.attempts.len()) as u64)
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn issue(&self, input: &CreateOtp) -> Result<OtpCode, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        for code in inner
            .otps
            .iter_mut()
            .filter(|c| c.user_id == input.user_id && c.purpose == input.purpose.as_str())
            .filter(|c| !c.is_used)
        {
            code.is_used = true;
            code.used_at = Some(now);
        }
        let code = OtpCode {
            id: inner.next_id(),
            user_id: input.user_id,
            code_hash: input.code_hash.clone(),
            purpose: input.purpose.as_str().to_string(),
            created_at: now,
            expires_at: input.expires_at,
            used_at: None,
            is_used: false,
        };
        inner.otps.push(code.clone());
        Ok(code)
    }

    async fn consume(
        &self,
        user_id: DbId,
        purpose: OtpPurpose,
        code_hash: &str,
    ) -> Result<Option<OtpCode>, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let consumed = inner
            .otps
            .iter_mut()
            .rev()
            .find(|c| {
                c.user_id == user_id
                    && c.purpose == purpose.as_str()
                    && c.code_hash == code_hash
                    && !c.is_used
                    && c.expires_at > now
            })
            .map(|code| {
                code.is_used = true;
                code.used_at = Some(now);
                code.clone()
            });
        Ok(consumed)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn create(&self, input: &CreateResetToken) -> Result<PasswordResetToken, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        for token in inner
            .resets
            .iter_mut()
            .filter(|t| t.user_id == input.user_id && t.used_at.is_none())
        {
            token.used_at = Some(now);
        }
        let token = PasswordResetToken {
            id: inner.next_id(),
            user_id: input.user_id,
            token_hash: input.token_hash.clone(),
            created_at: now,
            expires_at: input.expires_at,
            used_at: None,
        };
        inner.resets.push(token.clone());
        Ok(token)
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<PasswordResetToken>, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        let consumed = inner
            .resets
            .iter_mut()
            .find(|t| t.token_hash == token_hash && t.used_at.is_none() && t.expires_at > now)
            .map(|token| {
                token.used_at = Some(now);
                token.clone()
            });
        Ok(consumed)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
