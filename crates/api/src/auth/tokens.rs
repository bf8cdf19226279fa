//! Session-aware token service.
//!
//! Every refresh token is bound to one `user_sessions` row through its `sid`
//! claim and the SHA-256 of the token itself. Refreshing claims that row with
//! a single conditional update before the new pair is minted, so two
//! concurrent refreshes with the same token can never both succeed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use crowdship_core::error::CoreError;
use crowdship_core::hashing::hash_secret;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId, Timestamp};
use crowdship_db::models::session::CreateSession;
use crowdship_db::models::user::User;
use crowdship_db::store::{SessionStore, UserStore};
use serde::Serialize;
use uuid::Uuid;

use super::jwt::{
    generate_access_token, generate_refresh_token, validate_access_token, validate_refresh_token,
    AccessClaims, JwtConfig, RefreshClaims, TokenError,
};
use crate::error::{AppError, AppResult};

/// Access and refresh token pair returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: &'static str,
}

/// Client metadata recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub device_name: Option<String>,
}

/// A freshly persisted session and the tokens bound to it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: SessionId,
    pub tokens: TokenPair,
    pub refresh_expires_at: Timestamp,
}

/// Result of a successful refresh.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub user: User,
    pub session: IssuedSession,
}

pub struct TokenService {
    jwt: JwtConfig,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

fn signing_error(err: jsonwebtoken::errors::Error) -> AppError {
    AppError::InternalError(format!("Token generation error: {err}"))
}

impl TokenService {
    pub fn new(jwt: JwtConfig, users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            jwt,
            users,
            sessions,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    /// Sign a token pair for `user` under session `sid`. Nothing is
    /// persisted; see [`start_session`](Self::start_session).
    pub fn issue(&self, user: &User, sid: SessionId) -> AppResult<TokenPair> {
        let access_token =
            generate_access_token(user.id, &user.email, &user.role, sid, &self.jwt)
                .map_err(signing_error)?;
        let refresh_token = generate_refresh_token(user.id, sid, user.token_version, &self.jwt)
            .map_err(signing_error)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_ttl_secs(),
            token_type: "Bearer",
        })
    }

    /// Create a new session for `user` and mint the tokens bound to it.
    pub async fn start_session(&self, user: &User, meta: &SessionMeta) -> AppResult<IssuedSession> {
        let session_id = Uuid::new_v4();
        let tokens = self.issue(user, session_id)?;
        let refresh_expires_at = Utc::now() + Duration::seconds(self.jwt.refresh_ttl_secs());

        self.sessions
            .create(&CreateSession {
                id: session_id,
                user_id: user.id,
                refresh_token_hash: hash_secret(&tokens.refresh_token),
                expires_at: refresh_expires_at,
                user_agent: meta.user_agent.clone(),
                ip_address: meta.ip_address.clone(),
                device_name: meta.device_name.clone(),
            })
            .await?;

        tracing::debug!(user_id = user.id, %session_id, "Session started");
        Ok(IssuedSession {
            session_id,
            tokens,
            refresh_expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        validate_access_token(token, &self.jwt)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        validate_refresh_token(token, &self.jwt)
    }

    /// Exchange `refresh_token` for a new pair under a new session.
    ///
    /// The old session is claimed (revoked as `rotated`) before anything is
    /// minted. A bad signature or expired token fails with `InvalidToken`;
    /// every other failure is `InvalidSession`.
    pub async fn rotate(&self, refresh_token: &str, meta: &SessionMeta) -> AppResult<Rotation> {
        let claims = self
            .verify_refresh(refresh_token)
            .map_err(|_| CoreError::InvalidToken)?;
        let hash = hash_secret(refresh_token);

        let Some(claimed) = self.sessions.claim_for_rotation(&hash).await? else {
            self.detect_reuse(&claims, &hash).await?;
            return Err(CoreError::InvalidSession.into());
        };

        if claimed.id != claims.sid || claimed.user_id != claims.sub {
            tracing::warn!(
                session_id = %claimed.id,
                claimed_sid = %claims.sid,
                "Refresh token does not match its session row"
            );
            return Err(CoreError::InvalidSession.into());
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(CoreError::InvalidSession)?;

        if claims.ver != user.token_version {
            tracing::warn!(
                user_id = user.id,
                token_version = claims.ver,
                current_version = user.token_version,
                "Refresh token minted before a revoke-all"
            );
            return Err(CoreError::InvalidSession.into());
        }

        let meta = SessionMeta {
            user_agent: meta.user_agent.clone().or(claimed.user_agent),
            ip_address: meta.ip_address.clone().or(claimed.ip_address),
            device_name: meta.device_name.clone().or(claimed.device_name),
        };
        let session = self.start_session(&user, &meta).await?;

        tracing::info!(
            user_id = user.id,
            old_session = %claimed.id,
            new_session = %session.session_id,
            "Session rotated"
        );
        Ok(Rotation { user, session })
    }

    /// A correctly signed token whose session was already rotated means the
    /// token was copied. Revoke every session of that user.
    async fn detect_reuse(&self, claims: &RefreshClaims, hash: &str) -> AppResult<()> {
        let Some(session) = self.sessions.find_by_id(claims.sid).await? else {
            return Ok(());
        };
        if session.user_id != claims.sub
            || !session.was_rotated()
            || session.refresh_token_hash != hash
        {
            return Ok(());
        }

        let revoked = self
            .revoke_all(claims.sub, RevokeReason::ReuseDetected)
            .await?;
        tracing::warn!(
            user_id = claims.sub,
            session_id = %claims.sid,
            revoked,
            "Rotated refresh token presented again, all sessions revoked"
        );
        Ok(())
    }

    /// Revoke the session holding `refresh_token`. Unknown or already
    /// revoked tokens are not an error; returns whether a row changed.
    pub async fn revoke(&self, refresh_token: &str) -> AppResult<bool> {
        let revoked = self
            .sessions
            .revoke_by_hash(&hash_secret(refresh_token), RevokeReason::Logout)
            .await?;
        Ok(revoked)
    }

    /// Revoke one session owned by `user_id`.
    pub async fn revoke_session(&self, user_id: DbId, session_id: SessionId) -> AppResult<bool> {
        let revoked = self
            .sessions
            .revoke(session_id, user_id, RevokeReason::UserRevoked)
            .await?;
        Ok(revoked)
    }

    /// Revoke every session of `user_id` and bump its token version so
    /// refresh tokens minted earlier are dead even without their rows.
    pub async fn revoke_all(&self, user_id: DbId, reason: RevokeReason) -> AppResult<u64> {
        let revoked = self.sessions.revoke_all_for_user(user_id, reason).await?;
        self.users.bump_token_version(user_id).await?;
        tracing::info!(user_id, revoked, reason = %reason, "All sessions revoked");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crowdship_core::roles::ROLE_USER;
    use crowdship_db::memory::MemoryStore;
    use crowdship_db::models::user::{CreateProfile, CreateUser};

    fn jwt() -> JwtConfig {
        JwtConfig {
            access_secret: "test-access-secret-0123456789abcdef".into(),
            refresh_secret: "test-refresh-secret-0123456789abcdef".into(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, TokenService, User) {
        let store = Arc::new(MemoryStore::new());
        let service = TokenService::new(jwt(), store.clone(), store.clone());
        let (user, _) = store
            .create_with_profile(
                &CreateUser {
                    email: "a@b.com".into(),
                    username: "abc".into(),
                    password_hash: "unused".into(),
                    role: ROLE_USER.into(),
                },
                &CreateProfile::default(),
            )
            .await
            .unwrap();
        (store, service, user)
    }

    #[tokio::test]
    async fn issued_pair_has_distinct_tokens() {
        let (_store, service, user) = setup().await;
        let sid = Uuid::new_v4();
        let pair = service.issue(&user, sid).unwrap();

        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(pair.expires_in, 900);
        assert_eq!(service.verify_access(&pair.access_token).unwrap().sid, sid);
        assert_eq!(service.verify_refresh(&pair.refresh_token).unwrap().sid, sid);
    }

    #[tokio::test]
    async fn session_row_holds_only_the_hash() {
        let (store, service, user) = setup().await;
        let issued = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();

        let sessions = store.sessions_snapshot();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, issued.session_id);
        assert_ne!(sessions[0].refresh_token_hash, issued.tokens.refresh_token);
        assert_eq!(
            sessions[0].refresh_token_hash,
            hash_secret(&issued.tokens.refresh_token)
        );
    }

    #[tokio::test]
    async fn rotate_succeeds_once_then_invalid_session() {
        let (_store, service, user) = setup().await;
        let issued = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();
        let token = issued.tokens.refresh_token;

        let rotation = service.rotate(&token, &SessionMeta::default()).await.unwrap();
        assert_eq!(rotation.user.id, user.id);
        assert_ne!(rotation.session.session_id, issued.session_id);

        let again = service.rotate(&token, &SessionMeta::default()).await;
        assert_matches!(again, Err(AppError::Core(CoreError::InvalidSession)));
    }

    #[tokio::test]
    async fn replaying_a_rotated_token_revokes_every_session() {
        let (store, service, user) = setup().await;
        let first = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();
        let rotated = service
            .rotate(&first.tokens.refresh_token, &SessionMeta::default())
            .await
            .unwrap();

        let _ = service
            .rotate(&first.tokens.refresh_token, &SessionMeta::default())
            .await;

        let now = Utc::now();
        assert!(store.sessions_snapshot().iter().all(|s| !s.is_valid_at(now)));
        // The successor was minted under the old token version.
        let successor = service
            .rotate(&rotated.session.tokens.refresh_token, &SessionMeta::default())
            .await;
        assert_matches!(successor, Err(AppError::Core(CoreError::InvalidSession)));
    }

    #[tokio::test]
    async fn garbage_refresh_token_is_invalid_token() {
        let (_store, service, _user) = setup().await;
        let result = service.rotate("not-a-jwt", &SessionMeta::default()).await;
        assert_matches!(result, Err(AppError::Core(CoreError::InvalidToken)));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (_store, service, user) = setup().await;
        let issued = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();

        assert!(service.revoke(&issued.tokens.refresh_token).await.unwrap());
        assert!(!service.revoke(&issued.tokens.refresh_token).await.unwrap());
        assert!(!service.revoke("never-issued").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_all_kills_every_refresh_token() {
        let (_store, service, user) = setup().await;
        let a = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();
        let b = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();

        let revoked = service
            .revoke_all(user.id, RevokeReason::LogoutAll)
            .await
            .unwrap();
        assert_eq!(revoked, 2);

        for token in [a.tokens.refresh_token, b.tokens.refresh_token] {
            let result = service.rotate(&token, &SessionMeta::default()).await;
            assert_matches!(result, Err(AppError::Core(CoreError::InvalidSession)));
        }
    }

    #[tokio::test]
    async fn inactive_user_cannot_refresh() {
        let (store, service, user) = setup().await;
        let issued = service
            .start_session(&user, &SessionMeta::default())
            .await
            .unwrap();
        store.set_user_active(user.id, false);

        let result = service
            .rotate(&issued.tokens.refresh_token, &SessionMeta::default())
            .await;
        assert_matches!(result, Err(AppError::Core(CoreError::InvalidSession)));
    }
}
