//! Periodic purge of expired sessions and aged-out attempt-log rows.
//!
//! Revoked sessions are kept until they expire: their rows are what lets a
//! replayed, already-rotated refresh token be recognized.

use std::time::Duration;

use chrono::Utc;
use crowdship_db::Stores;
use tokio_util::sync::CancellationToken;

/// How often to run and how long attempt rows are kept.
#[derive(Debug, Clone, Copy)]
pub struct CleanupSchedule {
    pub interval: Duration,
    pub attempt_retention_days: i64,
}

/// One purge pass. Returns `(sessions, attempts)` deleted.
pub async fn purge_once(stores: &Stores, attempt_retention_days: i64) -> (u64, u64) {
    let sessions = match stores.sessions.cleanup_expired().await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!(error = %e, "Session cleanup: purge of expired sessions failed");
            0
        }
    };

    let cutoff = Utc::now() - chrono::Duration::days(attempt_retention_days);
    let attempts = match stores.attempts.prune_before(cutoff).await {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!(error = %e, "Session cleanup: attempt-log prune failed");
            0
        }
    };

    (sessions, attempts)
}

/// Run the cleanup loop until `cancel` is triggered.
pub async fn run(stores: Stores, schedule: CleanupSchedule, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = schedule.interval.as_secs(),
        attempt_retention_days = schedule.attempt_retention_days,
        "Session cleanup job started"
    );

    let mut interval = tokio::time::interval(schedule.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                let (sessions, attempts) = purge_once(&stores, schedule.attempt_retention_days).await;
                if sessions > 0 || attempts > 0 {
                    tracing::info!(sessions, attempts, "Session cleanup: purged old rows");
                } else {
                    tracing::debug!("Session cleanup: no rows to purge");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crowdship_core::attempts::AttemptKind;
    use crowdship_core::roles::ROLE_USER;
    use crowdship_db::memory::MemoryStore;
    use crowdship_db::models::attempt::NewAttempt;
    use crowdship_db::models::session::CreateSession;
    use crowdship_db::models::user::{CreateProfile, CreateUser};
    use crowdship_db::store::{AttemptLog, SessionStore, UserStore};
    use uuid::Uuid;

    #[tokio::test]
    async fn purges_expired_sessions_and_old_attempts_only() {
        let store = Arc::new(MemoryStore::new());
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

        let now = Utc::now();
        for (hash, expires_at) in [
            ("expired", now - chrono::Duration::hours(1)),
            ("live", now + chrono::Duration::days(1)),
        ] {
            SessionStore::create(
                store.as_ref(),
                &CreateSession {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    refresh_token_hash: hash.into(),
                    expires_at,
                    user_agent: None,
                    ip_address: None,
                    device_name: None,
                },
            )
            .await
            .unwrap();
        }

        for age_days in [40, 1] {
            store
                .record(&NewAttempt {
                    kind: AttemptKind::Login,
                    ip_address: "10.0.0.1".into(),
                    email: None,
                    user_agent: None,
                    success: false,
                    failure_reason: None,
                    created_at: now - chrono::Duration::days(age_days),
                })
                .await
                .unwrap();
        }

        let stores = Stores::from_backend(store.clone());
        assert_eq!(purge_once(&stores, 30).await, (1, 1));
        assert_eq!(store.sessions_snapshot().len(), 1);
        assert_eq!(store.attempts_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Stores::memory(),
            CleanupSchedule {
                interval: Duration::from_secs(3600),
                attempt_retention_days: 30,
            },
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cleanup task should stop")
            .unwrap();
    }
}
