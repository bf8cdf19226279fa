//! Outbox that keeps every notice in memory, for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{AuthNotice, Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<AuthNotice>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notice delivered so far, oldest first.
    pub fn sent(&self) -> Vec<AuthNotice> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent notice addressed to `email`.
    pub fn last_for(&self, email: &str) -> Option<AuthNotice> {
        self.sent().into_iter().rev().find(|n| n.recipient() == email)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notice: &AuthNotice) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notice.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_notices_in_order() {
        let outbox = MemoryNotifier::new();
        for token in ["one", "two"] {
            outbox
                .notify(&AuthNotice::PasswordReset {
                    email: "a@b.com".into(),
                    token: token.into(),
                    expires_in_mins: 60,
                })
                .await
                .unwrap();
        }
        assert_eq!(outbox.sent().len(), 2);
        assert_matches_token(outbox.last_for("a@b.com"), "two");
        assert!(outbox.last_for("other@b.com").is_none());
    }

    fn assert_matches_token(notice: Option<AuthNotice>, expected: &str) {
        match notice {
            Some(AuthNotice::PasswordReset { token, .. }) => assert_eq!(token, expected),
            other => panic!("unexpected notice: {other:?}"),
        }
    }
}
