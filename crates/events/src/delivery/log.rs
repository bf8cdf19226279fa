//! Development delivery: records that a notice was produced without sending
//! it anywhere.

use async_trait::async_trait;

use crate::{AuthNotice, Notifier, NotifyError};

/// Logs notice metadata at `info`. The secret itself is never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &AuthNotice) -> Result<(), NotifyError> {
        tracing::info!(
            to = notice.recipient(),
            kind = notice.kind(),
            "Auth notice produced (no SMTP configured)"
        );
        Ok(())
    }
}
