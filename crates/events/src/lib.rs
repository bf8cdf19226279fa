//! Out-of-band delivery of auth notices.
//!
//! Password-reset tokens and one-time codes never travel in an API response
//! in production; they are handed to a [`Notifier`] which delivers them over
//! a side channel (SMTP in deployments, the log in development, an in-memory
//! outbox in tests).

pub mod delivery;
pub mod notice;

use async_trait::async_trait;

pub use delivery::email::{EmailConfig, EmailError, SmtpNotifier};
pub use delivery::log::LogNotifier;
pub use delivery::memory::MemoryNotifier;
pub use notice::AuthNotice;

/// Error type for notice delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// A channel that can deliver [`AuthNotice`]s to the account holder.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &AuthNotice) -> Result<(), NotifyError>;
}
