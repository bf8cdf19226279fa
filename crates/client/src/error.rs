/// Errors surfaced by [`crate::AuthClient`].
///
/// `Clone` so one refresh outcome can be handed to every request that joined
/// it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The request never produced an HTTP response (DNS, TLS, connection).
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The server answered with the error envelope.
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        retry_after: Option<u64>,
    },

    /// The response body was not the expected envelope.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// The silent refresh failed. Stored credentials have been cleared and
    /// the user must log in again.
    #[error("Session expired")]
    SessionExpired,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
