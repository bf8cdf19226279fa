//! Authenticated API client with a one-retry budget.
//!
//! Every call goes through [`AuthClient::send`]. A `401` triggers one silent
//! refresh and one retry of the original request, never more. Parallel
//! requests that hit `401` together share a single refresh: the first one
//! starts it, the rest await the same [`Shared`] future.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::credentials::{CredentialStore, Credentials};
use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{AuthPayload, Envelope, LoginRequest, RefreshRequest};

const UNAUTHORIZED: u16 = 401;

pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";

type RefreshFuture = Shared<BoxFuture<'static, Result<Credentials, ClientError>>>;

pub struct AuthClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    /// The refresh currently in flight, if any.
    refreshing: Mutex<Option<RefreshFuture>>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
            refreshing: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.get()
    }

    /// Log in and store the issued tokens.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, ClientError> {
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let response = self
            .transport
            .execute(HttpRequest::new(Method::POST, LOGIN_PATH).json(body))
            .await?;
        let payload: AuthPayload = decode(&response)?;
        self.credentials.set(credentials_from(&payload));
        Ok(payload)
    }

    /// Revoke the current session server-side and forget local credentials.
    /// Local state is cleared even when the server cannot be reached.
    pub async fn logout(&self) {
        let refresh_token = self.credentials.get().and_then(|c| c.refresh_token);
        self.credentials.clear();

        let mut request = HttpRequest::new(Method::POST, LOGOUT_PATH);
        if let Some(token) = refresh_token {
            request = request.json(serde_json::json!({ "refreshToken": token }));
        }
        if let Err(err) = self.transport.execute(request).await {
            tracing::warn!(error = %err, "Logout request failed, local credentials cleared anyway");
        }
    }

    /// Send an API request with the stored access token.
    ///
    /// On `401` the request is retried exactly once: with the current access
    /// token if another request already refreshed it, otherwise after a
    /// refresh. A failed refresh clears credentials and returns
    /// [`ClientError::SessionExpired`].
    pub async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ClientError> {
        let sent_with = self.credentials.get().map(|c| c.access_token);
        let response = self
            .transport
            .execute(with_bearer(request.clone(), sent_with.clone()))
            .await?;
        if response.status != UNAUTHORIZED {
            return decode(&response);
        }

        let current = self.credentials.get().map(|c| c.access_token);
        let token = match current {
            Some(token) if Some(&token) != sent_with.as_ref() => {
                tracing::debug!(path = %request.path, "Access token changed while request was in flight, retrying");
                token
            }
            _ => self.refresh().await?.access_token,
        };

        let retried = self
            .transport
            .execute(with_bearer(request, Some(token)))
            .await?;
        decode(&retried)
    }

    /// Rotate the refresh token, joining a refresh already in flight.
    pub async fn refresh(&self) -> Result<Credentials, ClientError> {
        let refresh = {
            let mut slot = lock(&self.refreshing);
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let started = refresh_once(self.transport.clone(), self.credentials.clone())
                        .boxed()
                        .shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        let result = refresh.clone().await;

        let mut slot = lock(&self.refreshing);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&refresh)) {
            *slot = None;
        }
        result
    }
}

async fn refresh_once(
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
) -> Result<Credentials, ClientError> {
    let mut request = HttpRequest::new(Method::POST, REFRESH_PATH);
    if let Some(token) = credentials.get().and_then(|c| c.refresh_token) {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &token,
        })
        .map_err(|e| ClientError::Decode(e.to_string()))?;
        request = request.json(body);
    }

    let outcome = match transport.execute(request).await {
        Ok(response) => decode::<AuthPayload>(&response),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(payload) => {
            let fresh = credentials_from(&payload);
            credentials.set(fresh.clone());
            tracing::debug!("Access token refreshed");
            Ok(fresh)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Token refresh failed, clearing credentials");
            credentials.clear();
            Err(ClientError::SessionExpired)
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_bearer(mut request: HttpRequest, token: Option<String>) -> HttpRequest {
    request.bearer = token;
    request
}

fn credentials_from(payload: &AuthPayload) -> Credentials {
    Credentials {
        access_token: payload.tokens.access_token.clone(),
        refresh_token: Some(payload.tokens.refresh_token.clone()),
    }
}

/// Unwrap the success envelope or turn the error envelope into
/// [`ClientError::Api`].
fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClientError> {
    let envelope: Envelope<T> = response.json()?;
    match (envelope.success, envelope.data, envelope.error) {
        (true, Some(data), _) => Ok(data),
        (_, _, Some(error)) => Err(ClientError::Api {
            status: response.status,
            code: error.code,
            message: error.message,
            retry_after: error.retry_after,
        }),
        _ => Err(ClientError::Decode(format!(
            "status {} without data or error",
            response.status
        ))),
    }
}
