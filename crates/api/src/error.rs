use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use crowdship_core::error::{CoreError, FieldError, RateLimitRejection};
use crowdship_db::StoreError;
use serde::Serialize;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Message shown to clients for any 500 outside development.
pub const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`StoreError`] for persistence
/// failures, and adds HTTP-specific variants. Implements [`IntoResponse`] to
/// produce the uniform error envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// The `error` object of the envelope.
///
/// Attached to every error response as an extension as well, so the
/// request-context middleware can stamp the correlation id into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            correlation_id: None,
            retry_after: None,
            details: None,
        }
    }
}

/// Unsanitized cause of a 500, kept out of the body unless the server runs in
/// development mode.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

#[derive(Serialize)]
struct Envelope<'a> {
    success: bool,
    error: &'a ErrorBody,
}

/// Serialized `{ "success": false, "error": body }`.
pub fn envelope_bytes(body: &ErrorBody) -> Vec<u8> {
    serde_json::to_vec(&Envelope {
        success: false,
        error: body,
    })
    .unwrap_or_default()
}

/// Render `{ "success": false, "error": body }` with `status`, keeping a copy
/// of `body` in the response extensions.
pub fn envelope_response(status: StatusCode, body: ErrorBody) -> Response {
    let mut response = (
        status,
        Json(Envelope {
            success: false,
            error: &body,
        }),
    )
        .into_response();
    response.extensions_mut().insert(body);
    response
}

/// `X-RateLimit-*` and `Retry-After` headers for a rejected request.
pub fn rejection_headers(rejection: &RateLimitRejection) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rejection.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(rejection.reset_at));
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(rejection.retry_after),
    );
    headers
}

impl AppError {
    /// Status and envelope body for this error, plus the internal cause for
    /// 500s.
    fn classify(&self) -> (StatusCode, ErrorBody, Option<String>) {
        match self {
            AppError::Core(core) => classify_core(core),
            AppError::Store(StoreError::Conflict { field }) => conflict(field),
            AppError::Store(err) => internal(err.to_string()),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new("BAD_REQUEST", msg.clone()),
                None,
            ),
            AppError::InternalError(msg) => internal(msg.clone()),
        }
    }
}

fn internal(detail: String) -> (StatusCode, ErrorBody, Option<String>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody::new("INTERNAL_ERROR", GENERIC_INTERNAL_MESSAGE),
        Some(detail),
    )
}

fn conflict(field: &str) -> (StatusCode, ErrorBody, Option<String>) {
    let message = match field {
        "email" => "Email is already registered".to_string(),
        "username" => "Username is already taken".to_string(),
        other => format!("{other} already exists"),
    };
    let mut body = ErrorBody::new("CONFLICT", message.clone());
    body.details = Some(vec![FieldError::new(field, message)]);
    (StatusCode::CONFLICT, body, None)
}

fn simple(status: StatusCode, code: &str, message: &str) -> (StatusCode, ErrorBody, Option<String>) {
    (status, ErrorBody::new(code, message), None)
}

fn classify_core(err: &CoreError) -> (StatusCode, ErrorBody, Option<String>) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("NOT_FOUND", format!("{entity} with id {id} not found")),
            None,
        ),
        CoreError::InvalidFields(fields) => {
            let mut body = ErrorBody::new("VALIDATION_ERROR", "Validation failed");
            body.details = Some(fields.clone());
            (StatusCode::BAD_REQUEST, body, None)
        }
        CoreError::Unauthorized(msg) => simple(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
        CoreError::InvalidCredentials => simple(
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "Invalid email or password",
        ),
        CoreError::InvalidToken => simple(
            StatusCode::UNAUTHORIZED,
            "INVALID_TOKEN",
            "Invalid or expired token",
        ),
        CoreError::InvalidSession => simple(
            StatusCode::UNAUTHORIZED,
            "INVALID_SESSION",
            "Session is invalid or has expired",
        ),
        CoreError::InvalidCode => simple(
            StatusCode::BAD_REQUEST,
            "INVALID_CODE",
            "Invalid or expired code",
        ),
        CoreError::InvalidResetToken => simple(
            StatusCode::BAD_REQUEST,
            "INVALID_RESET_TOKEN",
            "Invalid or expired reset token",
        ),
        CoreError::AccountInactive => simple(
            StatusCode::FORBIDDEN,
            "ACCOUNT_INACTIVE",
            "Account is deactivated",
        ),
        CoreError::RateLimited(rejection) => {
            let mut body = ErrorBody::new(rejection.code, rejection.message.clone());
            body.retry_after = Some(rejection.retry_after);
            (StatusCode::TOO_MANY_REQUESTS, body, None)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body, detail) = self.classify();
        let mut response = envelope_response(status, body);

        if let AppError::Core(CoreError::RateLimited(rejection)) = &self {
            response.headers_mut().extend(rejection_headers(rejection));
        }
        if let Some(detail) = detail {
            response.extensions_mut().insert(InternalDetail(detail));
        }
        response
    }
}
