//! Handlers for the `/auth` resource.
//!
//! Each handler is a short linear state machine: rate-limit checks first,
//! then the credential or secret check, then the attempt-log write, then the
//! session work. Failed attempts are recorded before the error is returned so
//! the next limiter check sees them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use crowdship_core::attempts::{failure, AttemptKind};
use crowdship_core::error::{CoreError, FieldError};
use crowdship_core::hashing::hash_secret;
use crowdship_core::identity::{normalize_email, validate_password_strength, validate_username};
use crowdship_core::otp::{
    generate_otp_code, generate_reset_token, is_well_formed_code, OtpPurpose, OTP_TTL_MINS,
    RESET_TOKEN_TTL_MINS,
};
use crowdship_core::roles::ROLE_USER;
use crowdship_core::sessions::RevokeReason;
use crowdship_core::types::{DbId, SessionId};
use crowdship_db::models::attempt::AttemptKey;
use crowdship_db::models::otp::CreateOtp;
use crowdship_db::models::reset::CreateResetToken;
use crowdship_db::models::user::{CreateProfile, CreateUser, Profile, User, UserResponse};
use crowdship_db::StoreError;
use crowdship_events::AuthNotice;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::auth::cookie::{clear_refresh_cookie, read_refresh_cookie, refresh_cookie, set_cookie_headers};
use crate::auth::password::{hash_password, verify_against_dummy, verify_password};
use crate::auth::tokens::{IssuedSession, SessionMeta, TokenPair};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::context::RequestContext;
use crate::middleware::validated_json::ValidatedJson;
use crate::rate_limit::durable::attempt;
use crate::response::{ApiResponse, Created, MessageResponse};
use crate::state::AppState;

/// Identical for known and unknown emails.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, password reset instructions have been sent";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

fn rule_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn strong_password(password: &str) -> Result<(), ValidationError> {
    validate_password_strength(password).map_err(|msg| rule_error("password_strength", msg))
}

fn valid_username(username: &str) -> Result<(), ValidationError> {
    validate_username(username).map_err(|msg| rule_error("username", msg))
}

fn six_digit_code(code: &str) -> Result<(), ValidationError> {
    if is_well_formed_code(code) {
        Ok(())
    } else {
        Err(rule_error("code", "Code must be exactly 6 digits".into()))
    }
}

fn default_purpose() -> OtpPurpose {
    OtpPurpose::EmailVerify
}

/// Request body for `POST /auth/register`.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(custom(function = "strong_password"))]
    pub password: String,
    #[validate(custom(function = "valid_username"))]
    pub username: String,
    #[validate(length(max = 100, message = "First name is too long"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "Last name is too long"))]
    pub last_name: Option<String>,
    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub phone: Option<String>,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Optional body for `POST /auth/refresh` and `POST /auth/logout`. The
/// cookie is used when the body carries no token.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    #[validate(custom(function = "strong_password"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[serde(default = "default_purpose")]
    pub purpose: OtpPurpose,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    /// Identifies the account when no bearer token is presented.
    #[serde(default)]
    pub email: Option<String>,
    #[validate(custom(function = "six_digit_code"))]
    pub code: String,
    #[serde(default = "default_purpose")]
    pub purpose: OtpPurpose,
}

/// Returned by register, login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserResponse,
    pub tokens: TokenPair,
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllResponse {
    pub message: &'static str,
    pub revoked_sessions: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssued {
    pub message: &'static str,
    pub purpose: OtpPurpose,
    /// Seconds until the code expires.
    pub expires_in: i64,
    /// Echoed outside production only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OtpVerified {
    pub verified: bool,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: UserResponse,
    pub profile: Option<Profile>,
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/auth/register
///
/// Create an account and its profile, then start the first session.
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(input): ValidatedJson<RegisterRequest>,
) -> AppResult<(HeaderMap, Created<AuthPayload>)> {
    let limits = state.config.rate_limit.auth;
    state
        .attempts
        .enforce(&ctx, AttemptKind::Register, AttemptKey::Ip(ctx.ip.clone()), &limits.register)
        .await?;

    let email = normalize_email(&input.email);
    let username = input.username.trim().to_string();

    // Pre-check for a field-specific 409; the unique constraints still catch
    // a concurrent registration racing past it.
    let taken = if state.stores.users.find_by_email(&email).await?.is_some() {
        Some("email")
    } else if state.stores.users.find_by_username(&username).await?.is_some() {
        Some("username")
    } else {
        None
    };

    let created = match taken {
        Some(field) => Err(StoreError::Conflict { field }),
        None => {
            let password_hash = hash_password(&input.password)
                .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
            state
                .stores
                .users
                .create_with_profile(
                    &CreateUser {
                        email: email.clone(),
                        username,
                        password_hash,
                        role: ROLE_USER.to_string(),
                    },
                    &CreateProfile {
                        first_name: input.first_name,
                        last_name: input.last_name,
                        phone: input.phone,
                    },
                )
                .await
        }
    };

    let user = match created {
        Ok((user, _profile)) => user,
        Err(err) => {
            if matches!(err, StoreError::Conflict { .. }) {
                state
                    .attempts
                    .record(attempt(&ctx, AttemptKind::Register, Some(&email), Err(failure::CONFLICT)))
                    .await;
            }
            return Err(err.into());
        }
    };

    state
        .attempts
        .record(attempt(&ctx, AttemptKind::Register, Some(&email), Ok(())))
        .await;
    let issued = state.tokens.start_session(&user, &session_meta(&ctx)).await?;
    tracing::info!(user_id = user.id, ip = %ctx.ip, "User registered");

    Ok((
        session_cookie(&state, &issued),
        Created(auth_payload(&user, issued)),
    ))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(input): ValidatedJson<LoginRequest>,
) -> AppResult<(HeaderMap, ApiResponse<AuthPayload>)> {
    let limits = state.config.rate_limit.auth;
    let email = normalize_email(&input.email);

    // 1. Per-IP limit, then the email-keyed lockout.
    state
        .attempts
        .enforce(&ctx, AttemptKind::Login, AttemptKey::Ip(ctx.ip.clone()), &limits.login)
        .await?;
    state
        .attempts
        .enforce_lockout(&ctx, &email, &limits.brute_force)
        .await?;

    // 2. Find user by normalized email.
    let Some(mut user) = state.stores.users.find_by_email(&email).await? else {
        verify_against_dummy(&input.password);
        login_failed(&state, &ctx, &email, failure::UNKNOWN_EMAIL).await;
        return Err(CoreError::InvalidCredentials.into());
    };

    // 3. Check if the account is active.
    if !user.is_active {
        login_failed(&state, &ctx, &email, failure::ACCOUNT_INACTIVE).await;
        return Err(CoreError::AccountInactive.into());
    }

    // 4. Verify password.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !password_valid {
        login_failed(&state, &ctx, &email, failure::WRONG_PASSWORD).await;
        return Err(CoreError::InvalidCredentials.into());
    }

    // 5. Record the success and start a new session.
    state
        .attempts
        .record(attempt(&ctx, AttemptKind::Login, Some(&email), Ok(())))
        .await;
    state.stores.users.record_login(user.id).await?;
    user.last_login_at = Some(Utc::now());

    let issued = state.tokens.start_session(&user, &session_meta(&ctx)).await?;
    tracing::info!(user_id = user.id, session_id = %issued.session_id, "User logged in");

    Ok((
        session_cookie(&state, &issued),
        ApiResponse::ok(auth_payload(&user, issued)),
    ))
}

/// POST /api/auth/refresh
///
/// Rotate the presented refresh token (body `refreshToken` or cookie).
pub async fn refresh(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(HeaderMap, ApiResponse<AuthPayload>)> {
    let token = presented_refresh_token(&headers, &body)?.ok_or(CoreError::InvalidToken)?;
    let rotation = state.tokens.rotate(&token, &session_meta(&ctx)).await?;

    Ok((
        session_cookie(&state, &rotation.session),
        ApiResponse::ok(auth_payload(&rotation.user, rotation.session)),
    ))
}

/// POST /api/auth/logout
///
/// Revoke the presented refresh token's session. Always succeeds.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(HeaderMap, ApiResponse<MessageResponse>)> {
    if let Some(token) = presented_refresh_token(&headers, &body)? {
        let revoked = state.tokens.revoke(&token).await?;
        tracing::debug!(revoked, "Logout");
    }

    Ok((
        clear_cookie(&state),
        ApiResponse::ok(MessageResponse {
            message: "Logged out",
        }),
    ))
}

/// POST /api/auth/logout-all
///
/// Revoke every session of the caller.
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<(HeaderMap, ApiResponse<LogoutAllResponse>)> {
    let revoked = state
        .tokens
        .revoke_all(user.user_id, RevokeReason::LogoutAll)
        .await?;

    Ok((
        clear_cookie(&state),
        ApiResponse::ok(LogoutAllResponse {
            message: "Logged out of all sessions",
            revoked_sessions: revoked,
        }),
    ))
}

/// POST /api/auth/forgot-password
///
/// Emits a single-use reset token out of band. The response never reveals
/// whether the email exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(input): ValidatedJson<ForgotPasswordRequest>,
) -> AppResult<ApiResponse<MessageResponse>> {
    let rule = state.config.rate_limit.auth.forgot_password;
    let email = normalize_email(&input.email);

    state
        .attempts
        .enforce(&ctx, AttemptKind::ForgotPassword, AttemptKey::Ip(ctx.ip.clone()), &rule)
        .await?;
    state
        .attempts
        .enforce(&ctx, AttemptKind::ForgotPassword, AttemptKey::Email(email.clone()), &rule)
        .await?;
    state
        .attempts
        .record(attempt(&ctx, AttemptKind::ForgotPassword, Some(&email), Ok(())))
        .await;

    match state.stores.users.find_by_email(&email).await? {
        Some(user) if user.is_active => {
            // A failure here must look like success to the caller.
            if let Err(err) = send_reset_token(&state, &user).await {
                tracing::error!(user_id = user.id, error = %err, "Failed to issue reset token");
            }
        }
        _ => tracing::debug!("Password reset requested for unknown or inactive email"),
    }

    Ok(ApiResponse::ok(MessageResponse {
        message: FORGOT_PASSWORD_MESSAGE,
    }))
}

/// POST /api/auth/reset-password
///
/// Consume a reset token exactly once, set the new password and revoke
/// every session of the account.
pub async fn reset_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(input): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<ApiResponse<MessageResponse>> {
    let rule = state.config.rate_limit.auth.reset_password;
    state
        .attempts
        .enforce(&ctx, AttemptKind::ResetPassword, AttemptKey::Ip(ctx.ip.clone()), &rule)
        .await?;

    let consumed = state
        .stores
        .resets
        .consume(&hash_secret(input.token.trim()))
        .await?;
    let Some(reset) = consumed else {
        state
            .attempts
            .record(attempt(&ctx, AttemptKind::ResetPassword, None, Err(failure::INVALID_TOKEN)))
            .await;
        return Err(CoreError::InvalidResetToken.into());
    };

    let user = state
        .stores
        .users
        .find_by_id(reset.user_id)
        .await?
        .ok_or(CoreError::InvalidResetToken)?;
    if !user.is_active {
        state
            .attempts
            .record(attempt(
                &ctx,
                AttemptKind::ResetPassword,
                Some(&user.email),
                Err(failure::ACCOUNT_INACTIVE),
            ))
            .await;
        return Err(CoreError::AccountInactive.into());
    }

    let password_hash = hash_password(&input.new_password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;
    state
        .stores
        .users
        .update_password(user.id, &password_hash)
        .await?;
    let revoked = state
        .tokens
        .revoke_all(user.id, RevokeReason::PasswordReset)
        .await?;

    state
        .attempts
        .record(attempt(&ctx, AttemptKind::ResetPassword, Some(&user.email), Ok(())))
        .await;
    tracing::info!(user_id = user.id, revoked, "Password reset");

    Ok(ApiResponse::ok(MessageResponse {
        message: "Password has been reset. Please log in again.",
    }))
}

/// POST /api/auth/request-otp
///
/// Issue a 6-digit code for the caller. Earlier unused codes for the same
/// purpose stop working.
pub async fn request_otp(
    State(state): State<AppState>,
    ctx: RequestContext,
    user: AuthUser,
    ValidatedJson(input): ValidatedJson<RequestOtpRequest>,
) -> AppResult<ApiResponse<OtpIssued>> {
    let rule = state.config.rate_limit.auth.request_otp;
    state
        .attempts
        .enforce(&ctx, AttemptKind::OtpRequest, AttemptKey::Email(user.email.clone()), &rule)
        .await?;
    state
        .attempts
        .record(attempt(&ctx, AttemptKind::OtpRequest, Some(&user.email), Ok(())))
        .await;

    let code = generate_otp_code();
    state
        .stores
        .otps
        .issue(&CreateOtp {
            user_id: user.user_id,
            code_hash: hash_secret(&code),
            purpose: input.purpose,
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINS),
        })
        .await?;

    deliver(
        &state,
        AuthNotice::OneTimeCode {
            email: user.email.clone(),
            code: code.clone(),
            purpose: input.purpose,
            expires_in_mins: OTP_TTL_MINS,
        },
    )
    .await;
    tracing::info!(user_id = user.user_id, purpose = %input.purpose, "One-time code issued");

    Ok(ApiResponse::ok(OtpIssued {
        message: "Verification code sent",
        purpose: input.purpose,
        expires_in: OTP_TTL_MINS * 60,
        code: state.config.app_env.echoes_otp_codes().then_some(code),
    }))
}

/// POST /api/auth/verify-otp
///
/// The account comes from the bearer token when present, otherwise from the
/// `email` field. Without a token, failures are limited per email as well as
/// per IP, so rotating addresses does not buy more guesses at one account.
pub async fn verify_otp(
    State(state): State<AppState>,
    ctx: RequestContext,
    caller: Option<AuthUser>,
    ValidatedJson(input): ValidatedJson<VerifyOtpRequest>,
) -> AppResult<ApiResponse<OtpVerified>> {
    let rule = state.config.rate_limit.auth.verify_otp;
    state
        .attempts
        .enforce(&ctx, AttemptKind::OtpVerify, AttemptKey::Ip(ctx.ip.clone()), &rule)
        .await?;

    let (user_id, email): (Option<DbId>, String) = match caller {
        Some(user) => (Some(user.user_id), user.email),
        None => {
            let email = input
                .email
                .as_deref()
                .map(normalize_email)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    CoreError::InvalidFields(vec![FieldError::new(
                        "email",
                        "Email is required without an access token",
                    )])
                })?;
            state
                .attempts
                .enforce(&ctx, AttemptKind::OtpVerify, AttemptKey::Email(email.clone()), &rule)
                .await?;
            let user = state.stores.users.find_by_email(&email).await?;
            (user.map(|u| u.id), email)
        }
    };

    let consumed = match user_id {
        Some(id) => {
            state
                .stores
                .otps
                .consume(id, input.purpose, &hash_secret(&input.code))
                .await?
        }
        None => None,
    };
    let Some(otp) = consumed else {
        state
            .attempts
            .record(attempt(&ctx, AttemptKind::OtpVerify, Some(&email), Err(failure::INVALID_CODE)))
            .await;
        tracing::warn!(ip = %ctx.ip, purpose = %input.purpose, "One-time code rejected");
        return Err(CoreError::InvalidCode.into());
    };

    let active = state
        .stores
        .users
        .find_by_id(otp.user_id)
        .await?
        .is_some_and(|user| user.is_active);
    if !active {
        state
            .attempts
            .record(attempt(&ctx, AttemptKind::OtpVerify, Some(&email), Err(failure::ACCOUNT_INACTIVE)))
            .await;
        return Err(CoreError::AccountInactive.into());
    }

    if input.purpose == OtpPurpose::EmailVerify {
        state.stores.users.mark_email_verified(otp.user_id).await?;
    }
    state
        .attempts
        .record(attempt(&ctx, AttemptKind::OtpVerify, Some(&email), Ok(())))
        .await;

    Ok(ApiResponse::ok(OtpVerified {
        verified: true,
        purpose: input.purpose,
    }))
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: AuthUser) -> AppResult<ApiResponse<MeResponse>> {
    let account = state
        .stores
        .users
        .find_by_id(user.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "User",
            id: user.user_id.to_string(),
        })?;
    let profile = state.stores.users.find_profile(user.user_id).await?;

    Ok(ApiResponse::ok(MeResponse {
        user: UserResponse::from(&account),
        profile,
        session_id: user.session_id,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session_meta(ctx: &RequestContext) -> SessionMeta {
    SessionMeta {
        user_agent: ctx.user_agent.clone(),
        ip_address: Some(ctx.ip.clone()),
        device_name: None,
    }
}

fn auth_payload(user: &User, issued: IssuedSession) -> AuthPayload {
    AuthPayload {
        user: UserResponse::from(user),
        tokens: issued.tokens,
        session_id: issued.session_id,
    }
}

fn session_cookie(state: &AppState, issued: &IssuedSession) -> HeaderMap {
    set_cookie_headers(&refresh_cookie(
        &issued.tokens.refresh_token,
        state.tokens.jwt().refresh_ttl_secs(),
        state.config.refresh_cookie_secure,
    ))
}

fn clear_cookie(state: &AppState) -> HeaderMap {
    set_cookie_headers(&clear_refresh_cookie(state.config.refresh_cookie_secure))
}

/// The refresh token from the JSON body, falling back to the cookie.
fn presented_refresh_token(headers: &HeaderMap, body: &Bytes) -> AppResult<Option<String>> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
            .refresh_token
            .filter(|t| !t.trim().is_empty())
    };
    Ok(from_body.or_else(|| read_refresh_cookie(headers)))
}

async fn login_failed(state: &AppState, ctx: &RequestContext, email: &str, reason: &'static str) {
    tracing::warn!(email, ip = %ctx.ip, reason, "Login failed");
    state
        .attempts
        .record(attempt(ctx, AttemptKind::Login, Some(email), Err(reason)))
        .await;
}

async fn send_reset_token(state: &AppState, user: &User) -> AppResult<()> {
    let token = generate_reset_token();
    state
        .stores
        .resets
        .create(&CreateResetToken {
            user_id: user.id,
            token_hash: hash_secret(&token),
            expires_at: Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINS),
        })
        .await?;

    deliver(
        state,
        AuthNotice::PasswordReset {
            email: user.email.clone(),
            token,
            expires_in_mins: RESET_TOKEN_TTL_MINS,
        },
    )
    .await;
    Ok(())
}

/// Delivery failures are logged; the caller's response does not change.
async fn deliver(state: &AppState, notice: AuthNotice) {
    if let Err(err) = state.notifier.notify(&notice).await {
        tracing::error!(
            to = notice.recipient(),
            kind = notice.kind(),
            error = %err,
            "Failed to deliver auth notice"
        );
    }
}
