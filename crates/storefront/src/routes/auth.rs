//! Authentication route handlers.
//!
//! Registration is a three step flow: `send-otp` emails a code, `verify-otp`
//! marks the address as verified in the server session, and `register`
//! creates the account for that address. Password resets reuse the same
//! challenge machinery with a different purpose.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tower_sessions::{Session, cookie::Cookie};

use bazaar_core::{Email, UserId, UserRole};

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireUser, auth_rate_limiter};
use crate::models::session::keys;
use crate::models::user::User;
use crate::services::auth::validate_password;
use crate::services::otp::{self, OtpChallenge, OtpPurpose};
use crate::services::token::{auth_cookie, removal_cookie, set_cookie_header, token_from_headers};
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

/// Build the auth router, mounted at `/api/auth`.
///
/// Credential and OTP endpoints sit behind the per-IP rate limiter when
/// `rate_limit` is set.
pub fn router(rate_limit: bool) -> Router<AppState> {
    let limited = Router::new()
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-pass", post(forgot_password))
        .route("/reset-pass", post(reset_password));
    let limited = if rate_limit {
        limited.layer(auth_rate_limiter())
    } else {
        limited
    };

    Router::new()
        .route("/validate-token", get(validate_token))
        .route("/get-existing-user", get(validate_token))
        .route("/logout", post(logout))
        .route("/change-pass", post(change_password))
        .merge(limited)
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub otp: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Identity reported by `validate-token`; both fields are null for guests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    pub user_id: Option<UserId>,
    pub user_role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: &'static str,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub message: &'static str,
    pub email: Email,
    pub verified: bool,
}

// =============================================================================
// Session token
// =============================================================================

/// Report who the token cookie belongs to.
///
/// An invalid or expired token is cleared so the browser stops sending it.
pub async fn validate_token(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = token_from_headers(&headers) else {
        return Json(CurrentUserResponse {
            user_id: None,
            user_role: None,
        })
        .into_response();
    };

    match state.tokens().verify(&token) {
        Ok(claims) => Json(CurrentUserResponse {
            user_id: Some(claims.user_id),
            user_role: Some(claims.user_role),
        })
        .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Clearing invalid token cookie");
            let response = (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Invalid or Expired token" })),
            )
                .into_response();
            with_cookie(response, &removal_cookie(state.config().secure_cookies))
        }
    }
}

/// Clear the token cookie.
pub async fn logout(State(state): State<AppState>) -> Response {
    clear_sentry_user();
    with_cookie(
        MessageResponse::new("Logged out successfully").into_response(),
        &removal_cookie(state.config().secure_cookies),
    )
}

// =============================================================================
// Email verification
// =============================================================================

/// Email a registration code and remember it in the session.
pub async fn send_otp(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let body = json_body(payload)?;
    let email = required(body.email, "Email is required")?;
    let email = Email::parse(&email).map_err(AuthError::from)?;

    let challenge = OtpChallenge::new(email, OtpPurpose::Registration, Utc::now());
    // Only a delivered code is worth storing.
    state
        .email()
        .send_otp_code(challenge.email().as_str(), challenge.code())
        .await?;
    otp::store_challenge(&session, &challenge).await?;

    tracing::info!("Registration code sent");
    Ok(MessageResponse::new(format!(
        "Code sent to {} successfully",
        challenge.email()
    )))
}

/// Check a registration code and mark the address as verified.
pub async fn verify_otp(
    session: Session,
    payload: std::result::Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<VerifiedResponse>> {
    let body = json_body(payload)?;
    let (Some(email), Some(code)) = (non_blank(body.email), non_blank(body.otp)) else {
        return Err(AppError::BadRequest("Email, OTP are required".to_owned()));
    };
    let email = Email::parse(&email).map_err(AuthError::from)?;

    otp::verify_challenge(&session, OtpPurpose::Registration, &email, &code).await?;
    session.insert(keys::VERIFIED_EMAIL, &email).await?;

    Ok(Json(VerifiedResponse {
        message: "OTP verified successfully",
        email,
        verified: true,
    }))
}

// =============================================================================
// Registration & login
// =============================================================================

/// Create an account for the address verified in this session.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let body = json_body(payload)?;
    let (Some(email), Some(password)) = (non_blank(body.email), body.password) else {
        return Err(AppError::BadRequest("All fields are required".to_owned()));
    };
    let email = Email::parse(&email).map_err(AuthError::from)?;
    validate_password(&password)?;

    let verified = session.get::<Email>(keys::VERIFIED_EMAIL).await?;
    if verified.as_ref() != Some(&email) {
        return Err(AppError::BadRequest("Email not verified".to_owned()));
    }

    let user = AuthService::new(state.pool())
        .register(&email, &password)
        .await?;
    session.remove::<Email>(keys::VERIFIED_EMAIL).await?;

    tracing::info!(user_id = %user.id, "User registered");
    signed_in(&state, &user, StatusCode::CREATED, "Registration successful")
}

/// Log in with email and password.
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let body = json_body(payload)?;
    let (Some(email), Some(password)) = (non_blank(body.email), body.password) else {
        return Err(AppError::BadRequest("All fields are required".to_owned()));
    };
    // A malformed address can't belong to an account.
    let email = Email::parse(&email).map_err(|_| AuthError::InvalidCredentials)?;

    let user = AuthService::new(state.pool()).login(&email, &password).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    signed_in(&state, &user, StatusCode::OK, "Login successful")
}

fn signed_in(
    state: &AppState,
    user: &User,
    status: StatusCode,
    message: &'static str,
) -> Result<Response> {
    let token = state.tokens().issue(user.id, user.role)?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let cookie = auth_cookie(token.clone(), state.config().secure_cookies);
    let response = (status, Json(TokenResponse { message, token })).into_response();
    Ok(with_cookie(response, &cookie))
}

// =============================================================================
// Passwords
// =============================================================================

/// Email a password reset code if the account exists.
///
/// The response doesn't reveal whether it does.
pub async fn forgot_password(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let body = json_body(payload)?;
    let email = required(body.email, "Email is required")?;
    let email = Email::parse(&email).map_err(AuthError::from)?;

    if AuthService::new(state.pool()).exists(&email).await? {
        let challenge = OtpChallenge::new(email, OtpPurpose::PasswordReset, Utc::now());
        match state
            .email()
            .send_reset_code(challenge.email().as_str(), challenge.code())
            .await
        {
            Ok(()) => otp::store_challenge(&session, &challenge).await?,
            Err(e) => tracing::error!(error = %e, "Failed to send password reset code"),
        }
    }

    Ok(MessageResponse::new(
        "If the account exists, a reset code has been sent",
    ))
}

/// Set a new password using an emailed reset code.
pub async fn reset_password(
    State(state): State<AppState>,
    session: Session,
    payload: std::result::Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let body = json_body(payload)?;
    let (Some(email), Some(code), Some(new_password)) = (
        non_blank(body.email),
        non_blank(body.otp),
        body.new_password,
    ) else {
        return Err(AppError::BadRequest(
            "Email, OTP and new password are required".to_owned(),
        ));
    };
    let email = Email::parse(&email).map_err(AuthError::from)?;
    // Checked before the code so a weak password doesn't burn the challenge.
    validate_password(&new_password)?;

    otp::verify_challenge(&session, OtpPurpose::PasswordReset, &email, &code).await?;
    AuthService::new(state.pool())
        .reset_password(&email, &new_password)
        .await?;

    Ok(MessageResponse::new("Password reset successfully"))
}

/// Change the logged-in user's password.
pub async fn change_password(
    RequireUser(claims): RequireUser,
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let body = json_body(payload)?;
    let (Some(current), Some(new)) = (body.current_password, body.new_password) else {
        return Err(AppError::BadRequest("All fields are required".to_owned()));
    };

    AuthService::new(state.pool())
        .change_password(claims.user_id, &current, &new)
        .await?;

    Ok(MessageResponse::new("Password changed successfully"))
}

// =============================================================================
// Helpers
// =============================================================================

/// Unwrap a JSON body, turning axum's plain-text rejection into a JSON error.
fn json_body<T: DeserializeOwned>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    non_blank(value).ok_or_else(|| AppError::BadRequest(message.to_owned()))
}

fn with_cookie(mut response: Response, cookie: &Cookie<'_>) -> Response {
    match set_cookie_header(cookie) {
        Some(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        None => tracing::error!("Token cookie is not a valid header value"),
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("   ".to_owned())), None);
        assert_eq!(non_blank(Some("a".to_owned())).as_deref(), Some("a"));
    }

    #[test]
    fn test_required_message() {
        let err = required(Some(String::new()), "Email is required").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Email is required"));
    }

    #[test]
    fn test_with_cookie_appends_header() {
        let response = with_cookie(
            StatusCode::OK.into_response(),
            &auth_cookie("abc".to_owned(), false),
        );
        let value = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(value.to_str().unwrap().starts_with("token=abc"));
    }

    #[test]
    fn test_requests_accept_camel_case() {
        let body: ResetPasswordRequest =
            serde_json::from_str(r#"{"email":"a@b.c","otp":"123456","newPassword":"x"}"#)
                .unwrap();
        assert_eq!(body.new_password.as_deref(), Some("x"));

        let body: ChangePasswordRequest =
            serde_json::from_str(r#"{"currentPassword":"a","newPassword":"b"}"#).unwrap();
        assert_eq!(body.current_password.as_deref(), Some("a"));
    }
}
