//! Signed session tokens.
//!
//! A login issues an HS256 JWT carrying the user's ID and role. It travels in
//! the HTTP-only `token` cookie, or as `Authorization: Bearer <token>` for
//! non-browser clients.

use axum::http::{HeaderMap, HeaderValue, header};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use bazaar_core::{UserId, UserRole};

/// Name of the auth cookie.
pub const TOKEN_COOKIE: &str = "token";

/// Token and cookie lifetime (1 day).
pub const TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Errors from issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signature, format or expiry check failed.
    #[error("invalid or expired token")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    /// Signing failed.
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: UserId,
    pub user_role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service signing with `secret`.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        }
    }

    /// Issue a token for a user, valid for [`TOKEN_TTL_SECONDS`].
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue(&self, user_id: UserId, user_role: UserRole) -> Result<String, TokenError> {
        self.issue_at(user_id, user_role, Utc::now().timestamp())
    }

    fn issue_at(
        &self,
        user_id: UserId,
        user_role: UserRole,
        issued_at: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id,
            user_role,
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECONDS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` for a bad signature, malformed token or
    /// expired token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

/// Find the raw token in the `token` cookie, falling back to a bearer header.
#[must_use]
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_owned());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    })
}

/// Build the auth cookie holding `token`.
#[must_use]
pub fn auth_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(TOKEN_TTL_SECONDS))
        .secure(secure)
        .build()
}

/// Build a cookie that makes the browser drop the auth cookie.
#[must_use]
pub fn removal_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::ZERO)
        .secure(secure)
        .build()
}

/// Render a cookie as a `Set-Cookie` header value.
#[must_use]
pub fn set_cookie_header(cookie: &Cookie<'_>) -> Option<HeaderValue> {
    HeaderValue::from_str(&cookie.to_string()).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&SecretString::from("kR8#vQ2!mZ5@pL9$wX3^tY7&nB4*cF6%"))
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = service();
        let token = tokens.issue(UserId::new(7), UserRole::Admin).unwrap();
        let claims = tokens.verify(&token).unwrap();

        assert_eq!(claims.user_id, UserId::new(7));
        assert_eq!(claims.user_role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECONDS);
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service();
        let two_days_ago = Utc::now().timestamp() - 2 * TOKEN_TTL_SECONDS;
        let token = tokens
            .issue_at(UserId::new(1), UserRole::User, two_days_ago)
            .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_tampered_or_foreign_token_rejected() {
        let tokens = service();
        let token = tokens.issue(UserId::new(1), UserRole::User).unwrap();

        let other = TokenService::new(&SecretString::from("Zq9!xW2@eR4#tY6$uI8%oP0^aS1&dF3*"));
        assert!(other.verify(&token).is_err());

        let mut tampered = token;
        tampered.pop();
        assert!(tokens.verify(&tampered).is_err());
        assert!(tokens.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_claims_use_camel_case() {
        let claims = Claims {
            user_id: UserId::new(3),
            user_role: UserRole::User,
            iat: 0,
            exp: 1,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], 3);
        assert_eq!(json["userRole"], "user");
    }

    #[test]
    fn test_token_from_cookie_then_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-header"));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=from-cookie; id=1"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-cookie"));

        assert_eq!(token_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_auth_cookie_attributes() {
        let rendered = auth_cookie("abc".to_owned(), true).to_string();
        assert!(rendered.starts_with("token=abc"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("SameSite=Strict"));
        assert!(rendered.contains("Path=/"));
        assert!(rendered.contains("Max-Age=86400"));
        assert!(rendered.contains("Secure"));

        let insecure = auth_cookie("abc".to_owned(), false).to_string();
        assert!(!insecure.contains("Secure"));

        assert!(removal_cookie(false).to_string().contains("Max-Age=0"));
    }
}
