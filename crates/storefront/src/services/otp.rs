//! Email one-time codes.
//!
//! A challenge is kept in the server session (never sent to the client) and
//! checked against what the user types in. Only one challenge is pending per
//! session; starting a new one replaces the old.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::Session;

use bazaar_core::Email;

use crate::models::session::keys;

/// How long a code stays valid.
pub const OTP_TTL_MINUTES: i64 = 5;

/// Wrong guesses allowed before the challenge is discarded.
pub const MAX_ATTEMPTS: u8 = 5;

/// What a code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpPurpose {
    Registration,
    PasswordReset,
}

/// Reasons a code is refused.
#[derive(Debug, Error)]
pub enum OtpError {
    #[error("No OTP session found")]
    NoChallenge,

    #[error("Email does not match")]
    EmailMismatch,

    #[error("OTP expired")]
    Expired,

    #[error("Too many attempts")]
    TooManyAttempts,

    #[error("Invalid OTP")]
    Invalid,

    /// The session store failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// A pending code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    code: String,
    email: Email,
    purpose: OtpPurpose,
    expires_at: DateTime<Utc>,
    attempts: u8,
}

impl OtpChallenge {
    /// Create a challenge with a fresh random code.
    #[must_use]
    pub fn new(email: Email, purpose: OtpPurpose, now: DateTime<Utc>) -> Self {
        Self::with_code(generate_code(), email, purpose, now)
    }

    /// Create a challenge with a known code.
    #[must_use]
    pub fn with_code(code: String, email: Email, purpose: OtpPurpose, now: DateTime<Utc>) -> Self {
        Self {
            code,
            email,
            purpose,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            attempts: 0,
        }
    }

    /// The code to send to the user.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The address the code was sent to.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    /// Check a submitted code.
    ///
    /// A wrong code counts as an attempt. Callers discard the challenge when
    /// [`OtpError::ends_challenge`] is true.
    ///
    /// # Errors
    ///
    /// Returns the first failing check, in the order: email, expiry,
    /// attempts, code.
    pub fn check(&mut self, email: &Email, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        if &self.email != email {
            return Err(OtpError::EmailMismatch);
        }
        if now >= self.expires_at {
            return Err(OtpError::Expired);
        }
        if self.attempts >= MAX_ATTEMPTS {
            return Err(OtpError::TooManyAttempts);
        }
        if !constant_time_eq(self.code.as_bytes(), code.trim().as_bytes()) {
            self.attempts += 1;
            return Err(OtpError::Invalid);
        }
        Ok(())
    }
}

impl OtpError {
    /// Whether the pending challenge is spent after this error.
    #[must_use]
    pub const fn ends_challenge(&self) -> bool {
        matches!(self, Self::Expired | Self::TooManyAttempts)
    }
}

/// Generate a 6-digit code. Leading zeros are kept.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Store a challenge in the session, replacing any pending one.
///
/// # Errors
///
/// Returns `OtpError::Session` if the session cannot be written.
pub async fn store_challenge(session: &Session, challenge: &OtpChallenge) -> Result<(), OtpError> {
    session.insert(keys::OTP_CHALLENGE, challenge).await?;
    Ok(())
}

/// Check a code against the session's pending challenge for `purpose`.
///
/// On success the challenge is removed. On a wrong code the incremented
/// attempt counter is written back.
///
/// # Errors
///
/// Returns the [`OtpError`] describing why the code was refused.
pub async fn verify_challenge(
    session: &Session,
    purpose: OtpPurpose,
    email: &Email,
    code: &str,
) -> Result<(), OtpError> {
    let mut challenge = session
        .get::<OtpChallenge>(keys::OTP_CHALLENGE)
        .await?
        .filter(|c| c.purpose == purpose)
        .ok_or(OtpError::NoChallenge)?;

    match challenge.check(email, code, Utc::now()) {
        Ok(()) => {
            session.remove::<OtpChallenge>(keys::OTP_CHALLENGE).await?;
            Ok(())
        }
        Err(e) if e.ends_challenge() => {
            session.remove::<OtpChallenge>(keys::OTP_CHALLENGE).await?;
            Err(e)
        }
        Err(OtpError::Invalid) => {
            session.insert(keys::OTP_CHALLENGE, &challenge).await?;
            Err(OtpError::Invalid)
        }
        Err(e) => Err(e),
    }
}
