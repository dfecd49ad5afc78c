//! Session-stored state.
//!
//! The JWT cookie carries identity. The server session only holds the short
//! lived verification state of the OTP flows.

/// Session keys.
pub mod keys {
    /// Pending [`OtpChallenge`](crate::services::otp::OtpChallenge).
    pub const OTP_CHALLENGE: &str = "otp_challenge";

    /// Email address that passed OTP verification and may now register.
    pub const VERIFIED_EMAIL: &str = "verified_email";
}
