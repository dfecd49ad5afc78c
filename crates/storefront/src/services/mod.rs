//! Business logic services.
//!
//! - `auth` - Accounts, passwords and roles
//! - `catalog` - Category, product and blog writes with their image folders
//! - `email` - SMTP delivery of verification codes
//! - `media` - Upload staging and the journaled image folder changes
//! - `otp` - One-time codes kept in the server session
//! - `token` - JWT session tokens and the auth cookie

pub mod auth;
pub mod catalog;
pub mod email;
pub mod media;
pub mod otp;
pub mod token;

pub use auth::{AuthError, AuthService};
pub use catalog::{CatalogError, CatalogService};
pub use email::{EmailError, EmailService};
pub use media::{MediaChange, MediaError, MediaKind, MediaStore, StagedFile};
pub use otp::{OtpChallenge, OtpError, OtpPurpose};
pub use token::{Claims, TokenError, TokenService};
