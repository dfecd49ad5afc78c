//! Entity titles.
//!
//! Categories, products and blog posts are identified to humans by their
//! title, and the title also names the folder that holds the entity's
//! uploaded images (`uploads/products/<title>/`). A title therefore has to be
//! a single, harmless path component.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Title`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TitleError {
    /// The title is empty after trimming.
    #[error("title cannot be empty")]
    Empty,
    /// The title is longer than [`Title::MAX_CHARS`].
    #[error("title must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// The title contains a path separator or control character.
    #[error("title contains a forbidden character: {0:?}")]
    ForbiddenChar(char),
    /// The UTF-8 encoding is longer than a file name may be.
    #[error("title must be at most {max} bytes when encoded")]
    TooManyBytes {
        /// Maximum allowed length in bytes.
        max: usize,
    },
    /// The title is `.`/`..` or starts with a dot.
    #[error("title cannot start with '.'")]
    LeadingDot,
}

/// A validated entity title that is safe to use as a directory name.
///
/// Any script is allowed (the shop's own default category is `others`, but
/// admins create Persian titles such as `لوازم خانگی`).
///
/// ```
/// use bazaar_core::Title;
///
/// assert_eq!(Title::parse("  Summer Sale ").unwrap().as_str(), "Summer Sale");
/// assert!(Title::parse("../etc").is_err());
/// assert!(Title::parse("a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Title(String);

impl Title {
    /// Maximum length in characters.
    pub const MAX_CHARS: usize = 100;

    /// Maximum encoded length, the common filesystem `NAME_MAX`.
    pub const MAX_BYTES: usize = 255;

    /// Parse a title, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns a [`TitleError`] if the title is empty, too long (in characters
    /// or encoded bytes), starts with a
    /// dot, or contains `/`, `\`, NUL or any control character.
    pub fn parse(s: &str) -> Result<Self, TitleError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TitleError::Empty);
        }
        if s.chars().count() > Self::MAX_CHARS {
            return Err(TitleError::TooLong {
                max: Self::MAX_CHARS,
            });
        }
        if s.len() > Self::MAX_BYTES {
            return Err(TitleError::TooManyBytes {
                max: Self::MAX_BYTES,
            });
        }
        if s.starts_with('.') {
            return Err(TitleError::LeadingDot);
        }
        if let Some(c) = s
            .chars()
            .find(|c| matches!(c, '/' | '\\') || c.is_control())
        {
            return Err(TitleError::ForbiddenChar(c));
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the title as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Title {
    type Error = TitleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Title> for String {
    fn from(title: Title) -> Self {
        title.0
    }
}

impl AsRef<str> for Title {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Title {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Title {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Title {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
