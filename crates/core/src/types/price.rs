//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a decimal number.
    #[error("price must be a number")]
    NotANumber,
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The amount has more than two fractional digits.
    #[error("price can have at most 2 decimal places")]
    TooPrecise,
    /// The amount does not fit the stored `NUMERIC(12, 2)`.
    #[error("price cannot exceed {}", Price::MAX)]
    TooLarge,
}

/// A product price in the shop's single currency.
///
/// Serialized as a string (`"129000.50"`) so clients never see float
/// rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Largest storable amount, `9999999999.99` (999999999999 at scale 2).
    pub const MAX: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative`, `PriceError::TooPrecise` or
    /// `PriceError::TooLarge`.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > 2 {
            return Err(PriceError::TooPrecise);
        }
        if amount > Self::MAX {
            return Err(PriceError::TooLarge);
        }
        Ok(Self(amount))
    }

    /// Parse a price from form input such as `"1500"` or `"19.99"`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotANumber` for non-numeric input, otherwise the
    /// errors of [`Price::new`].
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount: Decimal = s.trim().parse().map_err(|_| PriceError::NotANumber)?;
        Self::new(amount)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Price::parse("1500").unwrap().to_string(), "1500");
        assert_eq!(Price::parse(" 19.99 ").unwrap().to_string(), "19.99");
        assert!(Price::parse("0").is_ok());
        assert!(Price::parse("2.500").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Price::parse("abc"), Err(PriceError::NotANumber));
        assert_eq!(Price::parse(""), Err(PriceError::NotANumber));
        assert_eq!(Price::parse("-1"), Err(PriceError::Negative));
        assert_eq!(Price::parse("1.999"), Err(PriceError::TooPrecise));
    }

    #[test]
    fn test_rejects_amounts_over_column_range() {
        assert!(Price::parse("9999999999.99").is_ok());
        assert_eq!(Price::parse("10000000000"), Err(PriceError::TooLarge));
        assert_eq!(Price::parse("99999999999"), Err(PriceError::TooLarge));
        assert_eq!(
            PriceError::TooLarge.to_string(),
            "price cannot exceed 9999999999.99"
        );
    }

    #[test]
    fn test_serializes_as_string() {
        let price = Price::parse("42.5").unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"42.5\"");
    }
}
