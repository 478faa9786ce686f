//! Type-safe price representation using decimal arithmetic.
//!
//! The BookSwap API is inconsistent about how it sends prices: listing
//! endpoints return a bare JSON number (`12.5`), some order payloads return a
//! decimal string (`"12.50"`), and snapshots written by the storefront itself
//! carry an explicit `{ "amount": "12.50", "currency_code": "USD" }` object.
//! [`Price`] accepts all three.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is not a decimal number.
    #[error("'{0}' is not a valid amount")]
    Invalid(String),
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[allow(clippy::upper_case_acronyms)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Currency symbol used when formatting prices.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Three-letter ISO code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a USD price from an amount in cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2), CurrencyCode::USD)
    }

    /// Parse a user-entered amount such as `"12.5"` or `"$12.50"` as USD.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Invalid`] if the input is not a decimal number and
    /// [`PriceError::Negative`] if it is below zero.
    pub fn parse_usd(input: &str) -> Result<Self, PriceError> {
        let trimmed = input.trim().trim_start_matches('$').replace(',', "");
        let amount = Decimal::from_str(&trimmed)
            .map_err(|_| PriceError::Invalid(input.trim().to_string()))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self::new(amount, CurrencyCode::USD))
    }

    /// Amount in the smallest currency unit, rounded to two places.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn to_cents(&self) -> Option<i64> {
        let cents = (self.amount * Decimal::ONE_HUNDRED).round();
        i64::try_from(cents).ok()
    }

    /// Format for display (e.g., `$19.99`).
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency_code.symbol(), self.amount)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    fn into_decimal(self) -> Result<Decimal, PriceError> {
        let text = match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        };
        let trimmed = text.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| PriceError::Invalid(text.clone()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Full {
        amount: RawAmount,
        #[serde(default, alias = "currency")]
        currency_code: Option<CurrencyCode>,
    },
    Bare(RawAmount),
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (amount, currency_code) = match RawPrice::deserialize(deserializer)? {
            RawPrice::Full {
                amount,
                currency_code,
            } => (amount, currency_code.unwrap_or_default()),
            RawPrice::Bare(amount) => (amount, CurrencyCode::default()),
        };
        let amount = amount.into_decimal().map_err(serde::de::Error::custom)?;
        Ok(Self::new(amount, currency_code))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_bare_number() {
        let price: Price = serde_json::from_str("12.5").unwrap();
        assert_eq!(price.display(), "$12.50");
        assert_eq!(price.currency_code, CurrencyCode::USD);
    }

    #[test]
    fn test_deserialize_decimal_string() {
        let price: Price = serde_json::from_str("\"7.99\"").unwrap();
        assert_eq!(price.to_cents(), Some(799));
    }

    #[test]
    fn test_deserialize_object_with_currency() {
        let price: Price =
            serde_json::from_str(r#"{"amount": "20.00", "currency_code": "GBP"}"#).unwrap();
        assert_eq!(price.display(), "£20.00");
    }

    #[test]
    fn test_serialized_form_is_accepted_back() {
        let price = Price::from_cents(1234);
        let json = serde_json::to_string(&price).unwrap();
        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        assert!(serde_json::from_str::<Price>("\"cheap\"").is_err());
    }

    #[test]
    fn test_parse_usd_accepts_symbol_and_commas() {
        let price = Price::parse_usd(" $1,250.5 ").unwrap();
        assert_eq!(price.display(), "$1250.50");
    }

    #[test]
    fn test_parse_usd_rejects_negative() {
        assert_eq!(Price::parse_usd("-3"), Err(PriceError::Negative));
    }

    #[test]
    fn test_parse_usd_rejects_text() {
        assert!(matches!(
            Price::parse_usd("ten dollars"),
            Err(PriceError::Invalid(_))
        ));
    }
}
