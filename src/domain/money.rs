use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::ValidationError;

/// A currency-tagged fixed-point amount.
///
/// All monetary values crossing a boundary are carried as `Money`; bare
/// `Decimal` values are only ever weights, quantities, or rates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Round to the currency's minor units, banker's rounding.
    pub fn rounded(&self) -> Self {
        Self {
            amount: round_to_minor_units(self.amount, &self.currency),
            currency: self.currency.clone(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// ISO 4217 minor units for the currencies the engine prices in.
/// Unlisted currencies default to 2.
pub fn currency_minor_units(code: &str) -> u32 {
    match code {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

/// Round an amount to its currency's minor units (midpoint to even).
pub fn round_to_minor_units(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        currency_minor_units(currency),
        rust_decimal::RoundingStrategy::MidpointNearestEven,
    )
}

/// Split an FX pair literal `"A/B"` into its two legs.
///
/// Codes must be exactly three uppercase ASCII letters.
pub fn parse_pair(pair: &str) -> Result<(String, String), ValidationError> {
    let mut parts = pair.split('/');
    let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ValidationError::InvalidFxPair {
            pair: pair.to_string(),
        });
    };
    if !is_currency_code(a) || !is_currency_code(b) {
        return Err(ValidationError::InvalidFxPair {
            pair: pair.to_string(),
        });
    }
    Ok((a.to_string(), b.to_string()))
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_units_defaults_to_two() {
        assert_eq!(currency_minor_units("USD"), 2);
        assert_eq!(currency_minor_units("SGD"), 2);
        assert_eq!(currency_minor_units("JPY"), 0);
        assert_eq!(currency_minor_units("KWD"), 3);
    }

    #[test]
    fn test_round_to_minor_units() {
        assert_eq!(round_to_minor_units(dec!(1.005), "USD"), dec!(1.00));
        assert_eq!(round_to_minor_units(dec!(1.015), "USD"), dec!(1.02));
        assert_eq!(round_to_minor_units(dec!(125.4), "JPY"), dec!(125));
        assert_eq!(round_to_minor_units(dec!(1.23456), "KWD"), dec!(1.235));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair("USD/SGD").unwrap(),
            ("USD".to_string(), "SGD".to_string())
        );
        assert!(parse_pair("usd/sgd").is_err());
        assert!(parse_pair("USDSGD").is_err());
        assert!(parse_pair("USD/SGD/JPY").is_err());
    }

    #[test]
    fn test_money_display() {
        let m = Money::new(dec!(100.50), "SGD");
        assert_eq!(m.to_string(), "100.50 SGD");
    }
}
