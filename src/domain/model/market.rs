use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::money::Money;

/// Prices and FX rates pinned to a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub fx_rates: Vec<FxRatePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub instrument_id: String,
    pub price: Money,
}

/// Quoted rate for `pair = "A/B"`: one unit of A costs `rate` units of B.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRatePoint {
    pub pair: String,
    pub rate: Decimal,
}

impl MarketDataSnapshot {
    pub fn price(&self, instrument_id: &str) -> Option<&Money> {
        self.prices
            .iter()
            .find(|p| p.instrument_id == instrument_id)
            .map(|p| &p.price)
    }

    /// Conversion rate `from -> to`: multiplying an amount in `from` by the
    /// returned rate yields the amount in `to`.
    ///
    /// A directly quoted pair wins; otherwise the inverse pair is used with
    /// `rate(B/A) = 1 / rate(A/B)`, which keeps lookups deterministic.
    pub fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        let direct = format!("{from}/{to}");
        if let Some(point) = self.fx_rates.iter().find(|r| r.pair == direct) {
            return Some(point.rate);
        }
        let inverse = format!("{to}/{from}");
        if let Some(point) = self.fx_rates.iter().find(|r| r.pair == inverse) {
            return Decimal::ONE.checked_div(point.rate);
        }
        None
    }

    /// Convert an amount between currencies, `None` when no pair is quoted.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Option<Decimal> {
        self.rate(from, to).map(|r| amount * r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> MarketDataSnapshot {
        MarketDataSnapshot {
            snapshot_id: Some("md_1".to_string()),
            prices: vec![PricePoint {
                instrument_id: "US_ETF".to_string(),
                price: Money::new(dec!(500), "USD"),
            }],
            fx_rates: vec![FxRatePoint {
                pair: "USD/SGD".to_string(),
                rate: dec!(1.35),
            }],
        }
    }

    #[test]
    fn test_direct_rate() {
        assert_eq!(snapshot().rate("USD", "SGD"), Some(dec!(1.35)));
    }

    #[test]
    fn test_inverse_rate() {
        let rate = snapshot().rate("SGD", "USD").unwrap();
        // 1 / 1.35
        assert!((rate - dec!(0.7407407407)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_identity_rate() {
        assert_eq!(snapshot().rate("SGD", "SGD"), Some(Decimal::ONE));
    }

    #[test]
    fn test_missing_rate() {
        assert_eq!(snapshot().rate("EUR", "SGD"), None);
    }

    #[test]
    fn test_convert() {
        assert_eq!(
            snapshot().convert(dec!(100), "USD", "SGD"),
            Some(dec!(135.00))
        );
    }
}
