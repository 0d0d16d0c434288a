use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ValidationError;
use crate::domain::money::Money;

/// Client-submitted portfolio state: positions plus cash by currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub base_currency: String,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub cash_balances: Vec<CashBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: String,
    pub quantity: Decimal,
    /// Trusted valuation, used in TRUST_SNAPSHOT mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_value: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots: Option<Vec<TaxLot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLot {
    pub lot_id: String,
    pub quantity: Decimal,
    pub unit_cost: Money,
    pub purchase_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashBalance {
    pub currency: String,
    pub amount: Decimal,
}

impl PortfolioSnapshot {
    /// Structural validation applied at the service edge.
    ///
    /// Lot quantities must reconcile with the position quantity; negative lot
    /// quantities are rejected outright. Negative position quantities are
    /// preserved so the safety checks downstream can see them.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for position in &self.positions {
            if let Some(lots) = &position.lots {
                let mut total = Decimal::ZERO;
                for lot in lots {
                    if lot.quantity < Decimal::ZERO {
                        return Err(ValidationError::NegativeLotQuantity {
                            lot_id: lot.lot_id.clone(),
                        });
                    }
                    total += lot.quantity;
                }
                if total != position.quantity {
                    return Err(ValidationError::LotQuantityMismatch {
                        instrument_id: position.instrument_id.clone(),
                        expected: position.quantity,
                        actual: total,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn cash_in(&self, currency: &str) -> Decimal {
        self.cash_balances
            .iter()
            .filter(|c| c.currency == currency)
            .map(|c| c.amount)
            .sum()
    }

    pub fn position(&self, instrument_id: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.instrument_id == instrument_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lot(id: &str, qty: Decimal) -> TaxLot {
        TaxLot {
            lot_id: id.to_string(),
            quantity: qty,
            unit_cost: Money::new(dec!(10), "USD"),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    #[test]
    fn test_validate_accepts_matching_lots() {
        let snapshot = PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "USD".to_string(),
            positions: vec![Position {
                instrument_id: "AAA".to_string(),
                quantity: dec!(100),
                market_value: None,
                lots: Some(vec![lot("l1", dec!(60)), lot("l2", dec!(40))]),
            }],
            cash_balances: vec![],
        };
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_lot_mismatch() {
        let snapshot = PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "USD".to_string(),
            positions: vec![Position {
                instrument_id: "AAA".to_string(),
                quantity: dec!(100),
                market_value: None,
                lots: Some(vec![lot("l1", dec!(60))]),
            }],
            cash_balances: vec![],
        };
        assert!(matches!(
            snapshot.validate(),
            Err(ValidationError::LotQuantityMismatch { .. })
        ));
    }

    #[test]
    fn test_cash_in_sums_duplicate_rows() {
        let snapshot = PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "SGD".to_string(),
            positions: vec![],
            cash_balances: vec![
                CashBalance {
                    currency: "SGD".to_string(),
                    amount: dec!(100),
                },
                CashBalance {
                    currency: "SGD".to_string(),
                    amount: dec!(50),
                },
            ],
        };
        assert_eq!(snapshot.cash_in("SGD"), dec!(150));
        assert_eq!(snapshot.cash_in("USD"), dec!(0));
    }
}
