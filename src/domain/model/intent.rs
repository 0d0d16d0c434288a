use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Why an intent exists. `code` is a closed UPPER_SNAKE_CASE vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rationale {
    pub code: String,
    pub message: String,
}

impl Rationale {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub mod rationale_code {
    pub const MODEL_DRIFT: &str = "MODEL_DRIFT";
    pub const SELL_DOWN: &str = "SELL_DOWN";
    pub const FUNDING: &str = "FUNDING";
    pub const SWEEP: &str = "SWEEP";
    pub const ADVISOR_INSTRUCTION: &str = "ADVISOR_INSTRUCTION";
    pub const CLIENT_CASH_FLOW: &str = "CLIENT_CASH_FLOW";
}

/// A proposed action. Intent ids are derived from the action itself
/// (instrument, pair, input position) so identical requests produce
/// byte-identical intent lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "intent_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    SecurityTrade {
        intent_id: String,
        instrument_id: String,
        side: TradeSide,
        quantity: Decimal,
        /// Notional in the instrument's trading currency.
        notional: Money,
        /// The same notional expressed in the portfolio base currency.
        notional_base: Decimal,
        dependencies: Vec<String>,
        rationale: Rationale,
        constraints_applied: Vec<String>,
    },
    FxSpot {
        intent_id: String,
        /// `"BUY/SELL"` legs, e.g. `"USD/SGD"` buys USD against SGD.
        pair: String,
        buy_currency: String,
        buy_amount: Decimal,
        sell_currency: String,
        sell_amount_estimated: Decimal,
        rate: Decimal,
        dependencies: Vec<String>,
        rationale: Rationale,
    },
    CashFlow {
        intent_id: String,
        currency: String,
        /// Signed: deposits positive, withdrawals negative.
        amount: Decimal,
        description: String,
    },
}

impl Intent {
    pub fn intent_id(&self) -> &str {
        match self {
            Intent::SecurityTrade { intent_id, .. }
            | Intent::FxSpot { intent_id, .. }
            | Intent::CashFlow { intent_id, .. } => intent_id,
        }
    }

    pub fn security_trade_id(side: TradeSide, instrument_id: &str) -> String {
        match side {
            TradeSide::Buy => format!("int_buy_{instrument_id}"),
            TradeSide::Sell => format!("int_sell_{instrument_id}"),
        }
    }

    pub fn fx_id(buy_currency: &str, sell_currency: &str) -> String {
        format!("fx_{buy_currency}_{sell_currency}")
    }

    pub fn cash_flow_id(index: usize) -> String {
        format!("cf_{index}")
    }

    /// Deterministic output ordering: cash flows (input order), sells by
    /// instrument, FX by pair, buys by instrument.
    pub fn ordering_key(&self, input_index: usize) -> (u8, String, usize) {
        match self {
            Intent::CashFlow { .. } => (0, String::new(), input_index),
            Intent::SecurityTrade {
                side: TradeSide::Sell,
                instrument_id,
                ..
            } => (1, instrument_id.clone(), input_index),
            Intent::FxSpot { pair, .. } => (2, pair.clone(), input_index),
            Intent::SecurityTrade {
                side: TradeSide::Buy,
                instrument_id,
                ..
            } => (3, instrument_id.clone(), input_index),
        }
    }
}

/// A drift trade that fell below the dust threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressedIntent {
    pub instrument_id: String,
    pub side: TradeSide,
    pub notional_base: Decimal,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Money>,
}

pub mod suppression_reason {
    pub const BELOW_MIN_NOTIONAL: &str = "BELOW_MIN_NOTIONAL";
    pub const ZERO_QUANTITY: &str = "ZERO_QUANTITY";
}

/// A candidate intent removed by a portfolio-level control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedIntent {
    pub instrument_id: String,
    pub side: TradeSide,
    pub notional_base: Decimal,
    pub reason: String,
}

pub mod drop_reason {
    pub const TURNOVER_LIMIT: &str = "TURNOVER_LIMIT";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(side: TradeSide, instrument: &str) -> Intent {
        Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(side, instrument),
            instrument_id: instrument.to_string(),
            side,
            quantity: dec!(10),
            notional: Money::new(dec!(1000), "USD"),
            notional_base: dec!(1350),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        }
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(trade(TradeSide::Buy, "US_ETF")).unwrap();
        assert_eq!(json["intent_type"], "SECURITY_TRADE");
        assert_eq!(json["side"], "BUY");
    }

    #[test]
    fn test_ordering_key_sequence() {
        let cash = Intent::CashFlow {
            intent_id: Intent::cash_flow_id(0),
            currency: "SGD".to_string(),
            amount: dec!(100),
            description: "deposit".to_string(),
        };
        let fx = Intent::FxSpot {
            intent_id: Intent::fx_id("USD", "SGD"),
            pair: "USD/SGD".to_string(),
            buy_currency: "USD".to_string(),
            buy_amount: dec!(100),
            sell_currency: "SGD".to_string(),
            sell_amount_estimated: dec!(135),
            rate: dec!(1.35),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::FUNDING, "funding"),
        };
        let mut intents = vec![
            trade(TradeSide::Buy, "AAA"),
            fx,
            trade(TradeSide::Sell, "BBB"),
            cash,
        ];
        intents.sort_by_key(|i| i.ordering_key(0));
        assert!(matches!(intents[0], Intent::CashFlow { .. }));
        assert!(matches!(
            intents[1],
            Intent::SecurityTrade {
                side: TradeSide::Sell,
                ..
            }
        ));
        assert!(matches!(intents[2], Intent::FxSpot { .. }));
        assert!(matches!(
            intents[3],
            Intent::SecurityTrade {
                side: TradeSide::Buy,
                ..
            }
        ));
    }

    #[test]
    fn test_deterministic_ids() {
        assert_eq!(
            Intent::security_trade_id(TradeSide::Buy, "US_ETF"),
            "int_buy_US_ETF"
        );
        assert_eq!(Intent::fx_id("USD", "SGD"), "fx_USD_SGD");
    }
}
