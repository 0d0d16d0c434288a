//! Shared fixtures for integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use rebalancer::domain::model::market::{FxRatePoint, MarketDataSnapshot, PricePoint};
use rebalancer::domain::model::model_portfolio::ModelPortfolio;
use rebalancer::domain::model::portfolio::{CashBalance, PortfolioSnapshot, Position, TaxLot};
use rebalancer::domain::model::request::RebalanceRequest;
use rebalancer::domain::model::shelf::{ShelfEntry, ShelfStatus};
use rebalancer::domain::money::Money;

pub fn shelf_entry(id: &str, status: ShelfStatus) -> ShelfEntry {
    ShelfEntry {
        instrument_id: id.to_string(),
        status,
        asset_class: "EQUITY".to_string(),
        min_notional: None,
        settlement_days: 2,
        attributes: BTreeMap::new(),
        issuer_id: None,
        liquidity_tier: None,
    }
}

pub fn shelf_entry_with(
    id: &str,
    status: ShelfStatus,
    settlement_days: u8,
    sector: Option<&str>,
) -> ShelfEntry {
    let mut entry = shelf_entry(id, status);
    entry.settlement_days = settlement_days;
    if let Some(sector) = sector {
        entry
            .attributes
            .insert("sector".to_string(), sector.to_string());
    }
    entry
}

pub fn position(id: &str, quantity: Decimal) -> Position {
    Position {
        instrument_id: id.to_string(),
        quantity,
        market_value: None,
        lots: None,
    }
}

pub fn position_with_lots(id: &str, lots: Vec<TaxLot>) -> Position {
    let quantity = lots.iter().map(|l| l.quantity).sum();
    Position {
        instrument_id: id.to_string(),
        quantity,
        market_value: None,
        lots: Some(lots),
    }
}

pub fn lot(id: &str, quantity: Decimal, unit_cost: Decimal, currency: &str) -> TaxLot {
    TaxLot {
        lot_id: id.to_string(),
        quantity,
        unit_cost: Money::new(unit_cost, currency),
        purchase_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
    }
}

pub fn portfolio(
    base: &str,
    positions: Vec<Position>,
    cash: Vec<(&str, Decimal)>,
) -> PortfolioSnapshot {
    PortfolioSnapshot {
        portfolio_id: "pf_test".to_string(),
        snapshot_id: Some("snap_1".to_string()),
        base_currency: base.to_string(),
        positions,
        cash_balances: cash
            .into_iter()
            .map(|(currency, amount)| CashBalance {
                currency: currency.to_string(),
                amount,
            })
            .collect(),
    }
}

pub fn market_data(
    prices: Vec<(&str, Decimal, &str)>,
    fx: Vec<(&str, Decimal)>,
) -> MarketDataSnapshot {
    MarketDataSnapshot {
        snapshot_id: Some("md_1".to_string()),
        prices: prices
            .into_iter()
            .map(|(id, price, currency)| PricePoint {
                instrument_id: id.to_string(),
                price: Money::new(price, currency),
            })
            .collect(),
        fx_rates: fx
            .into_iter()
            .map(|(pair, rate)| FxRatePoint {
                pair: pair.to_string(),
                rate,
            })
            .collect(),
    }
}

pub fn model(weights: Vec<(&str, Decimal)>) -> ModelPortfolio {
    ModelPortfolio {
        model_id: Some("model_1".to_string()),
        targets: weights
            .into_iter()
            .map(|(id, weight)| (id.to_string(), weight))
            .collect(),
    }
}

/// Scenario 1 fixture: SGD cash deployed into a USD ETF.
pub fn cash_deployment_request() -> RebalanceRequest {
    RebalanceRequest {
        portfolio: portfolio(
            "SGD",
            vec![position("US_ETF", Decimal::ZERO)],
            vec![("SGD", dec!(660000))],
        ),
        market_data: market_data(vec![("US_ETF", dec!(500), "USD")], vec![("USD/SGD", dec!(1.35))]),
        shelf: vec![shelf_entry("US_ETF", ShelfStatus::Approved)],
        model: model(vec![("US_ETF", dec!(0.80)), ("CASH", dec!(0.20))]),
        options: Default::default(),
    }
}
