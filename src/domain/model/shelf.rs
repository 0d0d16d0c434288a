use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::money::Money;

/// Governance status of a shelf product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShelfStatus {
    Approved,
    Restricted,
    SellOnly,
    Suspended,
    Banned,
}

impl fmt::Display for ShelfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShelfStatus::Approved => "APPROVED",
            ShelfStatus::Restricted => "RESTRICTED",
            ShelfStatus::SellOnly => "SELL_ONLY",
            ShelfStatus::Suspended => "SUSPENDED",
            ShelfStatus::Banned => "BANNED",
        };
        write!(f, "{s}")
    }
}

fn default_settlement_days() -> u8 {
    2
}

/// One permitted-product entry with its governance metadata.
///
/// `attributes` carries free-form classification pairs (`sector -> TECH`)
/// used by group constraints and suitability scans. A `BTreeMap` keeps the
/// iteration order deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfEntry {
    pub instrument_id: String,
    pub status: ShelfStatus,
    pub asset_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_notional: Option<Money>,
    #[serde(default = "default_settlement_days")]
    pub settlement_days: u8,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_tier: Option<String>,
}

impl ShelfEntry {
    pub fn buy_allowed(&self, allow_restricted: bool) -> bool {
        match self.status {
            ShelfStatus::Approved => true,
            ShelfStatus::Restricted => allow_restricted,
            ShelfStatus::SellOnly | ShelfStatus::Suspended | ShelfStatus::Banned => false,
        }
    }

    pub fn sell_allowed(&self, allow_restricted: bool) -> bool {
        match self.status {
            ShelfStatus::Approved | ShelfStatus::SellOnly => true,
            ShelfStatus::Restricted => allow_restricted,
            ShelfStatus::Suspended | ShelfStatus::Banned => false,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Shelf lookup with deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Shelf {
    entries: BTreeMap<String, ShelfEntry>,
}

impl Shelf {
    pub fn from_entries(entries: Vec<ShelfEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.instrument_id.clone(), e))
                .collect(),
        }
    }

    pub fn get(&self, instrument_id: &str) -> Option<&ShelfEntry> {
        self.entries.get(instrument_id)
    }

    pub fn settlement_days(&self, instrument_id: &str) -> u8 {
        self.get(instrument_id)
            .map(|e| e.settlement_days)
            .unwrap_or_else(default_settlement_days)
    }

    pub fn min_notional(&self, instrument_id: &str) -> Option<&Money> {
        self.get(instrument_id).and_then(|e| e.min_notional.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShelfEntry> {
        self.entries.values()
    }
}

/// Validation bound: settlement days beyond this are rejected at the edge.
pub const MAX_SETTLEMENT_DAYS: u8 = 10;
