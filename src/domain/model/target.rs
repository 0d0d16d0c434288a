use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::model::shelf::ShelfStatus;

/// Why a held position cannot be traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    LockedDueToMissingShelf,
    LockedDueToRestricted,
    LockedDueToSuspended,
    LockedDueToBanned,
}

impl LockReason {
    pub fn from_status(status: ShelfStatus) -> Option<Self> {
        match status {
            ShelfStatus::Restricted => Some(LockReason::LockedDueToRestricted),
            ShelfStatus::Suspended => Some(LockReason::LockedDueToSuspended),
            ShelfStatus::Banned => Some(LockReason::LockedDueToBanned),
            ShelfStatus::Approved | ShelfStatus::SellOnly => None,
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockReason::LockedDueToMissingShelf => "LOCKED_DUE_TO_MISSING_SHELF",
            LockReason::LockedDueToRestricted => "LOCKED_DUE_TO_RESTRICTED",
            LockReason::LockedDueToSuspended => "LOCKED_DUE_TO_SUSPENDED",
            LockReason::LockedDueToBanned => "LOCKED_DUE_TO_BANNED",
        };
        write!(f, "{s}")
    }
}

/// One instrument in the tradeable universe: the intersection of the model
/// with the shelf, joined with held positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub instrument_id: String,
    pub in_model: bool,
    pub model_weight: Decimal,
    pub held_quantity: Decimal,
    pub current_weight: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_status: Option<ShelfStatus>,
    pub buy_eligible: bool,
    pub sell_eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<LockReason>,
}

impl UniverseEntry {
    pub fn is_locked(&self) -> bool {
        self.lock_reason.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Universe {
    /// Entries in ascending instrument id order.
    pub entries: Vec<UniverseEntry>,
    /// Model weight displaced by sell-only and excluded instruments.
    pub displaced_weight: Decimal,
}

impl Universe {
    pub fn entry(&self, instrument_id: &str) -> Option<&UniverseEntry> {
        self.entries
            .iter()
            .find(|e| e.instrument_id == instrument_id)
    }
}

/// Adjustment tags attached to a generated target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetReason {
    CappedByMaxWeight,
    CappedByGroupLimit,
    RedistributedRecipient,
    ImplicitSellToZero,
    LockedPosition,
}

impl fmt::Display for TargetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetReason::CappedByMaxWeight => "CAPPED_BY_MAX_WEIGHT",
            TargetReason::CappedByGroupLimit => "CAPPED_BY_GROUP_LIMIT",
            TargetReason::RedistributedRecipient => "REDISTRIBUTED_RECIPIENT",
            TargetReason::ImplicitSellToZero => "IMPLICIT_SELL_TO_ZERO",
            TargetReason::LockedPosition => "LOCKED_POSITION",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub instrument_id: String,
    pub model_weight: Decimal,
    pub final_weight: Decimal,
    #[serde(default)]
    pub reasons: Vec<TargetReason>,
}

/// The generated target allocation. Security weights plus the cash weight
/// sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSet {
    pub method: String,
    /// Entries in ascending instrument id order.
    pub entries: Vec<TargetEntry>,
    pub cash_weight: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<serde_json::Value>,
}

impl TargetSet {
    pub fn weight_of(&self, instrument_id: &str) -> Decimal {
        self.entries
            .iter()
            .find(|e| e.instrument_id == instrument_id)
            .map(|e| e.final_weight)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total_weight(&self) -> Decimal {
        self.entries
            .iter()
            .map(|e| e.final_weight)
            .sum::<Decimal>()
            + self.cash_weight
    }
}
