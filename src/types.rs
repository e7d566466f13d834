//! Data model: offers, trades, and per-bucket results (`spec.md` §3).

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the book an offer sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// The status of a bucket at a point in time (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketStatus {
    /// Accepting bids/asks.
    Open,
    /// Collection window ended; matched but not yet reconciled.
    Closed,
    /// Reconciled by the roll of the following bucket.
    Cleared,
}

impl fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketStatus::Open => write!(f, "open"),
            BucketStatus::Closed => write!(f, "closed"),
            BucketStatus::Cleared => write!(f, "cleared"),
        }
    }
}

/// A buy order, with funds pre-escrowed at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub trader: Address,
    pub energy_amount: u64,
    pub unit_price: u64,
    pub offer_id: u64,
    pub escrowed_value: u64,
}

/// A sell offer. No escrow is held against asks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ask {
    pub trader: Address,
    pub energy_amount: u64,
    pub unit_price: u64,
    pub offer_id: u64,
}

/// A confirmed match: one seller's contribution toward one buyer's filled
/// demand. A single bid may generate several trades, one per participating
/// ask, but a trade always has exactly one buyer and one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub buyer: Address,
    pub seller: Address,
    pub energy_amount: u64,
    pub supplied: bool,
}

impl Trade {
    pub fn new(buyer: Address, seller: Address, energy_amount: u64) -> Self {
        Self {
            buyer,
            seller,
            energy_amount,
            supplied: false,
        }
    }
}

/// The outcome of rolling one bucket: the uniform clearing price and the
/// ordered list of confirmed trades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeBucket {
    pub clearing_price: u64,
    pub trades: Vec<Trade>,
}

impl TradeBucket {
    /// `true` once every trade in this bucket has been marked delivered.
    pub fn fully_settled(&self) -> bool {
        self.trades.iter().all(|t| t.supplied)
    }
}
