//! Order Book (`spec.md` §4.1).
//!
//! Per-bucket, per-side, insertion-ordered append-only lists. Offer ids are
//! assigned as the pre-append length of the relevant list, so insertion
//! order and id order always agree.

use crate::error::EngineError;
use crate::types::{Ask, Bid, BucketStatus};
use alloy_primitives::Address;

/// One bucket's offers, plus its lifecycle status and opening time.
///
/// `bids`/`asks` are `None` once the bucket has been `CLEARED` and its
/// offer lists purged — `spec.md` §6 permits (and here chooses) purging
/// per-bucket offer storage once it is no longer needed, to bound memory
/// growth across an unboundedly long-running engine.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub status: BucketStatus,
    pub start_time: u64,
    pub bids: Option<Vec<Bid>>,
    pub asks: Option<Vec<Ask>>,
}

impl Bucket {
    pub fn open(start_time: u64) -> Self {
        Self {
            status: BucketStatus::Open,
            start_time,
            bids: Some(Vec::new()),
            asks: Some(Vec::new()),
        }
    }

    /// Appends a bid, assigning its `offer_id` as the pre-append length.
    /// Caller must already have checked `self.status == Open`.
    pub fn push_bid(&mut self, trader: Address, energy_amount: u64, unit_price: u64, escrowed_value: u64) -> &Bid {
        validate_bid(energy_amount, unit_price, escrowed_value).expect("validated by caller");
        let bids = self.bids.get_or_insert_with(Vec::new);
        let offer_id = bids.len() as u64;
        bids.push(Bid {
            trader,
            energy_amount,
            unit_price,
            offer_id,
            escrowed_value,
        });
        bids.last().expect("just pushed")
    }

    /// Appends an ask, assigning its `offer_id` as the pre-append length.
    /// Caller must already have checked `self.status == Open`.
    pub fn push_ask(&mut self, trader: Address, energy_amount: u64, unit_price: u64) -> &Ask {
        validate_ask(energy_amount, unit_price).expect("validated by caller");
        let asks = self.asks.get_or_insert_with(Vec::new);
        let offer_id = asks.len() as u64;
        asks.push(Ask {
            trader,
            energy_amount,
            unit_price,
            offer_id,
        });
        asks.last().expect("just pushed")
    }

    /// Drops the offer lists, keeping only the lifecycle status. Called
    /// once a bucket's trades have been matched and it transitions to
    /// `CLEARED`.
    pub fn purge_offers(&mut self) {
        self.bids = None;
        self.asks = None;
    }
}

/// Validates a bid's preconditions, returning a distinct message for each
/// of the three failing conditions (`spec.md` §4.1, §7).
pub fn validate_bid(energy_amount: u64, unit_price: u64, escrowed_value: u64) -> Result<(), EngineError> {
    if energy_amount == 0 {
        return Err(EngineError::InvalidOrder("bid energy_amount must be positive"));
    }
    if unit_price == 0 {
        return Err(EngineError::InvalidOrder("bid unit_price must be positive"));
    }
    let expected = energy_amount
        .checked_mul(unit_price)
        .ok_or(EngineError::InvalidOrder("bid energy_amount * unit_price overflows"))?;
    if escrowed_value != expected {
        return Err(EngineError::InvalidOrder(
            "bid escrowed_value must equal energy_amount * unit_price",
        ));
    }
    Ok(())
}

/// Validates an ask's preconditions.
pub fn validate_ask(energy_amount: u64, unit_price: u64) -> Result<(), EngineError> {
    if energy_amount == 0 {
        return Err(EngineError::InvalidOrder("ask energy_amount must be positive"));
    }
    if unit_price == 0 {
        return Err(EngineError::InvalidOrder("ask unit_price must be positive"));
    }
    Ok(())
}
