//! Bucket Controller (`spec.md` §4.5) and public engine surface
//! (`spec.md` §6).
//!
//! `Engine` is the single object a caller talks to. Every public method
//! takes a `parking_lot::Mutex` for its full duration — the "single mutex
//! over engine state" option `spec.md` §5 explicitly allows — so each
//! operation is atomic to external observers without any async
//! actor/mailbox machinery. This mirrors, in simplified synchronous form,
//! the way the teacher's `OrderFlowOrchestrator`
//! (`services/matching/orchestrator.rs`) sequences "match → settle →
//! broadcast" as one unit of work per incoming order.

use crate::clock::{Clock, SystemClock};
use crate::error::EngineError;
use crate::escrow::{EscrowLedger, NullLedgerSubstrate, ValueTransfer};
use crate::events::{Event, EventSink};
use crate::matcher::{self, BidOutcome};
use crate::order_book::{validate_ask, validate_bid, Bucket};
use crate::types::{Ask, Bid, BucketStatus, Side, Trade, TradeBucket};
use alloy_primitives::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Who receives a trade's funds when it expires unsupplied.
///
/// `spec.md` §9 flags this as possibly a latent bug upstream (a buyer who
/// never received energy is left out of pocket) but directs
/// implementations to preserve the observable behaviour. Isolated here as
/// the single call site to invert if that policy is ever revisited.
fn expiry_payee(trade: &Trade) -> Address {
    trade.seller
}

struct BucketRecord {
    bucket: Bucket,
    trade_bucket: Option<TradeBucket>,
}

impl BucketRecord {
    fn open(start_time: u64) -> Self {
        Self {
            bucket: Bucket::open(start_time),
            trade_bucket: None,
        }
    }
}

struct EngineState {
    owner: Address,
    current_bucket_id: u64,
    bucket_duration: u64,
    buckets: Vec<BucketRecord>,
    events: EventSink,
}

/// The auction engine (`spec.md` §1–§9).
///
/// Generic over the value-transfer substrate `T` so tests can inject a
/// mock ledger (`spec.md` §9); production callers use whatever substrate
/// actually moves value (out of scope for this crate — see `spec.md` §1).
pub struct Engine<T: ValueTransfer = NullLedgerSubstrate> {
    state: Mutex<EngineState>,
    ledger: EscrowLedger<T>,
    clock: Arc<dyn Clock>,
}

impl Engine<NullLedgerSubstrate> {
    /// Constructs an engine with the default (no-op) transfer substrate
    /// and the system wall clock. `caller` becomes `owner`; bucket 0 is
    /// OPEN; emits `OwnerAnnounce` (`spec.md` §6).
    pub fn construct(owner: Address, bucket_duration: u64) -> Self {
        Self::with_parts(owner, bucket_duration, NullLedgerSubstrate, Arc::new(SystemClock), 1024)
    }

    /// As [`Engine::construct`], sized from an [`crate::config::EngineConfig`].
    pub fn construct_with_config(owner: Address, config: &crate::config::EngineConfig) -> Self {
        Self::with_parts(
            owner,
            config.bucket_duration_secs,
            NullLedgerSubstrate,
            Arc::new(SystemClock),
            config.event_channel_capacity,
        )
    }
}

impl<T: ValueTransfer> Engine<T> {
    /// Full constructor: lets tests supply a deterministic [`Clock`] and a
    /// mock [`ValueTransfer`] substrate.
    pub fn with_parts(owner: Address, bucket_duration: u64, substrate: T, clock: Arc<dyn Clock>, event_channel_capacity: usize) -> Self {
        let now = clock.now();
        let mut events = EventSink::new(event_channel_capacity);
        events.publish(Event::OwnerAnnounce { owner });
        info!(%owner, bucket_duration, "auction engine constructed");

        let state = EngineState {
            owner,
            current_bucket_id: 0,
            bucket_duration,
            buckets: vec![BucketRecord::open(now)],
            events,
        };

        Self {
            state: Mutex::new(state),
            ledger: EscrowLedger::new(substrate),
            clock,
        }
    }

    pub fn owner(&self) -> Address {
        self.state.lock().owner
    }

    pub fn current_bucket_id(&self) -> u64 {
        self.state.lock().current_bucket_id
    }

    /// Appends a bid to the current (open) bucket. `value` must equal
    /// `energy_amount * unit_price` (`spec.md` §4.1).
    pub fn submit_bid(&self, trader: Address, energy_amount: u64, unit_price: u64, value: u64) -> Result<u64, EngineError> {
        validate_bid(energy_amount, unit_price, value)?;

        let mut state = self.state.lock();
        let bucket_id = state.current_bucket_id;
        let bucket = &mut state.buckets[bucket_id as usize].bucket;
        let offer_id = bucket.push_bid(trader, energy_amount, unit_price, value).offer_id;
        self.ledger.record_escrow(value);

        state.events.publish(Event::TradeReceived {
            trader,
            bucket_id,
            side: Side::Bid,
            offer_id,
            energy_amount,
            unit_price,
        });

        Ok(offer_id)
    }

    /// Appends an ask to the current (open) bucket. No escrow is held.
    pub fn submit_ask(&self, trader: Address, energy_amount: u64, unit_price: u64) -> Result<u64, EngineError> {
        validate_ask(energy_amount, unit_price)?;

        let mut state = self.state.lock();
        let bucket_id = state.current_bucket_id;
        let bucket = &mut state.buckets[bucket_id as usize].bucket;
        let offer_id = bucket.push_ask(trader, energy_amount, unit_price).offer_id;

        state.events.publish(Event::TradeReceived {
            trader,
            bucket_id,
            side: Side::Ask,
            offer_id,
            energy_amount,
            unit_price,
        });

        Ok(offer_id)
    }

    /// Closes the current bucket, matches it, disburses refunds,
    /// reconciles the previous bucket, and opens the next one — all six
    /// steps of `spec.md` §4.5, atomically.
    pub fn roll(&self, caller: Address) -> Result<(), EngineError> {
        let mut state = self.state.lock();

        if caller != state.owner {
            return Err(EngineError::Unauthorized("only the owner may roll a bucket"));
        }

        let now = self.clock.now();
        let closing_id = state.current_bucket_id;
        let required = state.buckets[closing_id as usize].bucket.start_time + state.bucket_duration;
        if now < required {
            return Err(EngineError::TooEarly { now, required });
        }

        // ---- Phase 1: compute every payout this roll owes, without
        // mutating any committed state yet, and disburse them as one
        // atomic batch (spec.md §4.4: "rollback the whole roll if any
        // refund fails") — a mid-batch failure must apply zero transfers,
        // not just the ones after the point of failure, so individual
        // `EscrowLedger::pay` calls per payout would be wrong here: a
        // later failure would leave earlier payouts in this same attempt
        // already paid out while the engine's own state still looks
        // unrolled, and a caller retrying `roll()` would recompute and
        // re-pay the identical list. ----

        let expiring: Vec<(u64, Trade)> = if closing_id > 0 {
            let prev_id = closing_id - 1;
            match &state.buckets[prev_id as usize].trade_bucket {
                Some(tb) => tb
                    .trades
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| !t.supplied)
                    .map(|(idx, t)| (idx as u64, t.clone()))
                    .collect(),
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };
        let expiring_clearing_price = if closing_id > 0 {
            state.buckets[(closing_id - 1) as usize]
                .trade_bucket
                .as_ref()
                .map(|tb| tb.clearing_price)
                .unwrap_or(0)
        } else {
            0
        };

        let bids = state.buckets[closing_id as usize].bucket.bids.clone().unwrap_or_default();
        let asks = state.buckets[closing_id as usize].bucket.asks.clone().unwrap_or_default();
        let outcome = matcher::match_bucket(&bids, &asks);

        // Collect every payout this roll owes, in the order events will
        // later be emitted, then disburse them in a single atomic call.
        let mut payouts: Vec<(Address, u64)> = Vec::with_capacity(expiring.len() + outcome.bid_outcomes.len());
        for (_, trade) in &expiring {
            let amount = trade.energy_amount.checked_mul(expiring_clearing_price).expect("bounded by accepted bid value");
            payouts.push((expiry_payee(trade), amount));
        }
        for bo in &outcome.bid_outcomes {
            let (trader, amount) = match bo {
                BidOutcome::Rejected(r) => (r.bid.trader, r.refund),
                BidOutcome::Filled(f) => (f.bid.trader, f.refund),
            };
            payouts.push((trader, amount));
        }
        self.ledger.pay_batch(&payouts)?;

        // ---- Phase 2: every payout succeeded — commit state and emit
        // events in spec order (expired, rejected bids, rejected asks,
        // matched trades). ----

        if closing_id > 0 {
            let prev_id = closing_id - 1;
            for (trade_id, trade) in &expiring {
                let amount = trade.energy_amount.checked_mul(expiring_clearing_price).expect("checked above");
                state.events.publish(Event::TradeExpired {
                    buyer: trade.buyer,
                    seller: trade.seller,
                    bucket_id: prev_id,
                    trade_id: *trade_id,
                    refund_amount: amount,
                });
            }
            state.buckets[prev_id as usize].bucket.status = BucketStatus::Cleared;
        }

        for bo in &outcome.bid_outcomes {
            if let BidOutcome::Rejected(r) = bo {
                state.events.publish(Event::TradeRejected {
                    trader: r.bid.trader,
                    bucket_id: closing_id,
                    side: Side::Bid,
                    offer_id: r.bid.offer_id,
                    refund_amount: r.refund,
                    reason: "unmeetable demand at bid price",
                });
            }
        }
        for rejected in &outcome.rejected_asks {
            state.events.publish(Event::TradeRejected {
                trader: rejected.ask.trader,
                bucket_id: closing_id,
                side: Side::Ask,
                offer_id: rejected.ask.offer_id,
                refund_amount: 0,
                reason: "undemanded supply at ask price",
            });
        }
        for (trade_id, trade) in outcome.trades.iter().enumerate() {
            state.events.publish(Event::TradeMatched {
                buyer: trade.buyer,
                seller: trade.seller,
                bucket_id: closing_id,
                trade_id: trade_id as u64,
                energy_amount: trade.energy_amount,
                clearing_price: outcome.clearing_price,
                supplied: false,
            });
        }

        let clearing_price = outcome.clearing_price;
        state.buckets[closing_id as usize].bucket.status = BucketStatus::Closed;
        state.buckets[closing_id as usize].trade_bucket = Some(TradeBucket {
            clearing_price,
            trades: outcome.trades,
        });
        state.buckets[closing_id as usize].bucket.purge_offers();

        debug_assert_eq!(
            self.ledger.total_held(),
            state.buckets[closing_id as usize]
                .trade_bucket
                .as_ref()
                .unwrap()
                .trades
                .iter()
                .filter(|t| !t.supplied)
                .map(|t| t.energy_amount * clearing_price)
                .sum::<u64>(),
            "escrow must hold exactly the unsupplied value of bucket(current-1)"
        );

        state.current_bucket_id = closing_id + 1;
        state.buckets.push(BucketRecord::open(now));

        info!(bucket_id = closing_id, clearing_price = outcome.clearing_price, "bucket rolled");
        Ok(())
    }

    /// Marks a confirmed trade as delivered, releasing its payment from
    /// escrow to the caller (`spec.md` §4.6). Only valid while the
    /// containing bucket is still `CLOSED` (i.e. before the roll that
    /// would otherwise reconcile it as expired) — once that roll has run
    /// the seller has already been paid via expiry, and a second payout
    /// here would double-spend, so it is rejected as `InvalidTrade`
    /// rather than re-paid.
    pub fn mark_delivered(&self, caller: Address, bucket_id: u64, trade_id: u64) -> Result<(), EngineError> {
        let mut state = self.state.lock();

        let record = state
            .buckets
            .get(bucket_id as usize)
            .ok_or(EngineError::InvalidTrade { bucket_id, trade_id })?;

        if record.bucket.status != BucketStatus::Closed {
            return Err(EngineError::InvalidTrade { bucket_id, trade_id });
        }

        let clearing_price = record
            .trade_bucket
            .as_ref()
            .ok_or(EngineError::InvalidTrade { bucket_id, trade_id })?
            .clearing_price;

        let trades_len = record.trade_bucket.as_ref().map(|tb| tb.trades.len()).unwrap_or(0);
        if trade_id as usize >= trades_len {
            return Err(EngineError::InvalidTrade { bucket_id, trade_id });
        }

        {
            let trade = &state.buckets[bucket_id as usize].trade_bucket.as_ref().unwrap().trades[trade_id as usize];
            if trade.seller != caller {
                return Err(EngineError::Unauthorized("only the trade's seller may mark it delivered"));
            }
            if trade.supplied {
                return Err(EngineError::AlreadySupplied { bucket_id, trade_id });
            }
        }

        let (buyer, energy_amount) = {
            let trade = &state.buckets[bucket_id as usize].trade_bucket.as_ref().unwrap().trades[trade_id as usize];
            (trade.buyer, trade.energy_amount)
        };
        let payment = energy_amount.checked_mul(clearing_price).expect("bounded by accepted bid value");

        self.ledger.pay(caller, payment)?;

        state.buckets[bucket_id as usize].trade_bucket.as_mut().unwrap().trades[trade_id as usize].supplied = true;

        state.events.publish(Event::EnergySupplied {
            seller: caller,
            buyer,
            bucket_id,
            trade_id,
            energy_amount,
            payment,
        });
        Ok(())
    }

    pub fn bucket_status(&self, bucket_id: u64) -> Result<BucketStatus, EngineError> {
        self.state
            .lock()
            .buckets
            .get(bucket_id as usize)
            .map(|r| r.bucket.status)
            .ok_or(EngineError::UnknownBucket(bucket_id))
    }

    pub fn bid(&self, bucket_id: u64, index: u64) -> Result<Bid, EngineError> {
        let state = self.state.lock();
        let record = state.buckets.get(bucket_id as usize).ok_or(EngineError::UnknownBucket(bucket_id))?;
        record
            .bucket
            .bids
            .as_ref()
            .and_then(|bids| bids.get(index as usize))
            .cloned()
            .ok_or(EngineError::UnknownOffer { bucket_id, index })
    }

    pub fn ask(&self, bucket_id: u64, index: u64) -> Result<Ask, EngineError> {
        let state = self.state.lock();
        let record = state.buckets.get(bucket_id as usize).ok_or(EngineError::UnknownBucket(bucket_id))?;
        record
            .bucket
            .asks
            .as_ref()
            .and_then(|asks| asks.get(index as usize))
            .cloned()
            .ok_or(EngineError::UnknownOffer { bucket_id, index })
    }

    pub fn trade_bucket(&self, bucket_id: u64) -> Result<TradeBucket, EngineError> {
        self.state
            .lock()
            .buckets
            .get(bucket_id as usize)
            .and_then(|r| r.trade_bucket.clone())
            .ok_or(EngineError::UnknownBucket(bucket_id))
    }

    pub fn last_trade_bucket(&self) -> Option<TradeBucket> {
        let state = self.state.lock();
        if state.current_bucket_id == 0 {
            return None;
        }
        state.buckets[(state.current_bucket_id - 1) as usize].trade_bucket.clone()
    }

    pub fn last_trade_bucket_trade_count(&self) -> u64 {
        self.last_trade_bucket().map(|tb| tb.trades.len() as u64).unwrap_or(0)
    }

    pub fn last_trade_bucket_clearing_price(&self) -> u64 {
        self.last_trade_bucket().map(|tb| tb.clearing_price).unwrap_or(0)
    }

    pub fn event_log(&self) -> Vec<Event> {
        self.state.lock().events.log().to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.state.lock().events.subscribe()
    }

    /// Total value the engine is currently accounting for as held in
    /// escrow — exposed for the conservation property tests in
    /// `spec.md` §8.
    pub fn escrow_total_held(&self) -> u64 {
        self.ledger.total_held()
    }
}

impl<T: ValueTransfer> Drop for Engine<T> {
    fn drop(&mut self) {
        let remaining = self.ledger.total_held();
        if remaining > 0 {
            warn!(remaining, "engine dropped with outstanding escrowed value");
        }
    }
}
