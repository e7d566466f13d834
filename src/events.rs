//! Event Log (`spec.md` §4.7).
//!
//! Every observable outcome the engine produces is an [`Event`]. Events
//! are published to two places at once: an in-memory, append-only `Vec`
//! any caller can read back via [`crate::Engine::event_log`], and a
//! `tokio` broadcast channel any number of live subscribers can drain —
//! the same shape as the teacher's `OrderFlowOrchestrator`, which
//! broadcasts `TradeEvent`s to its persistence worker
//! (`services/matching/orchestrator.rs`). Persisting the stream
//! (the explicitly out-of-scope audit reader) is left entirely to
//! whatever subscribes; the engine itself never writes to disk.

use crate::types::Side;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One observable outcome of the engine, in the order `spec.md` §4.7
/// specifies them within a roll: expiries, then rejected bids, then
/// rejected asks, then matched trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Emitted once, at construction.
    OwnerAnnounce { owner: Address },

    /// Emitted per accepted order.
    TradeReceived {
        trader: Address,
        bucket_id: u64,
        side: Side,
        offer_id: u64,
        energy_amount: u64,
        unit_price: u64,
    },

    /// Emitted per unsupplied trade reconciled at the following roll.
    TradeExpired {
        buyer: Address,
        seller: Address,
        bucket_id: u64,
        trade_id: u64,
        refund_amount: u64,
    },

    /// Emitted per confirmed trade.
    TradeMatched {
        buyer: Address,
        seller: Address,
        bucket_id: u64,
        trade_id: u64,
        energy_amount: u64,
        clearing_price: u64,
        supplied: bool,
    },

    /// Emitted per unmet bid or unused ask.
    TradeRejected {
        trader: Address,
        bucket_id: u64,
        side: Side,
        offer_id: u64,
        refund_amount: u64,
        reason: &'static str,
    },

    /// Emitted per delivery mark.
    EnergySupplied {
        seller: Address,
        buyer: Address,
        bucket_id: u64,
        trade_id: u64,
        energy_amount: u64,
        payment: u64,
    },
}

/// Publishes events to an in-memory log and a broadcast channel.
pub struct EventSink {
    log: Vec<Event>,
    broadcaster: broadcast::Sender<Event>,
}

impl EventSink {
    pub fn new(channel_capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(channel_capacity);
        Self {
            log: Vec::new(),
            broadcaster,
        }
    }

    /// Appends `event` to the in-memory log and broadcasts it. A lagging
    /// or absent subscriber never blocks or fails publication — the
    /// in-memory log is always the authoritative record.
    pub fn publish(&mut self, event: Event) {
        let _ = self.broadcaster.send(event.clone());
        self.log.push(event);
    }

    pub fn log(&self) -> &[Event] {
        &self.log
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.broadcaster.subscribe()
    }
}
