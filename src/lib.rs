//! Periodic uniform-price double auction engine for homogeneous energy
//! units.
//!
//! A single [`Engine`] accumulates bids and asks into the current
//! *bucket* (a fixed-duration collection window), and the owner rolls
//! the bucket once that window has elapsed. Rolling matches the closed
//! bucket at one uniform clearing price, refunds whatever didn't clear,
//! reconciles the bucket before it (paying sellers for anything never
//! marked delivered), and opens the next bucket — see [`engine`] for the
//! full sequence.
//!
//! This crate has no network, database, or blockchain surface of its
//! own — wiring it to an HTTP API, a chain RPC, or a persistence layer is
//! left to the embedding application. [`config::EngineConfig`] and the
//! [`clock::Clock`] / [`escrow::ValueTransfer`] traits are the seams meant
//! for that wiring.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod events;
pub mod matcher;
pub mod order_book;
pub mod sort_oracle;
pub mod types;

pub use clock::{Clock, SystemClock, TestClock};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use escrow::{EscrowLedger, NullLedgerSubstrate, ValueTransfer};
pub use events::{Event, EventSink};
pub use types::{Ask, Bid, BucketStatus, Side, Trade, TradeBucket};

/// Initializes the `tracing` subscriber from `RUST_LOG`, falling back to
/// `energy_auction_engine=info`. Mirrors the teacher's bootstrap in
/// spirit; embedding applications that already initialize `tracing` on
/// their own should skip this.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "energy_auction_engine=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
