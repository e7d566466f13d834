//! Escrow Ledger (`spec.md` §4.4).
//!
//! The engine never touches value directly — it delegates every payout to
//! an injectable [`ValueTransfer`] capability, the explicit abstraction
//! `spec.md` §9 calls for in place of a smart-contract runtime's implicit
//! custody. `EscrowLedger` is the bookkeeping layer on top: it tracks how
//! much value the engine is holding on participants' behalf and fails
//! loudly (without partially applying a batch of payouts) if any transfer
//! fails.

use crate::error::EngineError;
use alloy_primitives::Address;
use std::sync::atomic::{AtomicU64, Ordering};

/// The capability the engine needs from the value-transfer substrate:
/// move owned value to a participant address. Receiving escrowed value
/// with an order is handled by the caller before the bid is even
/// submitted (`spec.md` §1) — only the outbound direction is modeled here.
pub trait ValueTransfer: Send + Sync {
    fn transfer(&self, to: Address, amount: u64) -> Result<(), String>;

    /// Moves every `(to, amount)` pair in `payouts` as one atomic unit:
    /// either all of them land or none do. `roll()` pays out every
    /// rejection refund, overpayment refund, and expiry payout for a
    /// bucket through this single call so that a mid-batch failure
    /// "rolls back the whole roll" (`spec.md` §4.4) instead of leaving
    /// some participants paid and others not. In a blockchain substrate
    /// this is a single reverted transaction; other substrates must
    /// supply an equivalent atomic primitive (`spec.md` §4.4, §9).
    ///
    /// The default implementation calls [`ValueTransfer::transfer`] in
    /// order and is only correct for substrates whose `transfer` cannot
    /// fail once the first one has succeeded (e.g. [`NullLedgerSubstrate`],
    /// which never fails at all); a real substrate must override this
    /// with a genuinely atomic batch primitive.
    fn transfer_batch(&self, payouts: &[(Address, u64)]) -> Result<(), (Address, u64, String)> {
        for &(to, amount) in payouts {
            self.transfer(to, amount).map_err(|reason| (to, amount, reason))?;
        }
        Ok(())
    }
}

/// A `ValueTransfer` that always succeeds and records nothing beyond a
/// running total. Suitable for harnesses that don't care what happens to
/// paid-out value, only that it balances.
#[derive(Debug, Default)]
pub struct NullLedgerSubstrate;

impl ValueTransfer for NullLedgerSubstrate {
    fn transfer(&self, _to: Address, _amount: u64) -> Result<(), String> {
        Ok(())
    }
}

/// Bookkeeping layer over a [`ValueTransfer`] substrate.
///
/// `total_held` is an accounting aid only (debug-asserted against the
/// engine's live state after every roll); it is not itself a source of
/// truth for what any participant is owed.
pub struct EscrowLedger<T: ValueTransfer> {
    substrate: T,
    total_held: AtomicU64,
}

impl<T: ValueTransfer> EscrowLedger<T> {
    pub fn new(substrate: T) -> Self {
        Self {
            substrate,
            total_held: AtomicU64::new(0),
        }
    }

    /// Records that `amount` of value arrived with a new bid.
    pub fn record_escrow(&self, amount: u64) {
        self.total_held.fetch_add(amount, Ordering::SeqCst);
    }

    /// Total value currently accounted for as held in escrow.
    pub fn total_held(&self) -> u64 {
        self.total_held.load(Ordering::SeqCst)
    }

    /// Pays `amount` to `to` and reduces the tracked held total by the
    /// same amount. A transfer failure is surfaced as
    /// [`EngineError::LedgerFailure`] and leaves `total_held` unchanged —
    /// callers are expected to treat this as fatal to the whole operation
    /// in progress (`spec.md` §4.4: "rollback the whole roll if any
    /// refund fails").
    pub fn pay(&self, to: Address, amount: u64) -> Result<(), EngineError> {
        if amount == 0 {
            return Ok(());
        }
        self.substrate
            .transfer(to, amount)
            .map_err(|reason| EngineError::LedgerFailure { to, amount, reason })?;
        self.total_held.fetch_sub(amount, Ordering::SeqCst);
        Ok(())
    }

    /// Pays out every `(to, amount)` pair in `payouts` as one atomic
    /// batch via [`ValueTransfer::transfer_batch`]. Zero-amount payouts
    /// are dropped before reaching the substrate. If the substrate
    /// reports a failure, none of `total_held` is reduced — callers must
    /// be able to treat the whole batch as not having happened
    /// (`spec.md` §4.4).
    pub fn pay_batch(&self, payouts: &[(Address, u64)]) -> Result<(), EngineError> {
        let nonzero: Vec<(Address, u64)> = payouts.iter().copied().filter(|(_, amount)| *amount > 0).collect();
        if nonzero.is_empty() {
            return Ok(());
        }
        self.substrate
            .transfer_batch(&nonzero)
            .map_err(|(to, amount, reason)| EngineError::LedgerFailure { to, amount, reason })?;
        let total: u64 = nonzero.iter().map(|(_, amount)| amount).sum();
        self.total_held.fetch_sub(total, Ordering::SeqCst);
        Ok(())
    }
}
