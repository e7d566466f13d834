//! Error taxonomy for the auction engine.
//!
//! Every fallible public operation returns `Result<_, EngineError>`. Callers
//! branch on the variant, never on the message string — the `#[error(...)]`
//! text is for logs and humans.

use alloy_primitives::Address;

/// Unified error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A bid or ask failed one of the order-acceptance preconditions.
    #[error("invalid order: {0}")]
    InvalidOrder(&'static str),

    /// The caller is not permitted to perform the requested operation.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// `roll` was invoked before the current bucket lived `bucket_duration`.
    #[error("too early to roll: now={now} required>={required}")]
    TooEarly { now: u64, required: u64 },

    /// `mark_delivered` referenced a trade index outside the bucket's range.
    #[error("invalid trade: bucket {bucket_id} has no trade {trade_id}")]
    InvalidTrade { bucket_id: u64, trade_id: u64 },

    /// `mark_delivered` was called on a trade that was already supplied.
    #[error("trade {bucket_id}/{trade_id} was already supplied")]
    AlreadySupplied { bucket_id: u64, trade_id: u64 },

    /// A transfer to a participant failed; the whole operation is rolled
    /// back and no state change is visible to callers.
    #[error("ledger transfer to {to} for {amount} failed: {reason}")]
    LedgerFailure {
        to: Address,
        amount: u64,
        reason: String,
    },

    /// A read-only lookup referenced a bucket id outside the engine's
    /// known domain, or one whose offer lists were purged after clearing.
    #[error("no such bucket: {0}")]
    UnknownBucket(u64),

    /// A read-only lookup referenced an offer index outside the bucket's
    /// recorded range (or the bucket's offer lists were already purged).
    #[error("no such offer: bucket {bucket_id} index {index}")]
    UnknownOffer { bucket_id: u64, index: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_carry_stable_discriminators_not_just_messages() {
        let a = EngineError::InvalidOrder("zero energy");
        let b = EngineError::InvalidOrder("zero price");
        assert_ne!(a, b);
        assert!(matches!(a, EngineError::InvalidOrder(_)));
    }

    #[test]
    fn too_early_message_includes_both_timestamps() {
        let err = EngineError::TooEarly {
            now: 10,
            required: 900,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("900"));
    }
}
