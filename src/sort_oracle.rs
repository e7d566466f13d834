//! Sort Oracle (`spec.md` §4.2).
//!
//! A stable, deterministic total ordering over an offer list by
//! `unit_price`. `[T]::sort_by` is specified by the standard library to be
//! stable, so equal-priced offers retain insertion order without any
//! hand-rolled merge sort (`spec.md` §9: "any stable sort is acceptable").

/// Anything with a unit price can be sorted by the oracle.
pub trait Priced {
    fn unit_price(&self) -> u64;
}

impl Priced for crate::types::Bid {
    fn unit_price(&self) -> u64 {
        self.unit_price
    }
}

impl Priced for crate::types::Ask {
    fn unit_price(&self) -> u64 {
        self.unit_price
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A secondary ordering key. Per `spec.md` §4.2/§9 this parameter is
/// accepted for API completeness but is vestigial: matching only ever
/// relies on the price-primary, insertion-order-secondary ordering that
/// `sort_by` already gives for free, so any value here is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryKey {
    None,
    EnergyAmount,
}

/// Sorts `offers` by unit price in the given direction. Stable: offers
/// with equal price retain their relative input order.
pub fn sort_offers<T: Priced>(offers: &mut [T], direction: Direction) {
    match direction {
        Direction::Ascending => offers.sort_by_key(|o| o.unit_price()),
        Direction::Descending => offers.sort_by(|a, b| b.unit_price().cmp(&a.unit_price())),
    }
}

/// As [`sort_offers`], but accepts the vestigial secondary key parameter
/// from `spec.md` §4.2. Implementations may accept and ignore it so long
/// as the price-primary ordering stays stable; this one does.
pub fn sort_offers_with_secondary<T: Priced>(offers: &mut [T], direction: Direction, _secondary: SecondaryKey) {
    sort_offers(offers, direction);
}
