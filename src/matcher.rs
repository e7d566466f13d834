//! Matcher (`spec.md` §4.3) — the auction's algorithmic core.
//!
//! Consumes a closed bucket's bid and ask lists and produces the set of
//! confirmed trades plus the single uniform clearing price, following the
//! merit-order walk described in `spec.md` §4.3:
//!
//! - bids sorted descending by price, asks ascending, both via the
//!   [`crate::sort_oracle`] (stable);
//! - for each bid in turn, walk asks from a shared, monotonically
//!   advancing cursor, transacting `min(remaining_bid, remaining_ask)`
//!   units per ask;
//! - a bid either fills completely or not at all — a partial fill is
//!   rolled back in full (restoring the touched asks' remaining energy)
//!   and the bid moves on to rejection accounting, *without* terminating
//!   the outer loop for bids that sort after it;
//! - the clearing price is set to the unit price of the ask that
//!   completed the most recently *filled* bid, and only then — never
//!   overwritten by every committed ask (`spec.md` §9);
//! - every filled bid's overpayment refund is computed in a second pass,
//!   after the loop, against that single final `clearing_price` — not
//!   against the price of whichever ask happened to complete that
//!   particular bid, which can differ from the bucket's eventual final
//!   price (`spec.md` §4.3's "Refund accounting after matching" runs
//!   after the whole matching loop finishes).

use crate::sort_oracle::{sort_offers, Direction};
use crate::types::{Ask, Bid, Trade};

/// A bid that did not fill, and the full-escrow refund owed to it.
#[derive(Debug, Clone)]
pub struct RejectedBid {
    pub bid: Bid,
    pub refund: u64,
}

/// A bid that filled completely, and any overpayment refund owed to it.
#[derive(Debug, Clone)]
pub struct FilledBid {
    pub bid: Bid,
    pub refund: u64,
}

/// An ask with energy left over once matching finished.
#[derive(Debug, Clone)]
pub struct RejectedAsk {
    pub ask: Ask,
}

/// Per-bid result, in sorted-bid order.
#[derive(Debug, Clone)]
pub enum BidOutcome {
    Filled(FilledBid),
    Rejected(RejectedBid),
}

/// The full result of matching one closed bucket.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Uniform price applied to every confirmed trade. `0` if no bid filled.
    pub clearing_price: u64,
    /// Confirmed trades, in the order they were committed.
    pub trades: Vec<Trade>,
    /// Every bid's outcome, in sorted-bid (descending price) order.
    pub bid_outcomes: Vec<BidOutcome>,
    /// Asks left with unconsumed energy, in sorted-ask (ascending price)
    /// order.
    pub rejected_asks: Vec<RejectedAsk>,
}

/// Matches a closed bucket's bids against its asks.
pub fn match_bucket(bids: &[Bid], asks: &[Ask]) -> MatchOutcome {
    let mut sorted_bids = bids.to_vec();
    sort_offers(&mut sorted_bids, Direction::Descending);

    let mut sorted_asks = asks.to_vec();
    sort_offers(&mut sorted_asks, Direction::Ascending);

    let mut ask_remaining: Vec<u64> = sorted_asks.iter().map(|a| a.energy_amount).collect();
    let mut ask_cursor = 0usize;
    let mut clearing_price = 0u64;
    let mut trades: Vec<Trade> = Vec::new();
    let mut bid_outcomes: Vec<BidOutcome> = Vec::with_capacity(sorted_bids.len());

    let mut bid_index = 0usize;
    'outer: while bid_index < sorted_bids.len() {
        let bid = &sorted_bids[bid_index];

        if ask_cursor >= sorted_asks.len() || bid.unit_price < sorted_asks[ask_cursor].unit_price {
            // This bid, and every bid sorted after it, cannot possibly
            // reach the remaining supply: terminate the outer loop and
            // reject everything from here on.
            break 'outer;
        }

        let mut remaining_bid = bid.energy_amount;
        let mut scratch: Vec<Trade> = Vec::new();
        let mut saved: Vec<(usize, u64)> = Vec::new();
        let mut asks_emptied = 0usize;
        let mut fill_price = 0u64;
        let mut walk = ask_cursor;

        while walk < sorted_asks.len() && remaining_bid > 0 {
            let ask_price = sorted_asks[walk].unit_price;
            if bid.unit_price < ask_price {
                break;
            }

            saved.push((walk, ask_remaining[walk]));
            let provision = remaining_bid.min(ask_remaining[walk]);
            ask_remaining[walk] -= provision;
            remaining_bid -= provision;
            scratch.push(Trade::new(bid.trader, sorted_asks[walk].trader, provision));

            if ask_remaining[walk] == 0 {
                asks_emptied += 1;
            }
            if remaining_bid == 0 {
                fill_price = ask_price;
                break;
            }
            walk += 1;
        }

        if remaining_bid > 0 {
            // Did not fill: roll back every ask this bid touched and
            // reject it in full. The outer loop continues with the next
            // bid against the untouched ask inventory.
            for (idx, before) in saved {
                ask_remaining[idx] = before;
            }
            bid_outcomes.push(BidOutcome::Rejected(RejectedBid {
                refund: bid.energy_amount.checked_mul(bid.unit_price).expect("escrow bounds checked at submission"),
                bid: bid.clone(),
            }));
        } else {
            clearing_price = fill_price;
            // Overpayment depends on the bucket's final clearing price,
            // which isn't known until every bid has had its turn — filled
            // bids here are a placeholder refund of 0, recomputed below.
            bid_outcomes.push(BidOutcome::Filled(FilledBid { refund: 0, bid: bid.clone() }));
            trades.extend(scratch);
            ask_cursor += asks_emptied;
        }

        bid_index += 1;
    }

    // Every bid from `bid_index` onward never got a turn; reject in full.
    for bid in &sorted_bids[bid_index..] {
        bid_outcomes.push(BidOutcome::Rejected(RejectedBid {
            refund: bid.energy_amount.checked_mul(bid.unit_price).expect("escrow bounds checked at submission"),
            bid: bid.clone(),
        }));
    }

    // Every filled bid is priced at the single final clearing_price
    // (spec.md §4.3: "Refund accounting after matching" runs after the
    // whole loop, against the one final clearing price), not whichever
    // ask price happened to complete that particular bid.
    for outcome in &mut bid_outcomes {
        if let BidOutcome::Filled(filled) = outcome {
            filled.refund = filled
                .bid
                .energy_amount
                .checked_mul(filled.bid.unit_price.saturating_sub(clearing_price))
                .expect("escrow bounds checked at submission");
        }
    }

    let rejected_asks = sorted_asks
        .into_iter()
        .zip(ask_remaining)
        .filter(|(_, remaining)| *remaining > 0)
        .map(|(ask, _)| RejectedAsk { ask })
        .collect();

    MatchOutcome {
        clearing_price,
        trades,
        bid_outcomes,
        rejected_asks,
    }
}
