//! Near-the-money contract selection.
//!
//! Reduces a raw multi-symbol chain to the contracts that best describe each
//! underlying's tradable liquidity:
//! - expirations inside the target window with a live ask
//! - the 4 calls struck closest to spot from below
//! - the 4 puts struck closest to spot from above
//!
//! Open interest is summed over the whole windowed chain before the
//! reduction and stamped onto every retained contract.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::expiry::ExpiryWindow;
use crate::data::{OptionQuote, OptionType};

/// Contracts kept per side.
pub const CONTRACTS_PER_SIDE: usize = 4;

/// A retained contract with its distance to spot.
///
/// `quote.open_interest` holds the symbol's total open interest, not the
/// contract's own.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMoneyQuote {
    pub quote: OptionQuote,
    pub diff_spot: Decimal,
}

impl NearMoneyQuote {
    pub fn symbol(&self) -> &str {
        &self.quote.symbol
    }

    pub fn total_open_interest(&self) -> i64 {
        self.quote.open_interest
    }
}

/// Selector for near-the-money contracts in a fixed expiry window.
#[derive(Debug, Clone, Copy)]
pub struct NearMoneySelector {
    window: ExpiryWindow,
    per_side: usize,
}

impl NearMoneySelector {
    pub fn new(window: ExpiryWindow) -> Self {
        Self {
            window,
            per_side: CONTRACTS_PER_SIDE,
        }
    }

    pub fn window(&self) -> &ExpiryWindow {
        &self.window
    }

    /// Whether a quote is usable at all: in the window and with a non-zero ask.
    pub fn is_eligible(&self, quote: &OptionQuote) -> bool {
        self.window.contains(quote.expiration) && !quote.ask.is_zero()
    }

    /// Select near-the-money contracts for every symbol in `chain`.
    ///
    /// Output is grouped by symbol (alphabetical), calls before puts.
    /// Symbols with no eligible contract do not appear.
    pub fn select(&self, chain: Vec<OptionQuote>) -> Vec<NearMoneyQuote> {
        let mut by_symbol: BTreeMap<String, Vec<OptionQuote>> = BTreeMap::new();
        for quote in chain.into_iter().filter(|q| self.is_eligible(q)) {
            by_symbol.entry(quote.symbol.clone()).or_default().push(quote);
        }

        by_symbol
            .into_values()
            .flat_map(|quotes| self.select_symbol(quotes))
            .collect()
    }

    /// Reduce one symbol's eligible contracts.
    fn select_symbol(&self, quotes: Vec<OptionQuote>) -> Vec<NearMoneyQuote> {
        let total_open_interest: i64 = quotes.iter().map(|q| q.open_interest).sum();

        let mut with_diff: Vec<NearMoneyQuote> = quotes
            .into_iter()
            .map(|quote| NearMoneyQuote {
                diff_spot: quote.diff_spot(),
                quote,
            })
            .collect();
        // Stable, so equal distances keep fetch order
        with_diff.sort_by_key(|q| q.diff_spot);

        let calls: Vec<NearMoneyQuote> = with_diff
            .iter()
            .filter(|q| q.quote.option_type == OptionType::Call && q.diff_spot <= Decimal::ZERO)
            .cloned()
            .collect();
        let calls = &calls[calls.len().saturating_sub(self.per_side)..];

        let puts = with_diff
            .iter()
            .filter(|q| q.quote.option_type == OptionType::Put && q.diff_spot >= Decimal::ZERO)
            .take(self.per_side);

        calls
            .iter()
            .chain(puts)
            .cloned()
            .map(|mut q| {
                q.quote.open_interest = total_open_interest;
                q
            })
            .collect()
    }
}
