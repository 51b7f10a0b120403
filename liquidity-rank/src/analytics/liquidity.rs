//! Spread metrics and liquidity tiers.
//!
//! Two spread ratios are computed per retained contract:
//! - SpreadMid: (ask - bid) / midpoint
//! - SpreadSpot: (ask - bid) / underlying price
//!
//! They are averaged per symbol and the symbol is bucketed by mean SpreadSpot
//! and total open interest:
//!
//! | Tier | Condition (first match wins)                               |
//! |------|------------------------------------------------------------|
//! | 1    | SpreadSpot < 0.004 and OI > 1000                           |
//! | 2    | SpreadSpot < 0.006 and OI > 1000, or SpreadSpot < 0.004    |
//! | 3    | everything else                                            |

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::near_money::NearMoneyQuote;

/// Liquidity classification. Ordering follows the tier number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LiquidityTier {
    VeryLiquid,
    SomewhatLiquid,
    NotVeryLiquid,
}

impl LiquidityTier {
    /// Report label, e.g. "1 (Very Liquid)".
    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryLiquid => "1 (Very Liquid)",
            Self::SomewhatLiquid => "2 (Somewhat Liquid)",
            Self::NotVeryLiquid => "3 (Not Very Liquid)",
        }
    }

    /// Tiers listed in the liquidity tracker.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::NotVeryLiquid)
    }
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityClassifierConfig {
    /// Tier 1 requires mean SpreadSpot below this.
    pub tier1_spread_spot: f64,
    /// Tier 1 requires open interest above this.
    pub tier1_open_interest: i64,
    /// Tier 2 (high open interest branch) requires mean SpreadSpot below this.
    pub tier2_spread_spot: f64,
    /// Open interest dividing the two tier 2 branches.
    pub tier2_open_interest: i64,
}

impl Default for LiquidityClassifierConfig {
    fn default() -> Self {
        Self {
            tier1_spread_spot: 0.004,
            tier1_open_interest: 1000,
            tier2_spread_spot: 0.006,
            tier2_open_interest: 1000,
        }
    }
}

/// Per-symbol liquidity summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolLiquiditySummary {
    pub symbol: String,
    /// Mean underlying price over the retained contracts.
    pub spot: Decimal,
    /// Mean SpreadMid over the retained contracts.
    pub spread_mid: f64,
    /// Mean SpreadSpot over the retained contracts.
    pub spread_spot: f64,
    /// Open interest summed over the symbol's whole windowed chain.
    pub open_interest: i64,
    pub liquidity: LiquidityTier,
}

/// Spread and liquidity classifier.
#[derive(Debug, Clone, Default)]
pub struct LiquidityClassifier {
    config: LiquidityClassifierConfig,
}

impl LiquidityClassifier {
    pub fn new(config: LiquidityClassifierConfig) -> Self {
        Self { config }
    }

    /// Assign a tier from mean SpreadSpot and total open interest.
    pub fn classify(&self, spread_spot: f64, open_interest: i64) -> LiquidityTier {
        let c = &self.config;
        if spread_spot < c.tier1_spread_spot && open_interest > c.tier1_open_interest {
            LiquidityTier::VeryLiquid
        } else if (spread_spot < c.tier2_spread_spot && open_interest > c.tier2_open_interest)
            || (spread_spot < c.tier1_spread_spot && open_interest <= c.tier2_open_interest)
        {
            LiquidityTier::SomewhatLiquid
        } else {
            LiquidityTier::NotVeryLiquid
        }
    }

    /// Summarize and classify every symbol in a near-the-money selection.
    ///
    /// Symbols are aggregated in parallel; the result is ordered by symbol.
    /// Symbols with a non-positive mean spread are dropped as bad quote data.
    pub fn summarize(&self, selected: Vec<NearMoneyQuote>) -> Vec<SymbolLiquiditySummary> {
        let mut groups: BTreeMap<String, Vec<NearMoneyQuote>> = BTreeMap::new();
        for q in selected {
            groups.entry(q.quote.symbol.clone()).or_default().push(q);
        }

        groups
            .into_par_iter()
            .filter_map(|(symbol, quotes)| self.summarize_symbol(symbol, &quotes))
            .collect()
    }

    fn summarize_symbol(
        &self,
        symbol: String,
        quotes: &[NearMoneyQuote],
    ) -> Option<SymbolLiquiditySummary> {
        if quotes.is_empty() {
            return None;
        }
        let n = quotes.len() as f64;

        let spot = quotes.iter().map(|q| q.quote.spot).sum::<Decimal>() / Decimal::from(quotes.len());
        let spread_mid = quotes.iter().map(|q| q.quote.spread_mid()).sum::<f64>() / n;
        let spread_spot = quotes.iter().map(|q| q.quote.spread_spot()).sum::<f64>() / n;
        let open_interest = (quotes.iter().map(|q| q.total_open_interest() as f64).sum::<f64>() / n)
            .round() as i64;

        // Also rejects NaN
        if !(spread_mid > 0.0 && spread_spot > 0.0) {
            return None;
        }

        Some(SymbolLiquiditySummary {
            liquidity: self.classify(spread_spot, open_interest),
            symbol,
            spot,
            spread_mid,
            spread_spot,
            open_interest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{OptionQuote, OptionType};
    use chrono::NaiveDate;
    use rust_decimal::prelude::FromPrimitive;

    fn near(symbol: &str, bid: f64, ask: f64, spot: f64, total_oi: i64) -> NearMoneyQuote {
        let quote = OptionQuote {
            symbol: symbol.to_string(),
            option_type: OptionType::Call,
            strike: Decimal::from_f64(spot).unwrap(),
            spot: Decimal::from_f64(spot).unwrap(),
            bid: Decimal::from_f64(bid).unwrap(),
            ask: Decimal::from_f64(ask).unwrap(),
            open_interest: total_oi,
            expiration: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
        };
        NearMoneyQuote {
            diff_spot: quote.diff_spot(),
            quote,
        }
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(LiquidityTier::VeryLiquid.label(), "1 (Very Liquid)");
        assert_eq!(LiquidityTier::SomewhatLiquid.to_string(), "2 (Somewhat Liquid)");
        assert!(LiquidityTier::VeryLiquid < LiquidityTier::NotVeryLiquid);
    }

    #[test]
    fn test_classification_priority() {
        let classifier = LiquidityClassifier::default();

        // Matches both tier 1 and the first tier 2 branch; tier 1 wins
        assert_eq!(classifier.classify(0.003, 2000), LiquidityTier::VeryLiquid);
        assert_eq!(classifier.classify(0.005, 2000), LiquidityTier::SomewhatLiquid);
        assert_eq!(classifier.classify(0.003, 1000), LiquidityTier::SomewhatLiquid);
        assert_eq!(classifier.classify(0.003, 10), LiquidityTier::SomewhatLiquid);
        assert_eq!(classifier.classify(0.005, 1000), LiquidityTier::NotVeryLiquid);
        assert_eq!(classifier.classify(0.006, 5000), LiquidityTier::NotVeryLiquid);
        assert_eq!(classifier.classify(0.2, 1500), LiquidityTier::NotVeryLiquid);
    }

    #[test]
    fn test_classification_uses_configured_thresholds() {
        let classifier = LiquidityClassifier::new(LiquidityClassifierConfig {
            tier1_spread_spot: 0.01,
            tier1_open_interest: 100,
            tier2_spread_spot: 0.02,
            tier2_open_interest: 100,
        });
        assert_eq!(classifier.classify(0.009, 101), LiquidityTier::VeryLiquid);
        assert_eq!(classifier.classify(0.015, 101), LiquidityTier::SomewhatLiquid);
    }

    #[test]
    fn test_tiers_follow_spread_spot_not_spread_mid() {
        // Bid 0.90 / Ask 1.10 on a $100 stock: SpreadMid 0.20, SpreadSpot 0.002
        let summaries = LiquidityClassifier::default().summarize(vec![near("XYZ", 0.90, 1.10, 100.0, 1500)]);
        assert_eq!(summaries.len(), 1);
        let xyz = &summaries[0];
        assert!((xyz.spread_mid - 0.20).abs() < 1e-12);
        assert!((xyz.spread_spot - 0.002).abs() < 1e-12);
        assert_eq!(xyz.open_interest, 1500);
        assert_eq!(xyz.spot, Decimal::from(100));
        assert_eq!(xyz.liquidity, LiquidityTier::VeryLiquid);

        // Same quote on a $20 stock: SpreadSpot 0.01
        let summaries = LiquidityClassifier::default().summarize(vec![near("XYZ", 0.90, 1.10, 20.0, 1500)]);
        assert_eq!(summaries[0].liquidity, LiquidityTier::NotVeryLiquid);
    }

    #[test]
    fn test_tight_spread_with_open_interest_is_tier_one() {
        // SpreadSpot 0.30 / 100 = 0.003
        let summaries = LiquidityClassifier::default().summarize(vec![near("ABC", 10.0, 10.30, 100.0, 2000)]);
        assert_eq!(summaries[0].liquidity, LiquidityTier::VeryLiquid);
    }

    #[test]
    fn test_means_across_rows() {
        let summaries = LiquidityClassifier::default().summarize(vec![
            near("ABC", 1.0, 1.2, 100.0, 800),
            near("ABC", 2.0, 2.2, 100.0, 800),
        ]);
        let abc = &summaries[0];
        let expected_mid = (0.2 / 1.1 + 0.2 / 2.1) / 2.0;
        assert!((abc.spread_mid - expected_mid).abs() < 1e-9);
        assert!((abc.spread_spot - 0.002).abs() < 1e-12);
        assert_eq!(abc.open_interest, 800);
        assert_eq!(abc.liquidity, LiquidityTier::SomewhatLiquid);
    }

    #[test]
    fn test_non_positive_spreads_dropped() {
        let summaries = LiquidityClassifier::default().summarize(vec![
            near("LOCKED", 1.0, 1.0, 100.0, 5000),
            near("CROSSED", 1.2, 1.0, 100.0, 5000),
            near("GOOD", 1.0, 1.1, 100.0, 5000),
        ]);
        let symbols: Vec<&str> = summaries.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["GOOD"]);
    }

    #[test]
    fn test_summaries_ordered_by_symbol() {
        let summaries = LiquidityClassifier::default().summarize(vec![
            near("MSFT", 1.0, 1.1, 100.0, 10),
            near("AAPL", 1.0, 1.1, 100.0, 10),
            near("IBM", 1.0, 1.1, 100.0, 10),
        ]);
        let symbols: Vec<&str> = summaries.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "IBM", "MSFT"]);
    }
}
