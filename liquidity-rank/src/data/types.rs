//! Core data types for the liquidity pipeline.
//!
//! Option quotes come from the chain provider; the three side records
//! (earnings, fundamentals, IV rank) come from independent sources and are
//! joined onto the liquidity summary by symbol.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// A single option contract quote as returned by the chain provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Underlying symbol (e.g., "SPY")
    pub symbol: String,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Strike price
    pub strike: Decimal,

    /// Underlying last price at fetch time
    pub spot: Decimal,

    /// Bid price
    pub bid: Decimal,

    /// Ask price
    pub ask: Decimal,

    /// Open interest
    pub open_interest: i64,

    /// Option expiration date
    pub expiration: NaiveDate,
}

impl OptionQuote {
    /// Strike minus spot. Negative for in-the-money calls.
    pub fn diff_spot(&self) -> Decimal {
        self.strike - self.spot
    }

    /// Bid-ask spread as a fraction of the bid/ask midpoint.
    pub fn spread_mid(&self) -> f64 {
        let mid = (self.bid + self.ask) / Decimal::from(2);
        if mid.is_zero() {
            return 0.0;
        }
        ((self.ask - self.bid) / mid).try_into().unwrap_or(0.0)
    }

    /// Bid-ask spread as a fraction of the underlying price.
    pub fn spread_spot(&self) -> f64 {
        if self.spot.is_zero() {
            return 0.0;
        }
        ((self.ask - self.bid) / self.spot).try_into().unwrap_or(0.0)
    }
}

/// When an earnings announcement is released relative to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketTiming {
    BeforeMarket,
    AfterMarket,
    #[default]
    Unspecified,
}

impl MarketTiming {
    /// Map the provider's `TimeType` string.
    pub fn from_time_type(s: &str) -> Self {
        match s {
            "BeforeMarket" => Self::BeforeMarket,
            "AfterMarket" => Self::AfterMarket,
            _ => Self::Unspecified,
        }
    }

    /// Short session tag used in the report's earnings column.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::BeforeMarket => "AM",
            Self::AfterMarket => "PM",
            Self::Unspecified => "--",
        }
    }
}

/// Next earnings announcement for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub symbol: String,
    pub earnings_date: Option<NaiveDate>,
    pub timing: MarketTiming,
}

/// Company classification and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRecord {
    pub symbol: String,
    pub sector: Option<String>,
    pub subsector: Option<String>,
    pub market_cap: Option<f64>,
}

/// Implied volatility rank and percentile, both as fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolRankRecord {
    pub symbol: String,
    pub iv_rank: f64,
    pub iv_percentile: f64,
}

impl VolRankRecord {
    /// Build from the percentage values (0-100) the IV source reports.
    pub fn from_percentages(symbol: impl Into<String>, iv_rank_pct: f64, iv_percentile_pct: f64) -> Self {
        Self {
            symbol: symbol.into(),
            iv_rank: iv_rank_pct / 100.0,
            iv_percentile: iv_percentile_pct / 100.0,
        }
    }
}
