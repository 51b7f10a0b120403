//! Collaborator interfaces consumed by the liquidity pipeline.
//!
//! The pipeline only depends on the shape of the data these return. The
//! Xignite client and the IV file source are the production implementations;
//! tests plug in in-memory fakes.

use async_trait::async_trait;
use polars::prelude::PolarsError;
use thiserror::Error;

use super::types::{EarningsRecord, FundamentalsRecord, OptionQuote, VolRankRecord};
use super::xignite::XigniteError;

/// Failure to retrieve data for one request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Xignite(#[from] XigniteError),

    #[error("IV data error: {0}")]
    VolData(#[from] PolarsError),

    #[error("Timed out after {secs}s fetching {symbol}")]
    Timeout { symbol: String, secs: u64 },

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Enumerates the option underlyings listed on an exchange.
#[async_trait]
pub trait TickerUniverse: Send + Sync {
    async fn fetch_tickers(&self, exchange: &str) -> Result<Vec<String>, FetchError>;
}

/// Retrieves the option chain of one underlying for an expiry month.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn fetch_chain(
        &self,
        symbol: &str,
        month: u32,
        year: i32,
    ) -> Result<Vec<OptionQuote>, FetchError>;
}

/// Retrieves the next earnings announcement of one underlying.
#[async_trait]
pub trait EarningsProvider: Send + Sync {
    /// `Ok(None)` when the provider has no announcement for the symbol.
    async fn fetch_earnings(&self, symbol: &str) -> Result<Option<EarningsRecord>, FetchError>;
}

/// Retrieves sector classification and market cap for many symbols at once.
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fetch_fundamentals(
        &self,
        symbols: &[String],
    ) -> Result<Vec<FundamentalsRecord>, FetchError>;
}

/// Latest implied volatility rank/percentile per symbol, already normalized to fractions.
#[async_trait]
pub trait VolRankSource: Send + Sync {
    async fn fetch_vol_ranks(&self) -> Result<Vec<VolRankRecord>, FetchError>;
}
