//! Option liquidity ranking.
//!
//! Ranks every optionable underlying on an exchange by how cheaply its
//! near-the-money options trade in next month's expiration cycle, and joins
//! the ranking with earnings dates, sector data and implied volatility rank.

pub mod analytics;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod report;

// Re-export commonly used types
pub use analytics::{ExpiryWindow, LiquidityClassifier, LiquidityTier, NearMoneySelector, SymbolLiquiditySummary};
pub use config::{ConfigError, RunConfig};
pub use data::{OptionQuote, OptionType, VolRankFile, XigniteClient};
pub use pipeline::{BatchOrchestrator, LiquidityRun, MergeEngine, RunError, RunSettings};
pub use report::{write_frame, LiquidityReport, ReportError, ReportRow};
