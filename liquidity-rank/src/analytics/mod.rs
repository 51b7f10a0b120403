//! Liquidity analytics.
//!
//! Provides:
//! - Expiry window resolution (third Friday of next month)
//! - Near-the-money contract selection
//! - Spread metrics and liquidity tier classification

pub mod expiry;
pub mod liquidity;
pub mod near_money;

pub use expiry::ExpiryWindow;
pub use liquidity::{
    LiquidityClassifier, LiquidityClassifierConfig, LiquidityTier, SymbolLiquiditySummary,
};
pub use near_money::{NearMoneyQuote, NearMoneySelector};
