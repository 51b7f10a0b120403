//! Report rows, ordering, and file output.
//!
//! Two artifacts are produced from the merged rows:
//! - the liquidity report, every symbol ordered by tier
//! - the liquidity tracker, tiers 1 and 2 ordered by tier then SpreadSpot
//!
//! Both are written through polars, as CSV or zstd Parquet by extension.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::analytics::{ExpiryWindow, LiquidityTier};

/// Report columns, in output order.
pub const REPORT_COLUMNS: [&str; 9] = [
    "Symbol",
    "Price",
    "IV Rank",
    "IV Percentile",
    "Liquidity",
    "Earnings Date",
    "Open Interest",
    "Sector",
    "Subsector",
];

/// Tracker columns, in output order.
pub const TRACKER_COLUMNS: [&str; 4] = ["Symbol", "Liquidity", "IV Rank", "Earnings Date"];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// One merged output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub symbol: String,
    /// Mean spot over the retained contracts.
    pub price: Decimal,
    pub iv_rank: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub liquidity: LiquidityTier,
    /// Formatted as `AM 02/15/2024 (12)`.
    pub earnings_date: Option<String>,
    pub open_interest: i64,
    pub sector: Option<String>,
    pub subsector: Option<String>,
    /// Not written; used for tracker ordering.
    pub spread_mid: f64,
    /// Not written; used for tracker ordering.
    pub spread_spot: f64,
}

/// Output of a complete run.
#[derive(Debug, Clone)]
pub struct LiquidityReport {
    pub generated_on: NaiveDate,
    pub window: ExpiryWindow,
    pub universe_size: usize,
    pub batches: usize,
    pub failed_tickers: Vec<String>,
    /// Ordered by liquidity tier.
    pub rows: Vec<ReportRow>,
}

impl LiquidityReport {
    /// Tier 1 and 2 rows, ordered by tier then ascending SpreadSpot.
    pub fn tracker_rows(&self) -> Vec<&ReportRow> {
        let mut rows: Vec<&ReportRow> = self
            .rows
            .iter()
            .filter(|r| r.liquidity.is_tracked())
            .collect();
        rows.sort_by(|a, b| {
            a.liquidity
                .cmp(&b.liquidity)
                .then(a.spread_spot.total_cmp(&b.spread_spot))
        });
        rows
    }

    /// Row count for `tier`.
    pub fn tier_count(&self, tier: LiquidityTier) -> usize {
        self.rows.iter().filter(|r| r.liquidity == tier).count()
    }

    pub fn report_frame(&self) -> PolarsResult<DataFrame> {
        report_frame(&self.rows)
    }

    pub fn tracker_frame(&self) -> PolarsResult<DataFrame> {
        tracker_frame(&self.tracker_rows())
    }
}

/// Stable sort by tier, tier 1 first.
pub fn sort_by_liquidity(rows: &mut [ReportRow]) {
    rows.sort_by_key(|r| r.liquidity);
}

/// Build the report frame.
pub fn report_frame(rows: &[ReportRow]) -> PolarsResult<DataFrame> {
    let symbol: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let price: Vec<Option<f64>> = rows.iter().map(|r| r.price.to_f64()).collect();
    let iv_rank: Vec<Option<f64>> = rows.iter().map(|r| r.iv_rank).collect();
    let iv_percentile: Vec<Option<f64>> = rows.iter().map(|r| r.iv_percentile).collect();
    let liquidity: Vec<&str> = rows.iter().map(|r| r.liquidity.label()).collect();
    let earnings: Vec<Option<&str>> = rows.iter().map(|r| r.earnings_date.as_deref()).collect();
    let open_interest: Vec<i64> = rows.iter().map(|r| r.open_interest).collect();
    let sector: Vec<Option<&str>> = rows.iter().map(|r| r.sector.as_deref()).collect();
    let subsector: Vec<Option<&str>> = rows.iter().map(|r| r.subsector.as_deref()).collect();

    DataFrame::new(vec![
        Series::new(REPORT_COLUMNS[0].into(), symbol).into(),
        Series::new(REPORT_COLUMNS[1].into(), price).into(),
        Series::new(REPORT_COLUMNS[2].into(), iv_rank).into(),
        Series::new(REPORT_COLUMNS[3].into(), iv_percentile).into(),
        Series::new(REPORT_COLUMNS[4].into(), liquidity).into(),
        Series::new(REPORT_COLUMNS[5].into(), earnings).into(),
        Series::new(REPORT_COLUMNS[6].into(), open_interest).into(),
        Series::new(REPORT_COLUMNS[7].into(), sector).into(),
        Series::new(REPORT_COLUMNS[8].into(), subsector).into(),
    ])
}

/// Build the tracker frame from already-ordered rows.
pub fn tracker_frame(rows: &[&ReportRow]) -> PolarsResult<DataFrame> {
    let symbol: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let liquidity: Vec<&str> = rows.iter().map(|r| r.liquidity.label()).collect();
    let iv_rank: Vec<Option<f64>> = rows.iter().map(|r| r.iv_rank).collect();
    let earnings: Vec<Option<&str>> = rows.iter().map(|r| r.earnings_date.as_deref()).collect();

    DataFrame::new(vec![
        Series::new(TRACKER_COLUMNS[0].into(), symbol).into(),
        Series::new(TRACKER_COLUMNS[1].into(), liquidity).into(),
        Series::new(TRACKER_COLUMNS[2].into(), iv_rank).into(),
        Series::new(TRACKER_COLUMNS[3].into(), earnings).into(),
    ])
}

/// Write `df` to `path`, creating parent directories.
///
/// `.parquet` files are zstd-compressed Parquet; `.csv` files are CSV with a
/// header row.
pub fn write_frame(path: &Path, df: &mut DataFrame) -> Result<(), ReportError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if ext != "csv" && ext != "parquet" {
        return Err(ReportError::UnsupportedFormat(path.display().to_string()));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    if ext == "parquet" {
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(df)?;
    } else {
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
    }

    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
