//! File-backed implied volatility rank source.
//!
//! Reads an export of the latest IV rank/percentile query, either CSV or
//! Parquet (chosen by extension), with columns:
//! - `Ticker`, `IV rank`, `IV percentile` (percent, 0-100)
//! - optionally `Date` (ISO dates); only the latest date is kept

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use polars::prelude::*;
use tracing::info;

use super::provider::{FetchError, VolRankSource};
use super::types::VolRankRecord;

/// IV rank source backed by a CSV or Parquet file.
pub struct VolRankFile {
    path: PathBuf,
}

impl VolRankFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Scan the file lazily, keep the latest date, and normalize to fractions.
pub fn load_vol_ranks(path: &Path) -> PolarsResult<Vec<VolRankRecord>> {
    let is_parquet = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("parquet"))
        .unwrap_or(false);

    let mut lf = if is_parquet {
        LazyFrame::scan_parquet(path, ScanArgsParquet::default())?
    } else {
        LazyCsvReader::new(path).with_has_header(true).finish()?
    };

    let schema = lf.collect_schema()?;
    if schema.contains("Date") {
        lf = lf.filter(col("Date").eq(col("Date").max()));
    }

    let df = lf
        .select([
            col("Ticker").cast(DataType::String).alias("symbol"),
            col("IV rank").cast(DataType::Float64).alias("iv_rank"),
            col("IV percentile").cast(DataType::Float64).alias("iv_percentile"),
        ])
        .collect()?;

    let symbols = df.column("symbol")?.str()?;
    let ranks = df.column("iv_rank")?.f64()?;
    let percentiles = df.column("iv_percentile")?.f64()?;

    let records = symbols
        .into_iter()
        .zip(ranks.into_iter())
        .zip(percentiles.into_iter())
        .filter_map(|((symbol, rank), percentile)| {
            Some(VolRankRecord::from_percentages(symbol?, rank?, percentile?))
        })
        .collect();

    Ok(records)
}

#[async_trait]
impl VolRankSource for VolRankFile {
    async fn fetch_vol_ranks(&self) -> Result<Vec<VolRankRecord>, FetchError> {
        let path = self.path.clone();
        let records = tokio::task::spawn_blocking(move || load_vol_ranks(&path))
            .await
            .map_err(|e| FetchError::Unavailable(format!("IV loader task failed: {}", e)))??;

        info!("Loaded {} IV rank rows from {}", records.len(), self.path.display());
        Ok(records)
    }
}
