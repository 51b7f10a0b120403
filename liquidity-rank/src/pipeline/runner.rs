//! End-to-end liquidity run.
//!
//! Resolves the expiry window and the ticker universe, then fans out:
//! - the batch pipeline over the universe
//! - per-ticker earnings lookups (bounded concurrency)
//! - one fundamentals request
//! - the IV rank source, when configured
//!
//! All four are joined before the merge. Only a universe failure aborts.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{info, warn};

use super::batch::{BatchConfig, BatchOrchestrator};
use super::merge::{MergeEngine, SideTable};
use crate::analytics::{ExpiryWindow, LiquidityClassifier, LiquidityClassifierConfig};
use crate::data::{
    ChainProvider, EarningsProvider, EarningsRecord, FetchError, FundamentalsProvider,
    FundamentalsRecord, TickerUniverse, VolRankRecord, VolRankSource,
};
use crate::report::{sort_by_liquidity, LiquidityReport};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to fetch ticker universe for {exchange}: {source}")]
    Universe {
        exchange: String,
        #[source]
        source: FetchError,
    },
}

/// Run parameters.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Exchange whose option underlyings form the universe.
    pub exchange: String,
    pub batch: BatchConfig,
    pub liquidity: LiquidityClassifierConfig,
    /// Earnings lookups allowed in flight at once.
    pub earnings_concurrency: usize,
    /// Only process the first `limit` tickers.
    pub limit: Option<usize>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            exchange: "OPRA".to_string(),
            batch: BatchConfig::default(),
            liquidity: LiquidityClassifierConfig::default(),
            earnings_concurrency: 10,
            limit: None,
        }
    }
}

/// A configured liquidity run over a set of data providers.
pub struct LiquidityRun {
    universe: Arc<dyn TickerUniverse>,
    chains: Arc<dyn ChainProvider>,
    earnings: Arc<dyn EarningsProvider>,
    fundamentals: Arc<dyn FundamentalsProvider>,
    vol_ranks: Option<Arc<dyn VolRankSource>>,
    settings: RunSettings,
    progress: Option<ProgressBar>,
}

impl LiquidityRun {
    pub fn new(
        universe: Arc<dyn TickerUniverse>,
        chains: Arc<dyn ChainProvider>,
        earnings: Arc<dyn EarningsProvider>,
        fundamentals: Arc<dyn FundamentalsProvider>,
        settings: RunSettings,
    ) -> Self {
        Self {
            universe,
            chains,
            earnings,
            fundamentals,
            vol_ranks: None,
            settings,
            progress: None,
        }
    }

    pub fn with_vol_ranks(mut self, source: Arc<dyn VolRankSource>) -> Self {
        self.vol_ranks = Some(source);
        self
    }

    /// Track batch completion on `progress`; its length is set at run time.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetch, de-duplicate and optionally truncate the ticker universe.
    pub async fn resolve_universe(&self) -> Result<Vec<String>, RunError> {
        let exchange = &self.settings.exchange;
        let raw = self
            .universe
            .fetch_tickers(exchange)
            .await
            .map_err(|source| RunError::Universe {
                exchange: exchange.clone(),
                source,
            })?;

        let listed = raw.len();
        let mut tickers = dedupe(raw);
        if tickers.len() < listed {
            info!("Dropped {} duplicate tickers", listed - tickers.len());
        }

        if let Some(limit) = self.settings.limit {
            tickers.truncate(limit);
            info!("Limiting run to the first {} tickers", tickers.len());
        }

        Ok(tickers)
    }

    /// Run the full pipeline as of `today`.
    pub async fn execute(&self, today: NaiveDate) -> Result<LiquidityReport, RunError> {
        let window = ExpiryWindow::for_date(today);
        info!(
            "Targeting expiration {} (window {} to {})",
            window.third_friday, window.from_date, window.to_date
        );

        let tickers = self.resolve_universe().await?;
        info!("{} tickers in universe for {}", tickers.len(), self.settings.exchange);

        let mut orchestrator = BatchOrchestrator::new(
            Arc::clone(&self.chains),
            LiquidityClassifier::new(self.settings.liquidity.clone()),
            self.settings.batch.clone(),
        );
        if let Some(progress) = &self.progress {
            progress.set_length(orchestrator.batch_count(&tickers) as u64);
            orchestrator = orchestrator.with_progress(progress.clone());
        }

        let (batch_run, earnings, fundamentals, vol_ranks) = tokio::join!(
            orchestrator.run(&tickers, window),
            self.earnings_table(&tickers),
            self.fundamentals_table(&tickers),
            self.vol_rank_table(),
        );

        let mut summaries = batch_run.summaries;
        summaries.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let mut rows =
            MergeEngine::new(today).merge(summaries, &earnings, &fundamentals, &vol_ranks);
        sort_by_liquidity(&mut rows);

        Ok(LiquidityReport {
            generated_on: today,
            window,
            universe_size: tickers.len(),
            batches: batch_run.batches,
            failed_tickers: batch_run.failed_tickers,
            rows,
        })
    }

    async fn earnings_table(&self, tickers: &[String]) -> SideTable<EarningsRecord> {
        let provider = &self.earnings;
        let records: Vec<EarningsRecord> = stream::iter(tickers)
            .map(|symbol| async move { (symbol, provider.fetch_earnings(symbol).await) })
            .buffer_unordered(self.settings.earnings_concurrency.max(1))
            .filter_map(|(symbol, result)| async move {
                match result {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Problem retrieving earnings for {}: {}", symbol, e);
                        None
                    }
                }
            })
            .collect()
            .await;

        info!("Retrieved earnings for {} of {} tickers", records.len(), tickers.len());
        SideTable::from_rows("Earnings", records)
    }

    async fn fundamentals_table(&self, tickers: &[String]) -> SideTable<FundamentalsRecord> {
        match self.fundamentals.fetch_fundamentals(tickers).await {
            Ok(records) => {
                let table = SideTable::from_rows("Fundamentals", records);
                info!("Retrieved fundamentals for {} tickers", table.len());
                table
            }
            Err(e) => {
                warn!("Fundamentals unavailable, sector columns will be empty: {}", e);
                SideTable::default()
            }
        }
    }

    async fn vol_rank_table(&self) -> SideTable<VolRankRecord> {
        let Some(source) = &self.vol_ranks else {
            info!("No IV rank source configured");
            return SideTable::default();
        };

        match source.fetch_vol_ranks().await {
            Ok(records) => {
                let table = SideTable::from_rows("IV rank", records);
                if table.is_empty() {
                    warn!("IV rank source returned no rows");
                }
                table
            }
            Err(e) => {
                warn!("IV rank data unavailable, IV columns will be empty: {}", e);
                SideTable::default()
            }
        }
    }
}

/// Drop repeated and blank symbols, keeping first occurrence order.
fn dedupe(tickers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
