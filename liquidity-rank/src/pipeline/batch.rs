//! Batched chain retrieval and classification.
//!
//! The ticker universe is split into contiguous batches. Each batch runs as
//! its own task: fetch every ticker's chain, keep the successes, then run the
//! near-the-money selector and the liquidity classifier over the combined
//! chain. Batches share nothing but the provider handle, so their outputs are
//! simply concatenated.

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::analytics::{
    ExpiryWindow, LiquidityClassifier, NearMoneySelector, SymbolLiquiditySummary,
};
use crate::data::{ChainProvider, FetchError, OptionQuote};

/// Batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Tickers per batch.
    pub batch_size: usize,
    /// Batches allowed in flight at once.
    pub max_concurrent_batches: usize,
    /// Per-ticker chain fetch timeout.
    pub fetch_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrent_batches: 10,
            fetch_timeout_secs: 30,
        }
    }
}

/// Result of fetching one ticker's chain.
pub type TickerFetch = (String, Result<Vec<OptionQuote>, FetchError>);

/// Output of a single batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub summaries: Vec<SymbolLiquiditySummary>,
    pub failed: Vec<String>,
}

/// Output of a full orchestrated run.
#[derive(Debug, Default)]
pub struct BatchRunSummary {
    pub summaries: Vec<SymbolLiquiditySummary>,
    pub batches: usize,
    pub tickers_requested: usize,
    pub failed_tickers: Vec<String>,
}

/// Split the universe into contiguous batches of at most `batch_size`.
pub fn partition(tickers: &[String], batch_size: usize) -> Vec<Vec<String>> {
    tickers
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Fetch each ticker in turn; failures and timeouts are recorded, not raised.
pub async fn fetch_batch(
    provider: &dyn ChainProvider,
    tickers: &[String],
    window: &ExpiryWindow,
    timeout: Duration,
) -> Vec<TickerFetch> {
    let mut fetches = Vec::with_capacity(tickers.len());
    for symbol in tickers {
        let request = provider.fetch_chain(symbol, window.month(), window.year());
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                symbol: symbol.clone(),
                secs: timeout.as_secs(),
            }),
        };
        fetches.push((symbol.clone(), result));
    }
    fetches
}

/// Select and classify the successful part of a batch.
pub fn process_batch(
    fetches: Vec<TickerFetch>,
    selector: &NearMoneySelector,
    classifier: &LiquidityClassifier,
) -> BatchOutcome {
    let mut chain = Vec::new();
    let mut failed = Vec::new();

    for (symbol, result) in fetches {
        match result {
            Ok(quotes) => chain.extend(quotes),
            Err(e) => {
                warn!("Problem retrieving options chain for {}: {}", symbol, e);
                failed.push(symbol);
            }
        }
    }

    if chain.is_empty() {
        return BatchOutcome {
            summaries: Vec::new(),
            failed,
        };
    }

    let selected = selector.select(chain);
    BatchOutcome {
        summaries: classifier.summarize(selected),
        failed,
    }
}

/// Runs batches concurrently and concatenates their summaries.
pub struct BatchOrchestrator {
    chains: Arc<dyn ChainProvider>,
    classifier: LiquidityClassifier,
    config: BatchConfig,
    progress: Option<ProgressBar>,
}

impl BatchOrchestrator {
    pub fn new(
        chains: Arc<dyn ChainProvider>,
        classifier: LiquidityClassifier,
        config: BatchConfig,
    ) -> Self {
        Self {
            chains,
            classifier,
            config,
            progress: None,
        }
    }

    /// Advance `progress` once per finished batch.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Number of batches `tickers` will be split into.
    pub fn batch_count(&self, tickers: &[String]) -> usize {
        tickers.len().div_ceil(self.config.batch_size.max(1))
    }

    /// Process the whole universe against `window`.
    pub async fn run(&self, tickers: &[String], window: ExpiryWindow) -> BatchRunSummary {
        let batches = partition(tickers, self.config.batch_size);
        let total = batches.len();
        info!(
            "Processing {} tickers in {} batches of up to {}",
            tickers.len(),
            total,
            self.config.batch_size
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches.max(1)));
        let selector = NearMoneySelector::new(window);
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);

        let mut tasks = JoinSet::new();
        for (idx, batch) in batches.into_iter().enumerate() {
            let chains = Arc::clone(&self.chains);
            let classifier = self.classifier.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let fetches = fetch_batch(chains.as_ref(), &batch, selector.window(), timeout).await;
                let outcome = match tokio::task::spawn_blocking(move || {
                    process_batch(fetches, &selector, &classifier)
                })
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Batch {}/{} classification failed: {}", idx + 1, total, e);
                        BatchOutcome {
                            summaries: Vec::new(),
                            failed: batch.clone(),
                        }
                    }
                };
                debug!(
                    "Batch {}/{}: {} tickers, {} summaries, {} failed",
                    idx + 1,
                    total,
                    batch.len(),
                    outcome.summaries.len(),
                    outcome.failed.len()
                );
                outcome
            });
        }

        let mut summary = BatchRunSummary {
            batches: total,
            tickers_requested: tickers.len(),
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    summary.summaries.extend(outcome.summaries);
                    summary.failed_tickers.extend(outcome.failed);
                }
                Err(e) => error!("Batch task aborted, contributing nothing: {}", e),
            }
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        info!(
            "Batches complete: {} symbols classified, {} tickers failed",
            summary.summaries.len(),
            summary.failed_tickers.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::LiquidityTier;
    use crate::data::OptionType;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn window() -> ExpiryWindow {
        ExpiryWindow::for_date(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
    }

    fn tickers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{:03}", i)).collect()
    }

    /// Chain provider returning a tight two-contract chain per symbol.
    #[derive(Default)]
    struct FakeChains {
        calls: Mutex<Vec<String>>,
    }

    impl FakeChains {
        fn chain(symbol: &str) -> Vec<OptionQuote> {
            let expiration = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
            [(OptionType::Call, 95), (OptionType::Put, 105)]
                .into_iter()
                .map(|(option_type, strike)| OptionQuote {
                    symbol: symbol.to_string(),
                    option_type,
                    strike: Decimal::from(strike),
                    spot: Decimal::from(100),
                    bid: Decimal::new(500, 2),
                    ask: Decimal::new(520, 2),
                    open_interest: 800,
                    expiration,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChainProvider for FakeChains {
        async fn fetch_chain(
            &self,
            symbol: &str,
            month: u32,
            year: i32,
        ) -> Result<Vec<OptionQuote>, FetchError> {
            assert_eq!((month, year), (2, 2024));
            self.calls.lock().unwrap().push(symbol.to_string());

            if symbol.starts_with("BAD") {
                return Err(FetchError::Unavailable(format!("no chain for {}", symbol)));
            }
            if symbol.starts_with("SLOW") {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(Self::chain(symbol))
        }
    }

    #[test]
    fn test_partition_sizes() {
        let universe = tickers(250);
        let batches = partition(&universe, 100);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(batches.concat(), universe);
    }

    #[test]
    fn test_partition_edge_cases() {
        assert!(partition(&[], 100).is_empty());
        assert_eq!(partition(&tickers(3), 0).len(), 3);
        assert_eq!(partition(&tickers(100), 100).len(), 1);
    }

    #[test]
    fn test_process_batch_skips_failures() {
        let fetches: Vec<TickerFetch> = vec![
            ("AAA".to_string(), Ok(FakeChains::chain("AAA"))),
            ("BAD".to_string(), Err(FetchError::Unavailable("down".to_string()))),
        ];
        let outcome = process_batch(
            fetches,
            &NearMoneySelector::new(window()),
            &LiquidityClassifier::default(),
        );
        assert_eq!(outcome.failed, vec!["BAD".to_string()]);
        assert_eq!(outcome.summaries.len(), 1);
        assert_eq!(outcome.summaries[0].symbol, "AAA");
        assert_eq!(outcome.summaries[0].open_interest, 1600);
        assert_eq!(outcome.summaries[0].liquidity, LiquidityTier::VeryLiquid);
    }

    #[test]
    fn test_all_failed_batch_is_empty_not_error() {
        let fetches: Vec<TickerFetch> = vec![
            ("BAD1".to_string(), Err(FetchError::Unavailable("down".to_string()))),
            ("BAD2".to_string(), Err(FetchError::Unavailable("down".to_string()))),
        ];
        let outcome = process_batch(
            fetches,
            &NearMoneySelector::new(window()),
            &LiquidityClassifier::default(),
        );
        assert!(outcome.summaries.is_empty());
        assert_eq!(outcome.failed.len(), 2);
    }

    #[tokio::test]
    async fn test_each_ticker_fetched_exactly_once() {
        let provider = Arc::new(FakeChains::default());
        let orchestrator = BatchOrchestrator::new(
            provider.clone(),
            LiquidityClassifier::default(),
            BatchConfig::default(),
        );

        let universe = tickers(250);
        let result = orchestrator.run(&universe, window()).await;

        assert_eq!(result.batches, 3);
        assert_eq!(result.tickers_requested, 250);
        assert!(result.failed_tickers.is_empty());

        let mut fetched = provider.calls.lock().unwrap().clone();
        fetched.sort();
        assert_eq!(fetched, universe);

        let mut symbols: Vec<String> = result.summaries.iter().map(|s| s.symbol.clone()).collect();
        symbols.sort();
        assert_eq!(symbols, universe);
    }

    #[tokio::test]
    async fn test_failed_tickers_omitted() {
        let provider = Arc::new(FakeChains::default());
        let orchestrator = BatchOrchestrator::new(
            provider,
            LiquidityClassifier::default(),
            BatchConfig {
                batch_size: 2,
                ..Default::default()
            },
        );

        let universe: Vec<String> = ["AAA", "BAD1", "BBB", "BAD2", "CCC"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = orchestrator.run(&universe, window()).await;

        let mut symbols: Vec<&str> = result.summaries.iter().map(|s| s.symbol.as_str()).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["AAA", "BBB", "CCC"]);

        let mut failed = result.failed_tickers.clone();
        failed.sort();
        assert_eq!(failed, vec!["BAD1".to_string(), "BAD2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_ticker_failure() {
        let provider = Arc::new(FakeChains::default());
        let orchestrator = BatchOrchestrator::new(
            provider,
            LiquidityClassifier::default(),
            BatchConfig {
                batch_size: 10,
                max_concurrent_batches: 1,
                fetch_timeout_secs: 5,
            },
        );

        let universe = vec!["AAA".to_string(), "SLOW".to_string()];
        let result = orchestrator.run(&universe, window()).await;

        assert_eq!(result.failed_tickers, vec!["SLOW".to_string()]);
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].symbol, "AAA");
    }

    #[tokio::test]
    async fn test_empty_universe() {
        let orchestrator = BatchOrchestrator::new(
            Arc::new(FakeChains::default()),
            LiquidityClassifier::default(),
            BatchConfig::default(),
        );
        let result = orchestrator.run(&[], window()).await;
        assert_eq!(result.batches, 0);
        assert!(result.summaries.is_empty());
        assert_eq!(orchestrator.batch_count(&tickers(250)), 3);
    }
}
