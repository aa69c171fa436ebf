//! Fundamental screener
//!
//! Loads the instrument universe, fetches fundamentals with bounded
//! concurrency and runs every instrument through [`FundamentalFilter`].

mod filter;

pub use filter::FundamentalFilter;

use crate::client::{MarketData, TechnicalsSource};
use crate::config::ScreeningConfig;
use crate::error::{ConsultantError, Result};
use crate::types::FilterOutcome;
use crate::utils::RetryPolicy;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Screener {
    market: Arc<dyn MarketData>,
    config: ScreeningConfig,
    filter: FundamentalFilter,
    retry: RetryPolicy,
}

impl Screener {
    pub fn new(market: Arc<dyn MarketData>, config: ScreeningConfig, debug: bool) -> Self {
        let filter = FundamentalFilter::new(&config, debug);
        let retry = RetryPolicy::new(config.max_attempts);
        Self {
            market,
            config,
            filter,
            retry,
        }
    }

    /// Override the per-symbol retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Screen the universe, capped at `limit` instruments.
    ///
    /// Passing instruments come first, by price descending, followed by the
    /// rejected ones in universe order. When a limited run finds nothing,
    /// the full universe is screened once more.
    pub async fn screen(&self, limit: Option<usize>) -> Result<Vec<FilterOutcome>> {
        let universe = self.load_universe().await?;
        info!("Universe contains {} tickers", universe.len());

        let capped = match limit {
            Some(n) if n > 0 && n < universe.len() => &universe[..n],
            _ => &universe[..],
        };

        let mut outcomes = self.evaluate_all(capped).await;
        let passed = outcomes.iter().filter(|o| o.passed).count();

        if passed == 0 && capped.len() < universe.len() {
            warn!(
                "No matches inside the first {} tickers, retrying the full universe",
                capped.len()
            );
            outcomes = self.evaluate_all(&universe).await;
        }

        order_outcomes(&mut outcomes);
        info!(
            "Screened {} tickers, {} passed",
            outcomes.len(),
            outcomes.iter().filter(|o| o.passed).count()
        );
        Ok(outcomes)
    }

    /// Configured symbols, or the first universe URL that yields tickers
    pub async fn load_universe(&self) -> Result<Vec<String>> {
        if !self.config.symbols.is_empty() {
            return Ok(dedup(
                self.config
                    .symbols
                    .iter()
                    .map(|s| s.trim().to_uppercase().replace('.', "-"))
                    .filter(|s| !s.is_empty()),
            ));
        }

        for url in &self.config.universe_urls {
            match self.market.universe(url).await {
                Ok(tickers) if !tickers.is_empty() => return Ok(dedup(tickers.into_iter())),
                Ok(_) => warn!("Universe source {} returned no tickers", url),
                Err(e) => warn!("Universe source {} failed: {}", url, e),
            }
        }

        Err(ConsultantError::collaborator(
            "Universe",
            "failed to load S&P 500 tickers from every source",
        ))
    }

    async fn evaluate_all(&self, symbols: &[String]) -> Vec<FilterOutcome> {
        let workers = self.config.max_workers.max(1);

        let mut indexed: Vec<(usize, FilterOutcome)> = stream::iter(symbols.iter().enumerate())
            .map(|(idx, symbol)| async move { self.evaluate_one(symbol).await.map(|o| (idx, o)) })
            .buffer_unordered(workers)
            .filter_map(|outcome| async move { outcome })
            .collect()
            .await;

        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn evaluate_one(&self, symbol: &str) -> Option<FilterOutcome> {
        let fetched = self
            .retry
            .execute(&format!("fundamentals {}", symbol), || self.market.fundamentals(symbol))
            .await;

        let snapshot = match fetched {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No fundamentals for {}", symbol);
                return None;
            }
            Err(e) => {
                warn!("Skipping {} due to error: {}", symbol, e);
                return None;
            }
        };

        let (checks, passed) = self.filter.evaluate(&snapshot.ticker, &snapshot.metrics);
        Some(FilterOutcome {
            ticker: snapshot.ticker,
            name: snapshot.name,
            sector: snapshot.sector,
            metrics: snapshot.metrics,
            checks,
            passed,
            technicals: None,
        })
    }
}

/// Attach technicals to passing outcomes. Lookups that fail or find
/// nothing leave `technicals` empty.
pub async fn enrich_with_technicals(source: &dyn TechnicalsSource, outcomes: &mut [FilterOutcome], max_workers: usize) {
    let wanted: Vec<(usize, String)> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.passed)
        .map(|(idx, o)| (idx, o.ticker.clone()))
        .collect();

    let fetched: Vec<(usize, Option<_>)> = stream::iter(wanted)
        .map(|(idx, ticker)| async move {
            match source.technicals(&ticker).await {
                Ok(Some(t)) => (idx, Some(t)),
                Ok(None) => {
                    warn!("TradingView has no data for {}", ticker);
                    (idx, None)
                }
                Err(e) => {
                    warn!("Technicals for {} unavailable: {}", ticker, e);
                    (idx, None)
                }
            }
        })
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await;

    for (idx, technicals) in fetched {
        outcomes[idx].technicals = technicals;
    }
}

/// Passing first by price descending (missing price last), rejected after
/// in their existing order
pub fn order_outcomes(outcomes: &mut [FilterOutcome]) {
    outcomes.sort_by(|a, b| {
        b.passed.cmp(&a.passed).then_with(|| {
            if a.passed {
                let price = |o: &FilterOutcome| o.metrics.price.unwrap_or(Decimal::MIN);
                price(b).cmp(&price(a))
            } else {
                std::cmp::Ordering::Equal
            }
        })
    });
}

fn dedup(symbols: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    symbols.filter(|s| seen.insert(s.clone())).collect()
}
