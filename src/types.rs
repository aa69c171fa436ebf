//! Core data types shared across the screener, the consultation model
//! and the persistence layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw fundamental metrics for one instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalMetrics {
    pub price: Option<Decimal>,
    pub trailing_pe: Option<Decimal>,
    pub price_to_book: Option<Decimal>,
    pub current_ratio: Option<Decimal>,
    pub debt_to_assets: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub beta: Option<Decimal>,
}

/// Fundamentals snapshot as returned by the market data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub metrics: FundamentalMetrics,
}

/// A single threshold comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCheck {
    pub metric: String,
    pub value: Option<Decimal>,
    pub target: String,
    pub passed: bool,
}

/// Technical indicators from TradingView
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Technicals {
    pub rating: Option<String>,
    pub oscillators: Option<String>,
    pub moving_averages: Option<String>,
    pub rsi: Option<Decimal>,
    pub ema20: Option<Decimal>,
    pub ema50: Option<Decimal>,
    pub macd: Option<Decimal>,
}

/// Per-instrument result of the fundamental filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub metrics: FundamentalMetrics,
    pub checks: Vec<MetricCheck>,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technicals: Option<Technicals>,
}

/// Broad market backdrop for the consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub index: String,
    pub change_pct_5d: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl MarketContext {
    pub const SP500: &'static str = "^GSPC";

    /// Context used when the index history cannot be fetched
    pub fn unavailable(timestamp: DateTime<Utc>) -> Self {
        Self {
            index: Self::SP500.to_string(),
            change_pct_5d: None,
            timestamp,
        }
    }
}

/// Everything the model needs to write a report
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationRequest {
    pub market_context: MarketContext,
    pub screened_stocks: Vec<FilterOutcome>,
    pub new_symbols: Vec<String>,
    pub dropped_symbols: Vec<String>,
}

/// LLM response for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub provider: String,
    pub model: String,
    pub text: String,
}

/// One persisted invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub filter_results: Vec<FilterOutcome>,
    #[serde(default)]
    pub new_symbols: Vec<String>,
    #[serde(default)]
    pub dropped_symbols: Vec<String>,
    pub market_context: MarketContext,
    pub consultation_output: Consultation,
    pub report_file: String,
    pub timestamp: DateTime<Utc>,
}

impl RunRecord {
    /// Tickers that passed every filter, in record order
    pub fn candidates(&self) -> Vec<String> {
        self.filter_results
            .iter()
            .filter(|o| o.passed)
            .map(|o| o.ticker.clone())
            .collect()
    }
}

/// Sorted (new, dropped) symbols between two candidate sets
pub fn diff_symbols(previous: &[String], current: &[String]) -> (Vec<String>, Vec<String>) {
    use std::collections::BTreeSet;

    let prev: BTreeSet<&String> = previous.iter().collect();
    let curr: BTreeSet<&String> = current.iter().collect();

    let new_symbols = curr.difference(&prev).map(|s| (*s).clone()).collect();
    let dropped_symbols = prev.difference(&curr).map(|s| (*s).clone()).collect();
    (new_symbols, dropped_symbols)
}
