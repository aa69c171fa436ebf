//! Market data clients
//!
//! - `YahooClient`: universe download, fundamentals (quoteSummary) and the
//!   S&P 500 backdrop (chart)
//! - `TradingViewClient`: technical ratings from the TradingView scanner
//! - `universe`: constituent list parsing (Wikipedia table or CSV)

pub mod tradingview;
pub mod universe;
pub mod yahoo;

pub use tradingview::TradingViewClient;
pub use yahoo::YahooClient;

use crate::error::Result;
use crate::types::{MarketContext, StockSnapshot, Technicals};
use async_trait::async_trait;

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; TradingConsultant/1.0; +https://github.com/ranaroussi/yfinance)";

/// Source of instruments, fundamentals and market backdrop
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Ticker list from a universe URL (HTML table or CSV), in source order
    async fn universe(&self, source_url: &str) -> Result<Vec<String>>;

    /// Fundamentals for one symbol; `None` when the source knows nothing about it
    async fn fundamentals(&self, symbol: &str) -> Result<Option<StockSnapshot>>;

    /// S&P 500 five-day change
    async fn market_context(&self) -> Result<MarketContext>;
}

/// Source of technical indicators
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TechnicalsSource: Send + Sync {
    /// `None` when no exchange lists the symbol
    async fn technicals(&self, symbol: &str) -> Result<Option<Technicals>>;
}
