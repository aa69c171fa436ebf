//! Trading Consultant
//!
//! A scheduled stock screener that asks an LLM for a written consultation
//! on the day's candidates.
//!
//! ## Architecture
//!
//! ```text
//! Yahoo (universe, fundamentals) → Screener → TradingView (technicals)
//!                                      ↓
//!          History (diff) → Consultation (Gemini / OpenAI) → Report + History
//!                                                                  ↓
//!                                                               Notifier
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod reports;
pub mod screener;
pub mod types;
pub mod utils;

#[cfg(test)]
mod config_tests;
