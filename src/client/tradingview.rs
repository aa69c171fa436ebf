//! TradingView scanner client for daily technical ratings

use super::{TechnicalsSource, USER_AGENT};
use crate::config::DataConfig;
use crate::error::Result;
use crate::types::Technicals;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;

/// Scanner columns, in response order
const COLUMNS: [&str; 7] = [
    "Recommend.All",
    "Recommend.Other",
    "Recommend.MA",
    "RSI",
    "EMA20",
    "EMA50",
    "MACD.macd",
];

pub struct TradingViewClient {
    http: Client,
    scan_url: String,
    exchanges: Vec<String>,
}

impl TradingViewClient {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            scan_url: config.tradingview_url.clone(),
            exchanges: config.exchanges.clone(),
        })
    }

    async fn scan(&self, ticker: &str) -> Result<Option<Technicals>> {
        let body = json!({
            "symbols": {"tickers": [ticker], "query": {"types": []}},
            "columns": COLUMNS,
        });

        let resp: Value = self
            .http
            .post(&self.scan_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_scan_response(&resp))
    }
}

#[async_trait]
impl TechnicalsSource for TradingViewClient {
    async fn technicals(&self, symbol: &str) -> Result<Option<Technicals>> {
        // Yahoo share classes use '-', TradingView uses '.'
        let symbol = symbol.replace('-', ".");
        let mut last_err = None;

        for exchange in &self.exchanges {
            let ticker = format!("{}:{}", exchange, symbol);
            match self.scan(&ticker).await {
                Ok(Some(t)) => return Ok(Some(t)),
                Ok(None) => debug!("{} not listed on TradingView", ticker),
                Err(e) => {
                    debug!("TradingView scan for {} failed: {}", ticker, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Label for a TradingView recommendation score in [-1, 1]
pub fn recommendation(score: f64) -> Option<&'static str> {
    if !(-1.0..=1.0).contains(&score) {
        return None;
    }
    Some(if score < -0.5 {
        "STRONG_SELL"
    } else if score < -0.1 {
        "SELL"
    } else if score <= 0.1 {
        "NEUTRAL"
    } else if score <= 0.5 {
        "BUY"
    } else {
        "STRONG_BUY"
    })
}

/// First row of a scanner response, `None` when the ticker is unknown
pub fn parse_scan_response(resp: &Value) -> Option<Technicals> {
    let row = resp.pointer("/data/0/d")?.as_array()?;
    let num = |i: usize| row.get(i).and_then(Value::as_f64);
    let dec = |i: usize| num(i).and_then(|n| Decimal::try_from(n).ok()).map(|d| d.round_dp(2));
    let label = |i: usize| num(i).and_then(recommendation).map(str::to_string);

    Some(Technicals {
        rating: label(0),
        oscillators: label(1),
        moving_averages: label(2),
        rsi: dec(3),
        ema20: dec(4),
        ema50: dec(5),
        macd: dec(6),
    })
}
