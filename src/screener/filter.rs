//! Fundamental filter
//!
//! A stock passes when every metric is present and inside its band:
//! price in [min, max], 0 < P/E <= max, 0 < P/B <= max,
//! current ratio >= min, debt/assets <= max.

use crate::config::ScreeningConfig;
use crate::types::{FundamentalMetrics, MetricCheck};
use rust_decimal::Decimal;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FundamentalFilter {
    price_min: Decimal,
    price_max: Decimal,
    pe_max: Decimal,
    pb_max: Decimal,
    current_ratio_min: Decimal,
    debt_to_assets_max: Decimal,
    debug: bool,
}

impl FundamentalFilter {
    pub fn new(config: &ScreeningConfig, debug: bool) -> Self {
        Self {
            price_min: config.price_min,
            price_max: config.price_max,
            pe_max: config.pe_max,
            pb_max: config.pb_max,
            current_ratio_min: config.current_ratio_min,
            debt_to_assets_max: config.debt_to_assets_max,
            debug,
        }
    }

    /// Evaluate every check. The verdict is the conjunction of all of them.
    pub fn evaluate(&self, ticker: &str, m: &FundamentalMetrics) -> (Vec<MetricCheck>, bool) {
        let in_band = |v: Option<Decimal>, lo: Decimal, hi: Decimal| v.is_some_and(|v| v >= lo && v <= hi);
        let positive_upto = |v: Option<Decimal>, hi: Decimal| v.is_some_and(|v| v > Decimal::ZERO && v <= hi);

        let checks = vec![
            check(
                "price",
                m.price,
                format!("{}-{}", self.price_min, self.price_max),
                in_band(m.price, self.price_min, self.price_max),
            ),
            check(
                "P/E",
                m.trailing_pe,
                format!("0-{}", self.pe_max),
                positive_upto(m.trailing_pe, self.pe_max),
            ),
            check(
                "P/B",
                m.price_to_book,
                format!("0-{}", self.pb_max),
                positive_upto(m.price_to_book, self.pb_max),
            ),
            check(
                "Current ratio",
                m.current_ratio,
                format!(">= {}", self.current_ratio_min),
                m.current_ratio.is_some_and(|v| v >= self.current_ratio_min),
            ),
            check(
                "Debt/Assets",
                m.debt_to_assets,
                format!("<= {}", self.debt_to_assets_max),
                m.debt_to_assets.is_some_and(|v| v <= self.debt_to_assets_max),
            ),
        ];

        if self.debug {
            log_checks(ticker, &checks);
        }

        let passed = checks.iter().all(|c| c.passed);
        (checks, passed)
    }
}

fn check(metric: &str, value: Option<Decimal>, target: String, passed: bool) -> MetricCheck {
    MetricCheck {
        metric: metric.to_string(),
        value,
        target,
        passed,
    }
}

fn log_checks(ticker: &str, checks: &[MetricCheck]) {
    info!("{} fundamentals snapshot:", ticker);
    for c in checks {
        let value = c.value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string());
        info!(
            "    {:<14} = {:<15} | target {:<10} -> {}",
            c.metric,
            value,
            c.target,
            if c.passed { "OK" } else { "FAIL" }
        );
    }
}
