//! One analysis pass
//!
//! screen → technicals → diff against the previous run → market context →
//! consultation → report + history record → notification.
//!
//! Nothing is persisted until the consultation succeeds. The report is
//! written first and removed again if the history record cannot be saved,
//! so a failed pass leaves neither behind.


use crate::client::{MarketData, TechnicalsSource};
use crate::config::Config;
use crate::error::{ConsultantError, Result};
use crate::history::HistoryStore;
use crate::model::ConsultationModel;
use crate::notify::Notifier;
use crate::reports::ReportSink;
use crate::screener::{enrich_with_technicals, Screener};
use crate::types::{diff_symbols, Consultation, ConsultationRequest, MarketContext, RunRecord};
use crate::utils::RetryPolicy;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const RUN_ID_FORMAT: &str = "%Y-%m-%d";

pub struct Pipeline {
    config: Config,
    market: Arc<dyn MarketData>,
    technicals: Arc<dyn TechnicalsSource>,
    model: Arc<dyn ConsultationModel>,
    notifier: Notifier,
    fetch_retry: Option<RetryPolicy>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        market: Arc<dyn MarketData>,
        technicals: Arc<dyn TechnicalsSource>,
        model: Arc<dyn ConsultationModel>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            market,
            technicals,
            model,
            notifier,
            fetch_retry: None,
        }
    }

    /// Override the per-symbol fundamentals retry policy
    pub fn with_fetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.fetch_retry = Some(retry);
        self
    }

    pub fn run_id_for(now: DateTime<Utc>) -> String {
        now.format(RUN_ID_FORMAT).to_string()
    }

    /// Run one pass for the day of `now`, returning the saved record
    pub async fn run_cycle(&self, limit: Option<usize>, now: DateTime<Utc>) -> Result<RunRecord> {
        let run_id = Self::run_id_for(now);
        info!("=== Stock analysis cycle {} ===", run_id);

        match self.execute(&run_id, limit, now).await {
            Ok(record) => {
                if self.notify_success() {
                    if let Err(e) = self.notifier.run_completed(&record).await {
                        warn!("Failed to send Telegram summary: {}", e);
                    }
                }
                Ok(record)
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                if self.notify_errors() {
                    if let Err(notify_err) = self.notifier.run_failed(&run_id, &e).await {
                        warn!("Failed to send Telegram failure notice: {}", notify_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: &str, limit: Option<usize>, now: DateTime<Utc>) -> Result<RunRecord> {
        let mut store = HistoryStore::open(self.config.storage.history_path())?;
        let reports = ReportSink::new(self.config.storage.reports_dir());

        if store.contains(run_id) {
            return Err(ConsultantError::DuplicateRun(run_id.to_string()));
        }
        if reports.exists(run_id) {
            return Err(ConsultantError::ReportConflict {
                run_id: run_id.to_string(),
                path: reports.path_for(run_id),
            });
        }

        let mut screener = Screener::new(
            self.market.clone(),
            self.config.screening.clone(),
            self.config.debug_mode,
        );
        if let Some(retry) = &self.fetch_retry {
            screener = screener.with_retry(retry.clone());
        }

        let mut outcomes = screener.screen(limit).await?;
        let passed = outcomes.iter().filter(|o| o.passed).count();
        info!("Fundamental screener produced {} symbols", passed);
        if passed == 0 {
            return Err(ConsultantError::NoCandidates(format!(
                "none of {} screened tickers passed the fundamental filters",
                outcomes.len()
            )));
        }

        enrich_with_technicals(self.technicals.as_ref(), &mut outcomes, self.config.screening.max_workers).await;

        let current: Vec<String> = outcomes.iter().filter(|o| o.passed).map(|o| o.ticker.clone()).collect();
        let previous = store.latest().map(RunRecord::candidates).unwrap_or_default();
        let (new_symbols, dropped_symbols) = diff_symbols(&previous, &current);
        info!("New: {:?}, dropped: {:?}", new_symbols, dropped_symbols);

        let market_context = match self.market.market_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Market context unavailable: {}", e);
                MarketContext::unavailable(now)
            }
        };

        let request = ConsultationRequest {
            market_context,
            screened_stocks: outcomes.iter().filter(|o| o.passed).cloned().collect(),
            new_symbols,
            dropped_symbols,
        };
        let consultation = self.model.consult(&request).await?;
        info!(
            "Consultation received from {} ({} chars)",
            consultation.model,
            consultation.text.chars().count()
        );

        let report_path = reports.write(run_id, &consultation.text)?;
        info!("Report saved to {}", report_path.display());

        let record = RunRecord {
            run_id: run_id.to_string(),
            inputs: self.inputs(limit, outcomes.len(), &consultation),
            filter_results: outcomes,
            new_symbols: request.new_symbols,
            dropped_symbols: request.dropped_symbols,
            market_context: request.market_context,
            consultation_output: consultation,
            report_file: ReportSink::file_name(run_id),
            timestamp: now,
        };

        let committed = store.append(record.clone()).and_then(|_| store.save());
        if let Err(e) = committed {
            if let Err(discard_err) = reports.discard(run_id) {
                error!("Failed to remove report for {}: {}", run_id, discard_err);
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Flat parameter map stored with the record
    fn inputs(
        &self,
        limit: Option<usize>,
        screened: usize,
        consultation: &Consultation,
    ) -> BTreeMap<String, serde_json::Value> {
        let s = &self.config.screening;
        BTreeMap::from([
            ("limit".to_string(), json!(limit)),
            ("screened".to_string(), json!(screened)),
            ("debug_mode".to_string(), json!(self.config.debug_mode)),
            ("price_min".to_string(), json!(s.price_min)),
            ("price_max".to_string(), json!(s.price_max)),
            ("pe_max".to_string(), json!(s.pe_max)),
            ("pb_max".to_string(), json!(s.pb_max)),
            ("current_ratio_min".to_string(), json!(s.current_ratio_min)),
            ("debt_to_assets_max".to_string(), json!(s.debt_to_assets_max)),
            ("provider".to_string(), json!(consultation.provider)),
            ("model".to_string(), json!(consultation.model)),
        ])
    }

    fn notify_success(&self) -> bool {
        self.config.telegram.as_ref().is_some_and(|t| t.notify_success)
    }

    fn notify_errors(&self) -> bool {
        self.config.telegram.as_ref().is_some_and(|t| t.notify_errors)
    }
}
