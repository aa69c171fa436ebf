//! Configuration
//!
//! Built once at startup from, in increasing precedence: defaults, an
//! optional TOML file, `.env` and the process environment. The resulting
//! [`Config`] is passed down explicitly; nothing else reads the environment.

use crate::error::{ConsultantError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::client::universe::WIKIPEDIA_SP500_URL;

pub const DATAHUB_SP500_URL: &str =
    "https://datahub.io/core/s-and-p-500-companies/r/constituents.csv";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Log every filter comparison
    #[serde(default)]
    pub debug_mode: bool,
}

/// Which hosted model answers the consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(alias = "gpt")]
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAI => "openai",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConsultantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "gpt" => Ok(Self::OpenAI),
            other => Err(ConsultantError::Config(format!("Unknown LLM provider: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Force a provider; otherwise picked from whichever key is present
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    /// Language the report is written in
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_temperature() -> f64 {
    0.2
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_attempts() -> u32 {
    3
}
fn default_language() -> String {
    "Russian".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            gemini_api_key: None,
            openai_api_key: None,
            model: None,
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
            max_attempts: default_attempts(),
            language: default_language(),
        }
    }
}

impl LlmConfig {
    /// Resolve the provider and its credential.
    ///
    /// Gemini wins when both keys are set and no provider is forced.
    pub fn credentials(&self) -> Result<(ProviderKind, String)> {
        let gemini = non_empty(self.gemini_api_key.as_deref());
        let openai = non_empty(self.openai_api_key.as_deref());

        match (self.provider, gemini, openai) {
            (Some(ProviderKind::Gemini), Some(key), _) => Ok((ProviderKind::Gemini, key)),
            (Some(ProviderKind::Gemini), None, _) => Err(ConsultantError::Config(
                "GEMINI_API_KEY is required but missing".to_string(),
            )),
            (Some(ProviderKind::OpenAI), _, Some(key)) => Ok((ProviderKind::OpenAI, key)),
            (Some(ProviderKind::OpenAI), _, None) => Err(ConsultantError::Config(
                "OPENAI_API_KEY is required but missing".to_string(),
            )),
            (None, Some(key), _) => Ok((ProviderKind::Gemini, key)),
            (None, None, Some(key)) => Ok((ProviderKind::OpenAI, key)),
            (None, None, None) => Err(ConsultantError::Config(
                "GEMINI_API_KEY or OPENAI_API_KEY is required but missing".to_string(),
            )),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub notify_success: bool,
    #[serde(default = "default_true")]
    pub notify_errors: bool,
}

fn default_true() -> bool {
    true
}

/// Fundamental filter thresholds and screening limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    #[serde(default = "default_price_min")]
    pub price_min: Decimal,
    #[serde(default = "default_price_max")]
    pub price_max: Decimal,
    #[serde(default = "default_pe_max")]
    pub pe_max: Decimal,
    #[serde(default = "default_pb_max")]
    pub pb_max: Decimal,
    #[serde(default = "default_current_ratio_min")]
    pub current_ratio_min: Decimal,
    #[serde(default = "default_debt_to_assets_max")]
    pub debt_to_assets_max: Decimal,
    /// Concurrent fundamentals requests
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Attempts per symbol before it is skipped
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    /// Explicit universe; when empty the universe URLs are used
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_universe_urls")]
    pub universe_urls: Vec<String>,
}

fn default_price_min() -> Decimal {
    dec!(10)
}
fn default_price_max() -> Decimal {
    dec!(100)
}
fn default_pe_max() -> Decimal {
    dec!(15)
}
fn default_pb_max() -> Decimal {
    dec!(2)
}
fn default_current_ratio_min() -> Decimal {
    dec!(1.5)
}
fn default_debt_to_assets_max() -> Decimal {
    dec!(1.0)
}
fn default_max_workers() -> usize {
    8
}
fn default_universe_urls() -> Vec<String> {
    vec![WIKIPEDIA_SP500_URL.to_string(), DATAHUB_SP500_URL.to_string()]
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            price_min: default_price_min(),
            price_max: default_price_max(),
            pe_max: default_pe_max(),
            pb_max: default_pb_max(),
            current_ratio_min: default_current_ratio_min(),
            debt_to_assets_max: default_debt_to_assets_max(),
            max_workers: default_max_workers(),
            max_attempts: default_attempts(),
            symbols: Vec::new(),
            universe_urls: default_universe_urls(),
        }
    }
}

/// Market data endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_yahoo_url")]
    pub yahoo_url: String,
    /// Visited once to obtain the session cookie the crumb is bound to
    #[serde(default = "default_yahoo_cookie_url")]
    pub yahoo_cookie_url: String,
    #[serde(default = "default_tradingview_url")]
    pub tradingview_url: String,
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_yahoo_url() -> String {
    "https://query2.finance.yahoo.com".to_string()
}
fn default_yahoo_cookie_url() -> String {
    "https://fc.yahoo.com".to_string()
}
fn default_tradingview_url() -> String {
    "https://scanner.tradingview.com/america/scan".to_string()
}
fn default_exchanges() -> Vec<String> {
    vec!["NASDAQ".to_string(), "NYSE".to_string(), "AMEX".to_string()]
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            yahoo_url: default_yahoo_url(),
            yahoo_cookie_url: default_yahoo_cookie_url(),
            tradingview_url: default_tradingview_url(),
            exchanges: default_exchanges(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

fn default_history_path() -> String {
    "history.json".to_string()
}
fn default_reports_dir() -> String {
    "reports".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl StorageConfig {
    pub fn history_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.history_path).into_owned())
    }

    pub fn reports_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.reports_dir).into_owned())
    }
}

/// Daily slot used when running without `--once`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `HH:MM`, UTC
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
}

fn default_daily_at() -> String {
    "09:00".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
        }
    }
}

impl ScheduleConfig {
    pub fn time_of_day(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M").map_err(|e| {
            ConsultantError::Config(format!("Invalid schedule.daily_at '{}': {}", self.daily_at, e))
        })
    }

    /// First slot strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let at = self.time_of_day()?;
        let today = now.date_naive().and_time(at).and_utc();
        if today > now {
            Ok(today)
        } else {
            Ok(today + chrono::Duration::days(1))
        }
    }
}

impl Config {
    /// Load configuration for the process.
    pub fn load(path: &str) -> Result<Self> {
        // .env never overrides variables already exported
        dotenvy::dotenv().ok();

        let mut config: Config = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .build()?
            .try_deserialize()?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables through `lookup`. An unparseable
    /// value is a configuration error.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.llm.gemini_api_key = Some(key);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(provider) = lookup("LLM_PROVIDER").filter(|p| !p.trim().is_empty()) {
            self.llm.provider = Some(provider.parse()?);
        }
        if let Some(model) = lookup("LLM_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.model = Some(model);
        }

        let token = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty());
        let chat_id = lookup("CHAT_ID")
            .or_else(|| lookup("TELEGRAM_CHAT_ID"))
            .filter(|c| !c.trim().is_empty());
        if let Some(tg) = self.telegram.as_mut() {
            if let Some(token) = token {
                tg.bot_token = token;
            }
            if let Some(chat_id) = chat_id {
                tg.chat_id = chat_id;
            }
        } else if let (Some(bot_token), Some(chat_id)) = (token, chat_id) {
            self.telegram = Some(TelegramConfig {
                bot_token,
                chat_id,
                notify_success: true,
                notify_errors: true,
            });
        }

        if let Some(flag) = lookup("DEBUG_MODE") {
            self.debug_mode = is_truthy(&flag);
        }
        if let Some(path) = lookup("HISTORY_PATH") {
            self.storage.history_path = path;
        }
        if let Some(dir) = lookup("REPORTS_DIR") {
            self.storage.reports_dir = dir;
        }
        Ok(())
    }

    /// Fail fast on anything that would only surface mid-run
    pub fn validate(&self) -> Result<()> {
        self.llm.credentials()?;
        self.schedule.time_of_day()?;

        let s = &self.screening;
        if s.price_min > s.price_max {
            return Err(ConsultantError::Config(format!(
                "price_min {} exceeds price_max {}",
                s.price_min, s.price_max
            )));
        }
        if s.max_workers == 0 {
            return Err(ConsultantError::Config("max_workers must be greater than 0".to_string()));
        }
        if s.max_attempts == 0 || self.llm.max_attempts == 0 {
            return Err(ConsultantError::Config("max_attempts must be greater than 0".to_string()));
        }
        if s.symbols.is_empty() && s.universe_urls.is_empty() {
            return Err(ConsultantError::Config(
                "either screening.symbols or screening.universe_urls must be set".to_string(),
            ));
        }
        if let Some(tg) = &self.telegram {
            if tg.bot_token.trim().is_empty() || tg.chat_id.trim().is_empty() {
                return Err(ConsultantError::Config(
                    "telegram requires both bot_token and chat_id".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
