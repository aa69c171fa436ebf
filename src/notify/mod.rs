//! Telegram notifications
//!
//! Best effort: callers log a failed send and carry on.

use crate::error::{ConsultantError, Result};
use crate::types::RunRecord;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Telegram's limit for one message
pub const MAX_MESSAGE_CHARS: usize = 4096;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Longest named or numeric entity we expect in escaped text (`&#128200;`)
const MAX_ENTITY_CHARS: usize = 10;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Clone)]
pub struct Notifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    enabled: bool,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self::with_base_url(TELEGRAM_API_URL, bot_token, chat_id)
    }

    /// Notifier against another Bot API host (local bot server, tests)
    pub fn with_base_url(base_url: impl Into<String>, bot_token: String, chat_id: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            enabled: true,
        }
    }

    /// A notifier that drops every message
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            base_url: TELEGRAM_API_URL.to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send an HTML message, split into chunks Telegram accepts
    pub async fn send(&self, text: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let request = SendMessageRequest {
                chat_id: &self.chat_id,
                text: &chunk,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            };

            let resp = self.http.post(&url).json(&request).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(ConsultantError::collaborator(
                    "Telegram",
                    format!("sendMessage returned {}: {}", status, body.trim()),
                ));
            }
        }

        tracing::debug!("Telegram notification sent");
        Ok(())
    }

    pub async fn run_completed(&self, record: &RunRecord) -> Result<()> {
        self.send(&completed_message(record)).await
    }

    pub async fn run_failed(&self, run_id: &str, error: &ConsultantError) -> Result<()> {
        self.send(&failed_message(run_id, error)).await
    }
}

pub fn completed_message(record: &RunRecord) -> String {
    let list = |symbols: &[String]| {
        if symbols.is_empty() {
            "none".to_string()
        } else {
            escape_html(&symbols.join(", "))
        }
    };

    let change = record
        .market_context
        .change_pct_5d
        .map(|c| format!("{:+}%", c))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "📈 <b>Stock consultation {}</b>\n\n\
         Candidates: {}\n\
         New: {}\n\
         Dropped: {}\n\
         S&amp;P 500 (5d): {}\n\
         Model: {}\n\
         Report: <code>{}</code>",
        escape_html(&record.run_id),
        record.candidates().len(),
        list(&record.new_symbols),
        list(&record.dropped_symbols),
        change,
        escape_html(&record.consultation_output.model),
        escape_html(&record.report_file),
    )
}

pub fn failed_message(run_id: &str, error: &ConsultantError) -> String {
    format!(
        "🚨 <b>Stock consultation {} failed</b>\n\n<code>{}</code>",
        escape_html(run_id),
        escape_html(&error.to_string())
    )
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Split on line boundaries where possible. A single over-long line is cut
/// at the char limit, moved back so no tag or entity is broken in two.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            let mut rest: Vec<char> = line.chars().collect();
            while rest.len() > max_chars {
                let cut = markup_safe_cut(&rest[..max_chars]);
                chunks.push(rest.drain(..cut).collect());
            }
            current_len = rest.len();
            current = rest.into_iter().collect();
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Largest prefix of `window` that does not end inside `<...>` or `&...;`.
/// Falls back to the whole window when the markup starts at its first char.
fn markup_safe_cut(window: &[char]) -> usize {
    let last = |c: char| window.iter().rposition(|&x| x == c);
    let mut cut = window.len();

    if let Some(open) = last('<') {
        if last('>').map_or(true, |close| close < open) {
            cut = cut.min(open);
        }
    }
    if let Some(amp) = last('&') {
        let unterminated = last(';').map_or(true, |semi| semi < amp);
        if unterminated && window.len() - amp < MAX_ENTITY_CHARS {
            cut = cut.min(amp);
        }
    }

    if cut == 0 {
        window.len()
    } else {
        cut
    }
}
