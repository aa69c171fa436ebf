//! Hosted LLM backends (Gemini, OpenAI-compatible)

use super::{build_prompt, ConsultationModel};
use crate::config::{LlmConfig, ProviderKind};
use crate::error::{ConsultantError, Result};
use crate::types::{Consultation, ConsultationRequest};
use crate::utils::{truncate_chars, with_timeout, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_FALLBACK_MODEL: &str = "gemini-pro";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// `model: None` means discover one from the model list
    Gemini {
        api_key: String,
        model: Option<String>,
        base_url: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl LlmProvider {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let (kind, api_key) = config.credentials()?;
        let base_url = config.base_url.as_deref().map(|u| u.trim_end_matches('/').to_string());

        Ok(match kind {
            ProviderKind::Gemini => Self::Gemini {
                api_key,
                model: config.model.clone(),
                base_url: base_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            },
            ProviderKind::OpenAI => Self::OpenAI {
                api_key,
                model: config.model.clone().unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
                base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            },
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Gemini { .. } => ProviderKind::Gemini,
            Self::OpenAI { .. } => ProviderKind::OpenAI,
        }
    }
}

pub struct LlmModel {
    http: Client,
    provider: LlmProvider,
    temperature: f64,
    language: String,
    timeout: Duration,
    retry: RetryPolicy,
    gemini_model: OnceCell<String>,
}

impl LlmModel {
    pub fn new(provider: LlmProvider, config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            provider,
            temperature: config.temperature,
            language: config.language.clone(),
            timeout,
            retry: RetryPolicy::new(config.max_attempts),
            gemini_model: OnceCell::new(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(LlmProvider::from_config(config)?, config)
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Configured Gemini model, else the first one listed as supporting
    /// `generateContent`, else `gemini-pro`. Resolved once per process.
    async fn resolve_gemini_model(&self, api_key: &str, base_url: &str, configured: Option<&str>) -> String {
        if let Some(model) = configured.filter(|m| !m.trim().is_empty()) {
            return strip_models_prefix(model).to_string();
        }

        self.gemini_model
            .get_or_init(|| async {
                let listed = self
                    .http
                    .get(format!("{}/v1beta/models", base_url))
                    .header("x-goog-api-key", api_key)
                    .send()
                    .await;

                let picked = match listed {
                    Ok(resp) if resp.status().is_success() => {
                        resp.json::<Value>().await.ok().as_ref().and_then(pick_gemini_model)
                    }
                    Ok(resp) => {
                        warn!("Could not list Gemini models: HTTP {}", resp.status());
                        None
                    }
                    Err(e) => {
                        warn!("Could not list Gemini models: {}", e);
                        None
                    }
                };

                match picked {
                    Some(model) => {
                        info!("Found available Gemini model: {}", model);
                        model
                    }
                    None => GEMINI_FALLBACK_MODEL.to_string(),
                }
            })
            .await
            .clone()
    }

    async fn call_gemini(&self, api_key: &str, base_url: &str, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": self.temperature},
        });

        let req = self
            .http
            .post(format!("{}/v1beta/models/{}:generateContent", base_url, model))
            .header("x-goog-api-key", api_key)
            .json(&body);

        let resp = send_json("Gemini", req).await?;
        parse_gemini_text(&resp)
            .ok_or_else(|| ConsultantError::collaborator("Gemini", "response did not contain text output"))
    }

    async fn call_openai(&self, api_key: &str, base_url: &str, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        });

        let req = self
            .http
            .post(format!("{}/v1/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body);

        let resp = send_json("OpenAI", req).await?;
        parse_openai_text(&resp).ok_or_else(|| ConsultantError::collaborator("OpenAI", "Empty LLM response"))
    }
}

#[async_trait]
impl ConsultationModel for LlmModel {
    async fn consult(&self, request: &ConsultationRequest) -> Result<Consultation> {
        let prompt = build_prompt(request, &self.language)?;

        let (model, text) = match &self.provider {
            LlmProvider::Gemini {
                api_key,
                model,
                base_url,
            } => {
                let model = self.resolve_gemini_model(api_key, base_url, model.as_deref()).await;
                info!("Requesting report from Gemini ({})...", model);
                let text = self
                    .retry
                    .execute("Gemini generateContent", || {
                        with_timeout("Gemini", self.timeout, self.call_gemini(api_key, base_url, &model, &prompt))
                    })
                    .await?;
                (model, text)
            }
            LlmProvider::OpenAI {
                api_key,
                model,
                base_url,
            } => {
                info!("Requesting report from OpenAI ({})...", model);
                let text = self
                    .retry
                    .execute("OpenAI chat completion", || {
                        with_timeout("OpenAI", self.timeout, self.call_openai(api_key, base_url, model, &prompt))
                    })
                    .await?;
                (model.clone(), text)
            }
        };

        Ok(Consultation {
            provider: self.provider.kind().as_str().to_string(),
            model,
            text,
        })
    }

    fn name(&self) -> &str {
        self.provider.kind().as_str()
    }
}

/// Send and decode a JSON response. Rate limits and server errors stay
/// retryable; other rejections become a `Collaborator` error.
async fn send_json(service: &str, req: RequestBuilder) -> Result<Value> {
    let resp = req.send().await?;
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(resp.error_for_status().err().map_or_else(
            || ConsultantError::collaborator(service, format!("HTTP {}", status)),
            ConsultantError::Http,
        ));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ConsultantError::collaborator(
            service,
            format!("HTTP {}: {}", status, truncate_chars(body.trim(), 300)),
        ));
    }

    Ok(resp.json().await?)
}

fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

/// First model in a Gemini model list that supports `generateContent`
pub fn pick_gemini_model(list: &Value) -> Option<String> {
    list.get("models")?.as_array()?.iter().find_map(|m| {
        let supported = m
            .get("supportedGenerationMethods")?
            .as_array()?
            .iter()
            .any(|method| method.as_str() == Some("generateContent"));
        if !supported {
            return None;
        }
        m.get("name")?.as_str().map(|n| strip_models_prefix(n).to_string())
    })
}

/// Concatenated text parts of the first candidate; `None` when empty
pub fn parse_gemini_text(resp: &Value) -> Option<String> {
    let parts = resp.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text).filter(|t| !t.trim().is_empty())
}

pub fn parse_openai_text(resp: &Value) -> Option<String> {
    resp.pointer("/choices/0/message/content")?
        .as_str()
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}
