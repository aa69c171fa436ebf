//! Consultation models
//!
//! A model turns the screener output and market backdrop into a Markdown
//! report written by a hosted LLM.

mod llm;
mod prompt;
#[cfg(test)]
mod tests;

pub use llm::{parse_gemini_text, parse_openai_text, pick_gemini_model, LlmModel, LlmProvider};
pub use prompt::build_prompt;

use crate::error::Result;
use crate::types::{Consultation, ConsultationRequest};
use async_trait::async_trait;

/// Trait for report-writing models
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsultationModel: Send + Sync {
    /// Produce the consultation text for one run
    async fn consult(&self, request: &ConsultationRequest) -> Result<Consultation>;

    /// Model name for logging
    fn name(&self) -> &str;
}
