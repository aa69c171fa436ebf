//! Tests for model module

#[cfg(test)]
mod tests {
    use super::super::llm::{parse_gemini_text, parse_openai_text, pick_gemini_model, LlmModel, LlmProvider};
    use super::super::{build_prompt, ConsultationModel};
    use crate::config::{LlmConfig, ProviderKind};
    use crate::types::{ConsultationRequest, FilterOutcome, FundamentalMetrics, MarketContext};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn config_with(gemini: Option<&str>, openai: Option<&str>) -> LlmConfig {
        LlmConfig {
            gemini_api_key: gemini.map(str::to_string),
            openai_api_key: openai.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    fn request() -> ConsultationRequest {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        ConsultationRequest {
            market_context: MarketContext {
                index: MarketContext::SP500.to_string(),
                change_pct_5d: Some(dec!(1.25)),
                timestamp: ts,
            },
            screened_stocks: vec![FilterOutcome {
                ticker: "KO".to_string(),
                name: Some("Coca-Cola".to_string()),
                sector: Some("Consumer Defensive".to_string()),
                metrics: FundamentalMetrics {
                    price: Some(dec!(58.4)),
                    ..FundamentalMetrics::default()
                },
                checks: vec![],
                passed: true,
                technicals: None,
            }],
            new_symbols: vec!["KO".to_string()],
            dropped_symbols: vec!["PFE".to_string()],
        }
    }

    #[test]
    fn test_provider_prefers_gemini() {
        let provider = LlmProvider::from_config(&config_with(Some("g-key"), Some("o-key"))).unwrap();
        match provider {
            LlmProvider::Gemini {
                api_key,
                model,
                base_url,
            } => {
                assert_eq!(api_key, "g-key");
                assert!(model.is_none());
                assert_eq!(base_url, "https://generativelanguage.googleapis.com");
            }
            _ => panic!("Expected Gemini provider"),
        }
    }

    #[test]
    fn test_provider_openai_defaults() {
        let provider = LlmProvider::from_config(&config_with(None, Some("o-key"))).unwrap();
        match provider {
            LlmProvider::OpenAI {
                api_key,
                model,
                base_url,
            } => {
                assert_eq!(api_key, "o-key");
                assert_eq!(model, "gpt-4o-mini");
                assert_eq!(base_url, "https://api.openai.com");
            }
            _ => panic!("Expected OpenAI provider"),
        }
    }

    #[test]
    fn test_provider_forced_with_overrides() {
        let config = LlmConfig {
            provider: Some(ProviderKind::OpenAI),
            model: Some("gpt-4o".to_string()),
            base_url: Some("http://localhost:8080/".to_string()),
            ..config_with(Some("g-key"), Some("o-key"))
        };
        match LlmProvider::from_config(&config).unwrap() {
            LlmProvider::OpenAI { model, base_url, .. } => {
                assert_eq!(model, "gpt-4o");
                assert_eq!(base_url, "http://localhost:8080");
            }
            _ => panic!("Expected OpenAI provider"),
        }
    }

    #[test]
    fn test_provider_missing_key() {
        assert!(LlmProvider::from_config(&config_with(None, None)).is_err());
    }

    #[test]
    fn test_model_name() {
        let model = LlmModel::from_config(&config_with(Some("g-key"), None)).unwrap();
        assert_eq!(model.name(), "gemini");
        assert_eq!(model.provider().kind(), ProviderKind::Gemini);
    }

    #[test]
    fn test_pick_gemini_model() {
        let list = json!({
            "models": [
                {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
                {"name": "models/gemini-1.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]}
            ]
        });
        assert_eq!(pick_gemini_model(&list).as_deref(), Some("gemini-1.5-flash"));
        assert!(pick_gemini_model(&json!({"models": []})).is_none());
        assert!(pick_gemini_model(&json!({"error": "denied"})).is_none());
    }

    #[test]
    fn test_parse_gemini_text() {
        let resp = json!({
            "candidates": [{"content": {"parts": [{"text": "## Market\n"}, {"text": "Calm."}]}}]
        });
        assert_eq!(parse_gemini_text(&resp).as_deref(), Some("## Market\nCalm."));

        let blocked = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert!(parse_gemini_text(&blocked).is_none());

        let blank = json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]});
        assert!(parse_gemini_text(&blank).is_none());
    }

    #[test]
    fn test_parse_openai_text() {
        let resp = json!({"choices": [{"message": {"role": "assistant", "content": "Report"}}]});
        assert_eq!(parse_openai_text(&resp).as_deref(), Some("Report"));
        assert!(parse_openai_text(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(&request(), "Russian").unwrap();

        assert!(prompt.contains("report in Russian"));
        assert!(prompt.contains("S&P 500"));
        assert!(prompt.contains("new_symbols"));
        assert!(prompt.contains("dropped_symbols"));
        assert!(prompt.contains("\"ticker\": \"KO\""));
        assert!(prompt.contains("\"PFE\""));
        assert!(prompt.contains("\"index\": \"^GSPC\""));
        for section in ["1.", "2.", "3.", "4.", "5."] {
            assert!(prompt.contains(section));
        }
    }
}
