//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::error::ConsultantError;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_screening_config_default() {
        let config = ScreeningConfig::default();
        assert_eq!(config.price_min, dec!(10));
        assert_eq!(config.price_max, dec!(100));
        assert_eq!(config.pe_max, dec!(15));
        assert_eq!(config.pb_max, dec!(2));
        assert_eq!(config.current_ratio_min, dec!(1.5));
        assert_eq!(config.debt_to_assets_max, dec!(1.0));
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.max_attempts, 3);
        assert!(config.symbols.is_empty());
        assert_eq!(
            config.universe_urls,
            vec![WIKIPEDIA_SP500_URL.to_string(), DATAHUB_SP500_URL.to_string()]
        );
    }

    #[test]
    fn test_screening_config_deserialize() {
        let toml_str = r#"
price_min = 5
price_max = 50
pe_max = 12.5
current_ratio_min = 2.0
symbols = ["AAPL", "MSFT"]
"#;
        let config: ScreeningConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.price_min, dec!(5));
        assert_eq!(config.price_max, dec!(50));
        assert_eq!(config.pe_max, dec!(12.5));
        assert_eq!(config.pb_max, dec!(2));
        assert_eq!(config.current_ratio_min, dec!(2.0));
        assert_eq!(config.symbols.len(), 2);
    }

    #[test]
    fn test_llm_config_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();
        assert!(config.provider.is_none());
        assert!(config.model.is_none());
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.language, "Russian");
    }

    #[test]
    fn test_llm_provider_alias() {
        let config: LlmConfig = toml::from_str(r#"provider = "gpt""#).unwrap();
        assert_eq!(config.provider, Some(ProviderKind::OpenAI));
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_credentials_prefers_gemini() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "g-key"), ("OPENAI_API_KEY", "o-key")])).unwrap();
        let (kind, key) = config.llm.credentials().unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
        assert_eq!(key, "g-key");
    }

    #[test]
    fn test_credentials_openai_fallback() {
        let mut config = Config::default();
        config.apply_env(env(&[("OPENAI_API_KEY", "o-key")])).unwrap();
        let (kind, key) = config.llm.credentials().unwrap();
        assert_eq!(kind, ProviderKind::OpenAI);
        assert_eq!(key, "o-key");
    }

    #[test]
    fn test_forced_provider_requires_its_key() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "g-key"), ("LLM_PROVIDER", "openai")])).unwrap();
        assert!(matches!(config.llm.credentials(), Err(ConsultantError::Config(_))));
    }

    #[test]
    fn test_invalid_provider_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_env(env(&[
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", "o-key"),
            ("LLM_PROVIDER", "opnai"),
        ]));
        assert!(matches!(result, Err(ConsultantError::Config(msg)) if msg.contains("opnai")));
        assert!(config.llm.provider.is_none());
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConsultantError::Config(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_from_env() {
        let mut config = Config::default();
        config.apply_env(env(&[("TELEGRAM_BOT_TOKEN", "123:abc"), ("CHAT_ID", "42")])).unwrap();
        let tg = config.telegram.unwrap();
        assert_eq!(tg.bot_token, "123:abc");
        assert_eq!(tg.chat_id, "42");
        assert!(tg.notify_success);
        assert!(tg.notify_errors);
    }

    #[test]
    fn test_telegram_needs_both_values() {
        let mut config = Config::default();
        config.apply_env(env(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_telegram_config_defaults() {
        let toml_str = r#"
bot_token = "123:abc"
chat_id = "12345"
notify_success = false
"#;
        let config: TelegramConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.notify_success);
        assert!(config.notify_errors);
    }

    #[test]
    fn test_debug_mode_flag() {
        for value in ["1", "true", "YES", "on"] {
            let mut config = Config::default();
            config.apply_env(env(&[("DEBUG_MODE", value)])).unwrap();
            assert!(config.debug_mode, "{value} should enable debug mode");
        }
        let mut config = Config::default();
        config.apply_env(env(&[("DEBUG_MODE", "0")])).unwrap();
        assert!(!config.debug_mode);
    }

    #[test]
    fn test_storage_paths() {
        let mut config = Config::default();
        assert_eq!(config.storage.history_path(), std::path::PathBuf::from("history.json"));
        config.apply_env(env(&[("HISTORY_PATH", "/data/h.json"), ("REPORTS_DIR", "/data/reports")])).unwrap();
        assert_eq!(config.storage.history_path(), std::path::PathBuf::from("/data/h.json"));
        assert_eq!(config.storage.reports_dir(), std::path::PathBuf::from("/data/reports"));
    }

    #[test]
    fn test_validate_rejects_inverted_price_band() {
        let mut config = Config::default();
        config.apply_env(env(&[("GEMINI_API_KEY", "k")])).unwrap();
        config.screening.price_min = dec!(200);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedule_next_run() {
        let schedule = ScheduleConfig::default();
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(before).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_run_after(after).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_schedule_invalid_time() {
        let schedule = ScheduleConfig {
            daily_at: "25:99".to_string(),
        };
        assert!(schedule.time_of_day().is_err());
    }

    #[test]
    fn test_full_config_from_toml() {
        let toml_str = r#"
debug_mode = true

[llm]
provider = "openai"
openai_api_key = "sk-test"
model = "gpt-4o-mini"

[storage]
history_path = "state/history.json"

[schedule]
daily_at = "14:30"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.debug_mode);
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.storage.history_path, "state/history.json");
        assert_eq!(config.storage.reports_dir, "reports");
        assert!(config.validate().is_ok());
    }
}
