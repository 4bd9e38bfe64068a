//! Tests for configuration

#[cfg(test)]
mod tests {
    use crate::config::{Config, DefinedgeConfig, EngineConfig, FyersConfig};
    use std::io::Write;

    #[test]
    fn test_engine_config_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.lookback_days, 9);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.history_retry_delay_ms, 500);
    }

    #[test]
    fn test_engine_config_overrides() {
        let toml_str = r#"
lookback_days = 14
http_timeout_secs = 5
history_retry_delay_ms = 100
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.http_timeout_secs, 5);
        assert_eq!(config.history_retry_delay_ms, 100);
    }

    #[test]
    fn test_fyers_config_default_base_url() {
        let toml_str = r#"
client_id = "AB1234-100"
access_token = "eyJ0eXAi"
"#;
        let config: FyersConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.client_id, "AB1234-100");
        assert_eq!(config.base_url, "https://api-t1.fyers.in/api/v3");
    }

    #[test]
    fn test_definedge_config_default_base_url() {
        let toml_str = r#"
api_session_key = "sess-key"
api_secret = "secret"
"#;
        let config: DefinedgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.base_url,
            "https://integrate.definedgesecurities.com/dart/v1"
        );
    }

    #[test]
    fn test_full_config_with_both_brokers() {
        let toml_str = r#"
[fyers]
client_id = "AB1234-100"
access_token = "tok"

[definedge]
api_session_key = "sess"
api_secret = "sec"

[engine]
lookback_days = 7
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.fyers.is_some());
        assert!(config.definedge.is_some());
        assert_eq!(config.engine.lookback_days, 7);
    }

    #[test]
    fn test_config_sections_are_optional() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.fyers.is_none());
        assert!(config.definedge.is_none());
        assert_eq!(config.engine.lookback_days, 9);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[fyers]\nclient_id = \"AB1234-100\"\naccess_token = \"tok\""
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.fyers.unwrap().client_id, "AB1234-100");
    }
}
