use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::api::coingecko::CoinGeckoClient;
use crate::models::AlertRule;
use crate::utils::ConfigError;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub cache_path: PathBuf,
    pub cache_max_age: Duration,
    pub http_timeout: Duration,
    pub check_interval: Duration,
    pub rate_limit_per_minute: usize,
    pub webhook_url: Option<String>,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = non_empty("COINGECKO_API_URL")
            .unwrap_or_else(|| CoinGeckoClient::DEFAULT_BASE_URL.to_string());
        let api_key = non_empty("COINGECKO_API_KEY");
        let cache_path = non_empty("CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/cache/prices.json"));

        let cache_max_age = Duration::from_secs(parse_var(&non_empty, "CACHE_MAX_AGE_SECS", 300)?);
        let http_timeout = Duration::from_secs(parse_var(&non_empty, "HTTP_TIMEOUT_SECS", 10)?);
        let check_interval = Duration::from_secs(parse_var(&non_empty, "CHECK_INTERVAL_SECS", 60)?);
        let rate_limit_per_minute = parse_var(&non_empty, "RATE_LIMIT_PER_MINUTE", 30)?;
        let webhook_url = non_empty("ALERT_WEBHOOK_URL");

        if http_timeout.is_zero() {
            return Err(ConfigError::InvalidEnv {
                name: "HTTP_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Settings {
            api_url,
            api_key,
            cache_path,
            cache_max_age,
            http_timeout,
            check_interval,
            rate_limit_per_minute,
            webhook_url,
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

/// Read alert rules from a JSON file
pub fn load_rules(path: &Path) -> Result<Vec<AlertRule>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rules(&content)
}

/// Parse and validate a JSON array of alert rules
pub fn parse_rules(content: &str) -> Result<Vec<AlertRule>, ConfigError> {
    let rules: Vec<AlertRule> = serde_json::from_str(content)?;
    for (index, rule) in rules.iter().enumerate() {
        validate_rule(rule).map_err(|reason| ConfigError::InvalidRule { index, reason })?;
    }
    Ok(rules)
}

/// Check a single rule for usable values
pub fn validate_rule(rule: &AlertRule) -> Result<(), String> {
    if rule.coin_id.trim().is_empty() {
        return Err("coin_id cannot be empty".to_string());
    }
    if rule.currency.trim().is_empty() {
        return Err("currency cannot be empty".to_string());
    }
    if !rule.threshold_price.is_finite() || rule.threshold_price <= 0.0 {
        return Err(format!(
            "threshold_price must be a positive number, got {}",
            rule.threshold_price
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.api_url, CoinGeckoClient::DEFAULT_BASE_URL);
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.cache_path, PathBuf::from("data/cache/prices.json"));
        assert_eq!(settings.cache_max_age, Duration::from_secs(300));
        assert_eq!(settings.http_timeout, Duration::from_secs(10));
        assert_eq!(settings.check_interval, Duration::from_secs(60));
        assert_eq!(settings.rate_limit_per_minute, 30);
        assert!(settings.webhook_url.is_none());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let settings = Settings::from_lookup(lookup(&[
            ("COINGECKO_API_KEY", "  "),
            ("CACHE_MAX_AGE_SECS", "60"),
            ("ALERT_WEBHOOK_URL", "http://localhost/hook"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.cache_max_age, Duration::from_secs(60));
        assert_eq!(settings.webhook_url.as_deref(), Some("http://localhost/hook"));
    }

    #[test]
    fn test_every_variable_overrides_its_default() {
        let settings = Settings::from_lookup(lookup(&[
            ("COINGECKO_API_URL", "http://localhost:8080/api/v3"),
            ("COINGECKO_API_KEY", "CG-demo"),
            ("CACHE_PATH", "/tmp/coinwatch.json"),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("CHECK_INTERVAL_SECS", " 15 "),
            ("RATE_LIMIT_PER_MINUTE", "10"),
        ]))
        .unwrap();
        assert_eq!(settings.api_url, "http://localhost:8080/api/v3");
        assert_eq!(settings.api_key.as_deref(), Some("CG-demo"));
        assert_eq!(settings.cache_path, PathBuf::from("/tmp/coinwatch.json"));
        assert_eq!(settings.http_timeout, Duration::from_secs(3));
        assert_eq!(settings.check_interval, Duration::from_secs(15));
        assert_eq!(settings.rate_limit_per_minute, 10);

        let err = Settings::from_lookup(lookup(&[("RATE_LIMIT_PER_MINUTE", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "RATE_LIMIT_PER_MINUTE"));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = Settings::from_lookup(lookup(&[("CACHE_MAX_AGE_SECS", "five")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "CACHE_MAX_AGE_SECS"));

        let err = Settings::from_lookup(lookup(&[("HTTP_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_parse_rules_with_defaults() {
        let rules = parse_rules(
            r#"[
                {"coin_id": "bitcoin", "threshold_price": 40000},
                {"coin_id": "ethereum", "currency": "eur", "threshold_price": 4000, "direction": "above"}
            ]"#,
        )
        .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].currency, "usd");
        assert_eq!(rules[0].direction, Direction::Below);
        assert_eq!(rules[1].direction, Direction::Above);
    }

    #[test]
    fn test_parse_rules_rejects_bad_threshold() {
        let err = parse_rules(r#"[{"coin_id": "bitcoin", "threshold_price": -1}]"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { index: 0, .. }));

        let err = parse_rules(r#"[{"coin_id": "", "threshold_price": 1}]"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));

        let err = parse_rules(r#"{"coin_id": "bitcoin"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::RulesParse(_)));
    }

    #[test]
    fn test_load_rules_missing_file() {
        let err = load_rules(Path::new("/nonexistent/coinwatch/rules.json")).unwrap_err();
        assert!(matches!(err, ConfigError::RulesIo { .. }));
    }
}
