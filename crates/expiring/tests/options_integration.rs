//! Integration tests for cache options serialization
//!
//! Durations are stored as integer milliseconds so options can live in JSON
//! or TOML configuration files.

#![cfg(feature = "serde")]

use std::time::Duration;

use expiring_lazy::ExpiringCacheOptions;

#[test]
fn test_json_uses_milliseconds() {
    let options = ExpiringCacheOptions::builder()
        .minimum_remaining_time(Duration::from_secs(20))
        .min_refresh_delay(Duration::from_millis(250))
        .build()
        .unwrap();

    let json = serde_json::to_value(options).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "minimum_remaining_time": 20000, "min_refresh_delay": 250 })
    );

    let parsed: ExpiringCacheOptions = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, options);
}

#[test]
fn test_missing_fields_fall_back_to_defaults() {
    let parsed: ExpiringCacheOptions =
        serde_json::from_str(r#"{ "minimum_remaining_time": 5000 }"#).unwrap();

    assert_eq!(parsed.minimum_remaining_time, Duration::from_secs(5));
    assert_eq!(parsed.min_refresh_delay, ExpiringCacheOptions::default().min_refresh_delay);
}

/// Options embedded in a TOML config section still need validating.
#[test]
fn test_toml_section_is_validated() {
    #[derive(serde::Deserialize)]
    struct AppConfig {
        token_cache: ExpiringCacheOptions,
    }

    let config: AppConfig = toml::from_str(
        r#"
        [token_cache]
        minimum_remaining_time = 30000
        min_refresh_delay = 0
        "#,
    )
    .unwrap();

    assert_eq!(config.token_cache.minimum_remaining_time, Duration::from_secs(30));
    assert!(config.token_cache.validate().is_err());
}
