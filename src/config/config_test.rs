//! Tests for configuration parsing and environment overrides.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::config::{Config, ConfigTrait, Driver, DEFAULT_SYNC_INTERVAL};

    const YAML: &str = r#"
exporter:
  env: dev
  logs:
    level: info
  api:
    name: promexporter
    port: "8200"
  persistence:
    driver: redis
    addr: redis:6379
    db: 2
    sync_interval: 10s
    timeout: 2s
  metrics:
    - type: parser_images
      metrics:
        - key: cached_images_total
          description: Cached images
        - key: empty_images_total
          description: Empty images
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_yaml() {
        let cfg = Config::from_yaml(YAML).expect("valid yaml");

        assert!(!cfg.is_prod());
        assert_eq!(cfg.driver(), Driver::Redis);
        assert_eq!(cfg.sync_interval(), Duration::from_secs(10));
        assert_eq!(cfg.store_timeout(), Duration::from_secs(2));
        assert!(!cfg.persist_on_increment());
        assert_eq!(cfg.definitions().len(), 1);
        assert_eq!(cfg.definitions()[0].metric_type, "parser_images");
        assert_eq!(cfg.definitions()[0].metrics[1].key, "empty_images_total");
    }

    #[test]
    fn test_missing_metrics_fall_back_to_defaults() {
        let cfg = Config::from_yaml("exporter:\n  env: prod\n").expect("valid yaml");

        assert!(cfg.is_prod());
        assert_eq!(cfg.definitions()[0].metric_type, "parser_images");
        assert_eq!(cfg.definitions()[0].metrics.len(), 4);
        assert_eq!(cfg.sync_interval(), DEFAULT_SYNC_INTERVAL);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::from_yaml(YAML).expect("valid yaml");
        cfg.apply_env(env(&[
            ("APP_ENV", "prod"),
            ("PORT", "9100"),
            ("REDIS_DSN", "cache.internal:6380"),
            ("REDIS_PASSWORD", "secret"),
            ("REDIS_DB", "5"),
            ("REDIS_SYNC_INTERVAL", "45"),
        ]))
        .expect("valid overrides");

        assert!(cfg.is_prod());
        assert_eq!(cfg.api().and_then(|a| a.port.as_deref()), Some("9100"));
        let persistence = cfg.persistence().expect("persistence section");
        assert_eq!(persistence.addr.as_deref(), Some("cache.internal:6380"));
        assert_eq!(persistence.password.as_deref(), Some("secret"));
        assert_eq!(persistence.db, Some(5));
        assert_eq!(cfg.sync_interval(), Duration::from_secs(45));
    }

    #[test]
    fn test_env_rejects_garbage_numbers() {
        let mut cfg = Config::default();
        assert!(cfg.apply_env(env(&[("REDIS_DB", "zero")])).is_err());

        let mut cfg = Config::default();
        assert!(cfg
            .apply_env(env(&[("REDIS_SYNC_INTERVAL", "-1")]))
            .is_err());
    }

    #[test]
    fn test_zero_sync_interval_uses_default() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[("REDIS_SYNC_INTERVAL", "0")]))
            .expect("valid override");
        assert_eq!(cfg.sync_interval(), DEFAULT_SYNC_INTERVAL);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let yaml = r#"
exporter:
  env: test
  metrics:
    - type: images
      metrics:
        - key: uploaded_total
          description: a
        - key: uploaded_total
          description: b
"#;
        let cfg = Config::from_yaml(yaml).expect("valid yaml");
        let err = cfg.validate().expect_err("duplicate must be rejected");
        assert!(err.to_string().contains("uploaded_total"));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let yaml = r#"
exporter:
  env: test
  metrics:
    - type: images
      metrics:
        - key: ""
          description: a
"#;
        let cfg = Config::from_yaml(yaml).expect("valid yaml");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.driver(), Driver::Redis);
    }
}
