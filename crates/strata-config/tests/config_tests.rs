#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use strata_config::ConfigLoader;
    use strata_config::schema::*;
    use strata_core::StrataError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.default_ttl_secs, 86_400);
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.embedding_dims, 1536);
        assert_eq!(config.vector_metric, "cosine");
        assert_eq!(config.preview_chars, 200);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(86_400)));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.embedding_dims(), Some(1536));
    }

    #[test]
    fn test_zero_means_disabled() {
        let config = MemoryConfig {
            default_ttl_secs: 0,
            sweep_interval_secs: 0,
            embedding_dims: 0,
            ..MemoryConfig::default()
        };
        assert_eq!(config.default_ttl(), None);
        assert_eq!(config.sweep_interval(), None);
        assert_eq!(config.embedding_dims(), None);
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = StrataConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: StrataConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[memory]
default_ttl_secs = 60

[logging]
format = "json"
"#;
        let config: StrataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.default_ttl_secs, 60);
        assert_eq!(config.logging.format, "json");
        // Defaults should fill in
        assert_eq!(config.memory.sweep_interval_secs, 300);
        assert_eq!(config.logging.level, "info");
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_default_config_is_clean() {
        let warnings = StrataConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_unknown_metric_is_an_error() {
        let mut config = StrataConfig::default();
        config.memory.vector_metric = "manhattan".into();
        match config.validate() {
            Err(StrataError::ConfigValidation { field, .. }) => {
                assert_eq!(field, "memory.vector_metric")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_level_is_an_error() {
        let mut config = StrataConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_are_reported_together() {
        let mut config = StrataConfig::default();
        config.memory.vector_metric = "dot".into();
        config.logging.level = "loud".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_soft_findings_are_warnings() {
        let mut config = StrataConfig::default();
        config.logging.format = "xml".into();
        config.memory.sweep_interval_secs = 100_000;
        let warnings = config.validate().unwrap();
        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert!(fields.contains(&"logging.format"));
        assert!(fields.contains(&"memory.sweep_interval_secs"));
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_warning_display() {
        let w = ConfigWarning {
            field: "memory.preview_chars".into(),
            message: "preview length is 0".into(),
            severity: WarningSeverity::Warning,
            hint: Some("Set to e.g. 200".into()),
        };
        let text = w.to_string();
        assert!(text.starts_with("warning memory.preview_chars: preview length is 0"));
        assert!(text.contains("Set to e.g. 200"));
    }

    // ── Env override tests ─────────────────────────────────────

    #[test]
    fn test_env_overrides_apply() {
        let config = ConfigLoader::apply_overrides_from(
            StrataConfig::default(),
            env(&[
                ("STRATA_LOG_LEVEL", "debug"),
                ("STRATA_LOG_FORMAT", "compact"),
                ("STRATA_DEFAULT_TTL", "0"),
                ("STRATA_SWEEP_INTERVAL", "30"),
                ("STRATA_EMBEDDING_DIMS", "384"),
            ]),
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.memory.default_ttl(), None);
        assert_eq!(config.memory.sweep_interval_secs, 30);
        assert_eq!(config.memory.embedding_dims, 384);
    }

    #[test]
    fn test_invalid_numeric_override_is_ignored() {
        let config = ConfigLoader::apply_overrides_from(
            StrataConfig::default(),
            env(&[("STRATA_DEFAULT_TTL", "soon"), ("STRATA_EMBEDDING_DIMS", "-3")]),
        );
        assert_eq!(config.memory.default_ttl_secs, 86_400);
        assert_eq!(config.memory.embedding_dims, 1536);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("strata.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[memory]
default_ttl_secs = 120
sweep_interval_secs = 10
embedding_dims = 8
preview_chars = 40

[logging]
level = "warn"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let config = loader.get();
        assert_eq!(config.memory.default_ttl_secs, 120);
        assert_eq!(config.memory.sweep_interval_secs, 10);
        assert_eq!(config.memory.embedding_dims, 8);
        assert_eq!(config.memory.preview_chars, 40);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(loader.path(), config_path.as_path());
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().memory.vector_metric, "cosine");
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("strata.toml");
        std::fs::write(&config_path, "[memory]\nvector_metric = \"l2\"\n").unwrap();
        assert!(ConfigLoader::load(Some(config_path.as_path())).is_err());

        std::fs::write(&config_path, "[memory\n").unwrap();
        assert!(matches!(
            ConfigLoader::load(Some(config_path.as_path())),
            Err(StrataError::Config(_))
        ));
    }

    #[test]
    fn test_config_loader_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("strata.toml");

        std::fs::write(&config_path, "[memory]\ndefault_ttl_secs = 60\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.get().memory.default_ttl_secs, 60);

        std::fs::write(&config_path, "[memory]\ndefault_ttl_secs = 600\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().memory.default_ttl_secs, 600);
        assert_eq!(loader.shared().read().memory.default_ttl_secs, 600);
    }

    #[test]
    fn test_reload_keeps_config_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("strata.toml");

        std::fs::write(&config_path, "[memory]\ndefault_ttl_secs = 60\n").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();

        std::fs::write(&config_path, "[memory]\nvector_metric = \"l2\"\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().memory.default_ttl_secs, 60);

        std::fs::remove_file(&config_path).unwrap();
        assert!(loader.reload().is_err());
    }

    #[test]
    fn test_watch_starts_on_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("strata.toml");
        std::fs::write(&config_path, "").unwrap();
        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        let watcher = loader.watch();
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = std::path::Path::new("/tmp/custom.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(explicit)), explicit);
    }

    // ── Logging ────────────────────────────────────────────────

    #[test]
    fn test_second_tracing_init_fails_cleanly() {
        let config = LoggingConfig {
            level: "error".into(),
            format: "compact".into(),
        };
        let _ = strata_config::init_tracing(&config);
        assert!(strata_config::init_tracing(&config).is_err());
    }
}
