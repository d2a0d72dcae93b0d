#[cfg(test)]
mod tests {
    use std::io::Write;
    use taskpilot_config::ConfigLoader;
    use taskpilot_config::schema::*;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_agent_config_defaults() {
        let config = TaskPilotConfig::default();
        assert!(config.agent.model.starts_with("cloudflare/"));
        assert_eq!(config.agent.max_tokens, 1024);
        assert_eq!(config.agent.temperature, 0.7);
        assert_eq!(config.agent.request_timeout_secs, 30);
        assert_eq!(config.agent.default_session, "main");
        assert_eq!(config.agent.context_task_limit, 10);
        assert_eq!(config.agent.context_window_days, 7);
        assert_eq!(config.agent.snapshot_history_len, 20);
        assert_eq!(config.agent.extraction_history_len, 5);
        assert!(!config.agent.llm_intent_fallback);
    }

    #[test]
    fn test_reminder_and_server_defaults() {
        let config = TaskPilotConfig::default();
        assert_eq!(config.reminders.offsets_hours, vec![1, 24, 168]);
        assert!(config.reminders.durable);
        assert_eq!(config.server.listen, "127.0.0.1:3800");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_initial_preferences_follow_config() {
        let mut config = TaskPilotConfig::default();
        config.reminders.offsets_hours = vec![2, 48];
        config.preferences.working_hours_start = 8;
        let prefs = config.initial_preferences();
        assert_eq!(prefs.reminder_intervals, vec![2, 48]);
        assert_eq!(prefs.working_hours.start, 8);
        assert_eq!(prefs.working_hours.end, 17);
    }

    #[test]
    fn test_relative_db_path_lives_under_data_dir() {
        let storage = StorageConfig::default();
        let resolved = storage.resolved_db_path();
        assert!(resolved.ends_with(".taskpilot/taskpilot.db"));

        let absolute = StorageConfig {
            db_path: std::env::temp_dir().join("tp.db"),
        };
        assert_eq!(absolute.resolved_db_path(), std::env::temp_dir().join("tp.db"));
    }

    // ── TOML parsing ───────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = TaskPilotConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: TaskPilotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.agent.model, config.agent.model);
        assert_eq!(restored.reminders.offsets_hours, config.reminders.offsets_hours);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConfigLoader::from_toml(
            r#"
            [agent]
            model = "openai/gpt-4o-mini"

            [reminders]
            offsets_hours = [2]
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.model, "openai/gpt-4o-mini");
        assert_eq!(config.agent.max_tokens, 1024);
        assert_eq!(config.reminders.offsets_hours, vec![2]);
        assert!(config.reminders.durable);
        assert_eq!(config.server.listen, "127.0.0.1:3800");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ConfigLoader::from_toml("[agent\nmodel = ").unwrap_err();
        assert!(err.to_string().contains("config"));
    }

    // ── Validation ─────────────────────────────────────────────

    #[test]
    fn test_default_config_validates() {
        let warnings = TaskPilotConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_empty_model_is_error() {
        let mut config = TaskPilotConfig::default();
        config.agent.model = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.contains("agent.model"));
    }

    #[test]
    fn test_model_without_provider_is_warning() {
        let mut config = TaskPilotConfig::default();
        config.agent.model = "gpt-4o".into();
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.field == "agent.model" && w.severity == WarningSeverity::Warning));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let mut config = TaskPilotConfig::default();
        config.agent.temperature = 2.5;
        assert!(config.validate().unwrap_err().contains("agent.temperature"));
    }

    #[test]
    fn test_zero_max_tokens() {
        let mut config = TaskPilotConfig::default();
        config.agent.max_tokens = 0;
        assert!(config.validate().unwrap_err().contains("agent.max_tokens"));
    }

    #[test]
    fn test_bad_reminder_offsets() {
        let mut config = TaskPilotConfig::default();
        config.reminders.offsets_hours = vec![];
        assert!(config.validate().is_err());
        config.reminders.offsets_hours = vec![0, 24];
        assert!(config.validate().unwrap_err().contains("reminders.offsets_hours"));
    }

    #[test]
    fn test_working_hours_out_of_order() {
        let mut config = TaskPilotConfig::default();
        config.preferences.working_hours_start = 18;
        config.preferences.working_hours_end = 9;
        assert!(config.validate().unwrap_err().contains("preferences.working_hours"));
    }

    #[test]
    fn test_empty_listen_is_error() {
        let mut config = TaskPilotConfig::default();
        config.server.listen = String::new();
        assert!(config.validate().unwrap_err().contains("server.listen"));
    }

    #[test]
    fn test_public_listen_is_warning() {
        let mut config = TaskPilotConfig::default();
        config.server.listen = "0.0.0.0:3800".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "server.listen"));
    }

    #[test]
    fn test_unknown_log_format_is_warning() {
        let mut config = TaskPilotConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        let w = warnings.iter().find(|w| w.field == "logging.format").unwrap();
        assert!(w.to_string().contains("xml"));
    }

    // ── Loader ─────────────────────────────────────────────────

    #[test]
    fn test_resolve_explicit_path_wins() {
        let path = std::path::Path::new("/tmp/custom.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(path)), path);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(loader.get().agent.default_session, "main");
        assert_eq!(loader.get().reminders.offsets_hours, vec![1, 24, 168]);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\ntemperature = 9.0").unwrap();
        assert!(ConfigLoader::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\ndefault_session = \"alpha\"").unwrap();
        let loader = ConfigLoader::load(Some(file.path())).unwrap();
        assert_eq!(loader.get().agent.default_session, "alpha");

        std::fs::write(file.path(), "[agent]\ndefault_session = \"beta\"\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().agent.default_session, "beta");
        assert_eq!(loader.path(), file.path());
    }

    #[test]
    fn test_reload_keeps_config_on_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\ndefault_session = \"alpha\"").unwrap();
        let loader = ConfigLoader::load(Some(file.path())).unwrap();

        std::fs::write(file.path(), "[agent]\nmax_tokens = 0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().agent.default_session, "alpha");
    }
}
