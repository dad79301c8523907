use std::{fs, path::PathBuf};

use capsuleer_config::{AlertType, ConfigError, ReportTemplate, load_config_with};
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("dashboard.json");
    fs::write(&path, body).expect("write config");
    path
}

fn env(name: &str) -> Option<String> {
    match name {
        "DISCORD_WEBHOOK" => Some("https://discord.test/api/webhooks/1".to_string()),
        _ => None,
    }
}

#[test]
fn loads_typed_config_with_env_resolved_in_memory_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let body = r#"{
        "characters": ["main", "hauler"],
        "alerts": [
            {"type": "wallet_large_deposit", "threshold": 500000000, "character": "main"},
            {"type": "structure_under_attack", "enabled": false}
        ],
        "reports": [{"template": "wallet_summary", "schedule": "weekly"}],
        "webhook_url": "$ENV:DISCORD_WEBHOOK"
    }"#;
    let path = write_config(&dir, body);

    let config = load_config_with(&path, env).expect("config loads");

    assert_eq!(config.characters, vec!["main", "hauler"]);
    assert_eq!(config.alerts[0].alert_type, AlertType::WalletLargeDeposit);
    assert_eq!(config.alerts[0].threshold, Some(500_000_000.0));
    assert!(!config.alerts[1].enabled);
    assert_eq!(config.reports[0].template, ReportTemplate::WalletSummary);
    assert_eq!(
        config.webhook_url.as_deref(),
        Some("https://discord.test/api/webhooks/1")
    );
    assert_eq!(fs::read_to_string(&path).expect("reread"), body);
}

#[test]
fn schema_violations_are_all_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{"characters": ["main"], "alerts": [{"type": "wallet_large_deposit"}], "reports": [{"template": "nope"}]}"#,
    );

    let err = load_config_with(&path, env).expect_err("invalid config");

    let ConfigError::Invalid(validation) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(validation.violations.len(), 2);
    assert_eq!(err.violations().len(), 2);
}

#[test]
fn unset_environment_variable_fails_loading() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        &dir,
        r#"{"characters": ["main"], "webhook_url": "$ENV:MISSING_HOOK"}"#,
    );

    let err = load_config_with(&path, env).expect_err("unset variable");

    assert_eq!(err.violations()[0].path, "/webhook_url");
}

#[test]
fn unreadable_and_malformed_files() {
    let dir = tempfile::tempdir().expect("tempdir");

    let missing = load_config_with(dir.path().join("absent.json"), env).expect_err("missing");
    assert!(matches!(missing, ConfigError::Io { .. }));

    let path = write_config(&dir, "{ not json");
    let malformed = load_config_with(&path, env).expect_err("malformed");
    assert!(matches!(malformed, ConfigError::Json { .. }));
}
