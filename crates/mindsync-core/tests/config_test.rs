use mindsync_core::config::*;
use mindsync_core::models::ConflictUrgency;

#[test]
fn config_loads_from_empty_toml_with_all_defaults() {
    let config = MindSyncConfig::from_toml("").unwrap();

    // Resolution defaults
    assert_eq!(config.resolution.grace_window_ms, 50);
    assert_eq!(config.resolution.immediate_deadline_secs, 30);
    assert_eq!(config.resolution.high_deadline_secs, 300);
    assert_eq!(config.resolution.medium_deadline_secs, 1800);
    assert_eq!(config.resolution.low_deadline_secs, 7200);
    assert_eq!(config.resolution.high_urgency_priority_threshold, 600);
    assert_eq!(config.resolution.text_merge_separator, "\n\n");

    // Sync defaults
    assert_eq!(config.sync.device_id, "local-device");
    assert_eq!(config.sync.audit_log_capacity, 100);
    assert_eq!(config.sync.max_cas_retries, 1);

    // Observability defaults
    assert_eq!(config.observability.log_level, "info");
    assert!(!config.observability.json_logs);
}

#[test]
fn config_loads_partial_toml_with_overrides() {
    let toml = r#"
[resolution]
grace_window_ms = 750

[sync]
device_id = "phone-1"
"#;
    let config = MindSyncConfig::from_toml(toml).unwrap();
    assert_eq!(config.resolution.grace_window_ms, 750);
    assert_eq!(config.sync.device_id, "phone-1");
    // Non-overridden fields keep defaults
    assert_eq!(config.resolution.immediate_deadline_secs, 30);
    assert_eq!(config.sync.audit_log_capacity, 100);
}

#[test]
fn config_serde_roundtrip() {
    let config = MindSyncConfig::default();
    let toml_str = config.to_toml().unwrap();
    let roundtripped = MindSyncConfig::from_toml(&toml_str).unwrap();
    assert_eq!(
        roundtripped.resolution.grace_window_ms,
        config.resolution.grace_window_ms
    );
    assert_eq!(roundtripped.sync.device_id, config.sync.device_id);
}

#[test]
fn config_rejects_malformed_toml() {
    let err = MindSyncConfig::from_toml("[resolution\ngrace_window_ms = ").unwrap_err();
    assert!(err.to_string().contains("config error"));
}

#[test]
fn deadlines_follow_urgency() {
    let config = ResolutionConfig::default();
    assert_eq!(config.deadline_for(ConflictUrgency::Immediate).num_seconds(), 30);
    assert_eq!(config.deadline_for(ConflictUrgency::High).num_minutes(), 5);
    assert_eq!(config.deadline_for(ConflictUrgency::Medium).num_minutes(), 30);
    assert_eq!(config.deadline_for(ConflictUrgency::Low).num_hours(), 2);
}
