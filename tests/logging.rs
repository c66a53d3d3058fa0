// ABOUTME: Integration tests for the structured journal, FATAL entries, and the audit trail.
// ABOUTME: Installs a thread-local subscriber writing to a temporary log directory.

mod support;

use std::time::Duration;

use chrono::Utc;
use shipwright::logging::{self, AuditTrail, LogLevel, audit_file, log_performance};
use support::CapturedLogs;

/// Test: Entries below the configured level are dropped.
#[test]
fn filters_below_minimum_level() {
    let logs = CapturedLogs::start(LogLevel::Warn);

    tracing::debug!("debug detail");
    tracing::info!("routine progress");
    tracing::warn!("something odd");
    tracing::error!("something broke");

    let entries = logs.entries();
    let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["something odd", "something broke"]);
}

/// Test: Debug level keeps everything.
#[test]
fn debug_level_keeps_debug_entries() {
    let logs = CapturedLogs::start(LogLevel::Debug);
    tracing::debug!("verbose");
    assert!(logs.contains("verbose"));
}

/// Test: Entries carry level, caller, and structured fields.
#[test]
fn entries_are_structured() {
    let logs = CapturedLogs::start(LogLevel::Info);

    tracing::info!(step = "deploy", attempt = 2u64, "deploying");

    let entries = logs.entries();
    let entry = entries.iter().find(|e| e.message == "deploying").unwrap();
    assert_eq!(entry.level, LogLevel::Info);
    assert!(entry.caller.starts_with("logging:"), "caller was {}", entry.caller);
    assert_eq!(entry.field_str("step"), Some("deploy"));
    assert_eq!(entry.fields["attempt"], serde_json::json!(2));
}

/// Test: Only ERROR and FATAL entries reach the error journal.
#[test]
fn errors_go_to_error_journal() {
    let logs = CapturedLogs::start(LogLevel::Debug);

    tracing::info!("fine");
    tracing::warn!("meh");
    tracing::error!("bad");

    let errors = logs.error_entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "bad");
    assert_eq!(logs.entries().len(), 3);
}

/// Test: fatal! produces a FATAL entry in both journals.
#[test]
fn fatal_macro_records_fatal_level() {
    let logs = CapturedLogs::start(LogLevel::Info);

    shipwright::fatal!(scope = "api-production", "rollback failed: {}", "target unreachable");

    let errors = logs.error_entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, LogLevel::Fatal);
    assert_eq!(errors[0].message, "rollback failed: target unreachable");
    assert_eq!(errors[0].field_str("scope"), Some("api-production"));
    assert!(!errors[0].fields.contains_key("fatal"));
}

/// Test: A FATAL minimum drops plain errors but keeps FATAL entries.
#[test]
fn fatal_minimum_keeps_only_fatal() {
    let logs = CapturedLogs::start(LogLevel::Fatal);

    tracing::warn!("ignored");
    tracing::error!("recoverable");
    shipwright::fatal!("unrecoverable");

    let entries = logs.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Fatal);
    assert_eq!(entries[0].message, "unrecoverable");

    let errors = logs.error_entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, LogLevel::Fatal);
}

/// Test: Performance lines carry operation, duration, and status.
#[test]
fn performance_is_logged_with_duration() {
    let logs = CapturedLogs::start(LogLevel::Info);

    log_performance("deploy api to staging", Duration::from_millis(1500), "succeeded");

    let entries = logs.entries();
    let entry = entries
        .iter()
        .find(|e| e.field_str("operation") == Some("deploy api to staging"))
        .unwrap();
    assert_eq!(entry.fields["duration_secs"], serde_json::json!(1.5));
    assert_eq!(entry.field_str("status"), Some("succeeded"));
    assert!(entry.message.contains("1.500s"));
}

/// Test: The audit trail is independent of the log level and appends JSON lines.
#[test]
fn audit_trail_appends_entries() {
    let dir = tempfile::tempdir().unwrap();
    let trail = AuditTrail::new(dir.path().join("logs"));

    trail
        .record("deployer@ci", "deploy.start", "api/production@v1.2.3", "started")
        .unwrap();
    trail
        .record("deployer@ci", "deploy.finish", "api/production@v1.2.3", "ROLLED_BACK")
        .unwrap();

    let today = Utc::now().date_naive();
    let raw = std::fs::read_to_string(audit_file(trail.dir(), today)).unwrap();
    assert_eq!(raw.lines().count(), 2);

    let entries = trail.entries(today).unwrap();
    assert_eq!(entries[0].actor, "deployer@ci");
    assert_eq!(entries[1].action, "deploy.finish");
    assert_eq!(entries[1].result, "ROLLED_BACK");
}

/// Test: An unwritable journal directory is reported at setup, not at first log.
#[test]
fn unusable_log_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, "").unwrap();

    let config = logging::LogConfig::new(LogLevel::Info)
        .with_dir(file.join("logs"))
        .without_console();
    assert!(logging::subscriber(&config).is_err());
}
