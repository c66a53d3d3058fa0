// ABOUTME: tracing layer that appends JSON-lines log entries to date-partitioned files.
// ABOUTME: ERROR and FATAL entries are duplicated into a separate error-only journal.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::LogLevel;

/// Primary journal for a given day.
pub fn journal_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("shipwright-{date}.log"))
}

/// Error-only journal for a given day.
pub fn error_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("shipwright-errors-{date}.log"))
}

/// Audit trail for a given day.
pub fn audit_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("audit-{date}.log"))
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Module and line that emitted the entry.
    pub caller: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEntry {
    fn from_event(event: &Event<'_>) -> Self {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level = if visitor.fatal {
            LogLevel::Fatal
        } else {
            LogLevel::from(*meta.level())
        };
        let caller = format!(
            "{}:{}",
            meta.module_path().unwrap_or_else(|| meta.target()),
            meta.line().unwrap_or(0)
        );

        Self {
            timestamp: Utc::now(),
            level,
            caller,
            message: visitor.message,
            fields: visitor.fields,
        }
    }

    /// String value of a structured field, if present.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, serde_json::Value>,
    fatal: bool,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.insert(field, serde_json::Value::String(rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "fatal" {
            self.fatal = value;
        } else {
            self.insert(field, serde_json::Value::Bool(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let number = serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
        self.insert(field, number);
    }
}

struct DayFiles {
    date: NaiveDate,
    primary: File,
    errors: File,
}

impl DayFiles {
    fn open(dir: &Path, date: NaiveDate) -> io::Result<Self> {
        Ok(Self {
            date,
            primary: append(&journal_file(dir, date))?,
            errors: append(&error_file(dir, date))?,
        })
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only writer behind the journal layer.
pub struct JournalSink {
    dir: PathBuf,
    files: Mutex<Option<DayFiles>>,
}

impl JournalSink {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append an entry to the journal for its day, rolling files at midnight UTC.
    pub fn append(&self, entry: &LogEntry) -> io::Result<()> {
        let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
        line.push('\n');

        let date = entry.timestamp.date_naive();
        let mut files = self.files.lock();
        if files.as_ref().is_none_or(|day| day.date != date) {
            *files = Some(DayFiles::open(&self.dir, date)?);
        }
        let Some(day) = files.as_mut() else {
            return Ok(());
        };

        day.primary.write_all(line.as_bytes())?;
        if entry.level.is_error() {
            day.errors.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    pub fn flush(&self) {
        if let Some(day) = self.files.lock().as_mut() {
            let _ = day.primary.sync_data();
            let _ = day.errors.sync_data();
        }
    }
}

/// tracing layer writing every enabled event to the journal.
pub struct JournalLayer {
    sink: Arc<JournalSink>,
}

impl JournalLayer {
    pub fn new(sink: Arc<JournalSink>) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for JournalLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let entry = LogEntry::from_event(event);
        if let Err(e) = self.sink.append(&entry) {
            eprintln!("shipwright: failed to write log journal: {e}");
        }
    }
}
