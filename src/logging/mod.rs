// ABOUTME: Structured logging setup: console output, JSON-lines journal, error-only journal.
// ABOUTME: Also defines log levels, the fatal! macro, and performance logging.

mod audit;
mod journal;

pub use audit::{AuditEntry, AuditTrail, current_actor};
pub use journal::{JournalLayer, JournalSink, LogEntry, audit_file, error_file, journal_file};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Metadata, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{FilterFn, filter_fn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{Error, Result};

/// Dependencies are capped at this level regardless of our own verbosity.
const DEPENDENCY_DIRECTIVES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,rustls=warn";

/// Severity of a log entry. `Fatal` is an error that ends the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Filter directive for this minimum level.
    ///
    /// Fatal entries are ERROR events tagged `fatal = true`; a FATAL minimum
    /// lets ERROR through here and [`only_fatal`] narrows it further.
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }

    /// Whether entries at this level also go to the error-only journal.
    pub fn is_error(&self) -> bool {
        *self >= LogLevel::Error
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            // TRACE is below anything we configure; fold it into DEBUG
            _ => LogLevel::Debug,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(format!(
                "unknown log level '{other}' (expected debug, info, warn, error, or fatal)"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How logging should be wired for a run.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level; anything below is discarded before formatting.
    pub level: LogLevel,
    /// Journal directory. `None` disables the file journals.
    pub dir: Option<PathBuf>,
    /// Mirror events to stderr.
    pub console: bool,
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            dir: None,
            console: true,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::new(format!("{},{}", self.level.directive(), DEPENDENCY_DIRECTIVES))
    }
}

/// Keeps the journal open; flushes it when dropped.
#[must_use = "dropping the guard flushes and closes the log journal"]
pub struct LogGuard {
    sink: Option<Arc<JournalSink>>,
}

impl LogGuard {
    pub fn flush(&self) {
        if let Some(sink) = &self.sink {
            sink.flush();
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Build the subscriber described by `config` without installing it.
///
/// Tests install the result with `tracing::subscriber::set_default`; the binary
/// goes through [`init`].
pub fn subscriber(config: &LogConfig) -> Result<(impl Subscriber + Send + Sync + 'static, LogGuard)> {
    let sink = match &config.dir {
        Some(dir) => Some(Arc::new(JournalSink::open(dir)?)),
        None => None,
    };

    let console = config.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.level == LogLevel::Debug)
    });
    let journal = sink.clone().map(JournalLayer::new);

    let fatal_only = (config.level == LogLevel::Fatal).then(only_fatal);

    let subscriber = tracing_subscriber::registry()
        .with(config.filter())
        .with(fatal_only)
        .with(console)
        .with(journal);

    Ok((subscriber, LogGuard { sink }))
}

/// Drops every event that was not emitted through [`fatal!`].
///
/// Level filtering cannot tell FATAL from ERROR, but only `fatal!` events
/// declare a `fatal` field.
fn only_fatal() -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    filter_fn(|meta| !meta.is_event() || meta.fields().field("fatal").is_some())
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let (subscriber, guard) = subscriber(config)?;
    subscriber
        .try_init()
        .map_err(|e| Error::Io(std::io::Error::other(format!("failed to initialize logging: {e}"))))?;
    Ok(guard)
}

/// Record how long an operation took.
pub fn log_performance(operation: &str, duration: Duration, status: &str) {
    let duration_secs = duration.as_secs_f64();
    tracing::info!(
        target: "shipwright::perf",
        operation,
        duration_secs,
        status,
        "{operation} finished in {duration_secs:.3}s ({status})"
    );
}

/// Log at FATAL severity.
///
/// The entry is an ERROR event tagged `fatal = true`; the journal records it as
/// `FATAL`. The caller is responsible for ending the process once cleanup is done.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        ::tracing::error!(fatal = true, $($arg)+)
    };
}
