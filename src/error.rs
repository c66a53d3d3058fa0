// ABOUTME: Error taxonomy and application-wide error type for shipwright.
// ABOUTME: Every error classifies into an ErrorKind whose code becomes the process exit code.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::types::{Environment, EnvironmentError, ServiceNameError, VersionError};

/// Closed set of outcome classifications shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Success,
    GenericFailure,
    InvalidArguments,
    ConfigurationError,
    LockHeld,
    Timeout,
    HealthCheckFailed,
    RollbackFailed,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Success,
        ErrorKind::GenericFailure,
        ErrorKind::InvalidArguments,
        ErrorKind::ConfigurationError,
        ErrorKind::LockHeld,
        ErrorKind::Timeout,
        ErrorKind::HealthCheckFailed,
        ErrorKind::RollbackFailed,
    ];

    /// Numeric code, used verbatim as the process exit code.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Success => 0,
            ErrorKind::GenericFailure => 1,
            ErrorKind::InvalidArguments => 2,
            ErrorKind::ConfigurationError => 3,
            ErrorKind::LockHeld => 4,
            ErrorKind::Timeout => 5,
            ErrorKind::HealthCheckFailed => 6,
            ErrorKind::RollbackFailed => 7,
        }
    }

    /// Inverse of [`ErrorKind::code`]. Unknown codes are a generic failure.
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .unwrap_or(ErrorKind::GenericFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Success => "success",
            ErrorKind::GenericFailure => "generic_failure",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::LockHeld => "lock_held",
            ErrorKind::Timeout => "timeout",
            ErrorKind::HealthCheckFailed => "health_check_failed",
            ErrorKind::RollbackFailed => "rollback_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid environment: {0}")]
    InvalidEnvironment(#[from] EnvironmentError),

    #[error("invalid version: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("invalid service name: {0}")]
    InvalidServiceName(#[from] ServiceNameError),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("environment {0} is not defined in the deployment descriptor")]
    UnknownEnvironment(Environment),

    #[error("deployment descriptor not found: {0}")]
    DescriptorMissing(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("deploy lock {scope} held by {holder} (pid {pid}) since {since}")]
    LockHeld {
        scope: String,
        holder: String,
        pid: u32,
        since: DateTime<Utc>,
    },

    #[error("deploy lock error: {0}")]
    Lock(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("circuit {name} is open; retry after {retry_after:?}")]
    CircuitOpen { name: String, retry_after: Duration },

    #[error("command `{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{step} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        step: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("deployment cancelled by {0}")]
    Cancelled(String),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify this error into the shared taxonomy.
    ///
    /// Retry exhaustion keeps the classification of the failure that caused it,
    /// so a deploy that timed out on every attempt still reports `Timeout`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidEnvironment(_) | Error::InvalidVersion(_) => ErrorKind::InvalidArguments,
            Error::InvalidServiceName(_)
            | Error::ConfigNotFound(_)
            | Error::InvalidConfig(_)
            | Error::UnknownEnvironment(_)
            | Error::DescriptorMissing(_)
            | Error::MissingEnvVar(_)
            | Error::Yaml(_) => ErrorKind::ConfigurationError,
            Error::LockHeld { .. } => ErrorKind::LockHeld,
            Error::Timeout { .. } | Error::CircuitOpen { .. } => ErrorKind::Timeout,
            Error::HealthCheckFailed(_) => ErrorKind::HealthCheckFailed,
            Error::RollbackFailed(_) => ErrorKind::RollbackFailed,
            Error::Exhausted { source, .. } => source.kind(),
            Error::Lock(_)
            | Error::CommandFailed { .. }
            | Error::Cancelled(_)
            | Error::Store(_)
            | Error::Io(_)
            | Error::Json(_) => ErrorKind::GenericFailure,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().code()
    }

    pub(crate) fn exhausted(step: impl Into<String>, attempts: u32, source: Error) -> Self {
        Error::Exhausted {
            step: step.into(),
            attempts,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
