// ABOUTME: Accumulator for non-fatal warnings raised during a deployment run.
// ABOUTME: Warnings never fail a run but are logged, reported, and kept on the run record.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, logging it at WARN.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(warning = warning.kind.as_str(), "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn post_task(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PostTask, message)
    }

    pub fn release_record(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ReleaseRecord, message)
    }

    pub fn audit_write(message: impl Into<String>) -> Self {
        Self::new(WarningKind::AuditWrite, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Lock record could not be removed and may need manual cleanup.
    LockRelease,
    /// A post-deploy task failed.
    PostTask,
    /// The release or its history entry was not saved.
    ReleaseRecord,
    /// The audit trail could not be written.
    AuditWrite,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::LockRelease => "lock_release",
            WarningKind::PostTask => "post_task",
            WarningKind::ReleaseRecord => "release_record",
            WarningKind::AuditWrite => "audit_write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings_in_order() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::post_task("cache purge failed"));
        diag.warn(Warning::lock_release("lock file remains"));

        let kinds: Vec<_> = diag.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::PostTask, WarningKind::LockRelease]);
    }

    #[test]
    fn serializes_as_a_list() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::audit_write("disk full"));
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json[0]["kind"], "audit_write");
        assert_eq!(json[0]["message"], "disk full");
    }
}
