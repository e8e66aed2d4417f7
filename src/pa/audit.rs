//! Append-only, sequence-ordered audit log for one Passive Authentication
//! invocation.
//!
//! `sequence` is assigned by [`AuditLog`] itself rather than by callers,
//! so the "exactly `1..N` with no gaps" invariant holds by
//! construction instead of needing a separate check.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// State-machine step a PA invocation is in.
/// Finer-grained than a generic `{STARTED, IN_PROGRESS, COMPLETED, FAILED}`
/// sketch — see `DESIGN.md` "PA audit step taxonomy" for why the
/// algorithm's own nine states are used verbatim instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaStep {
    VerificationStarted,
    UnwrapSod,
    ExtractDsc,
    LookupCsca,
    VerifyTrustChain,
    VerifySodSignature,
    ExtractDgHashes,
    VerifyDgHashes,
    CrlCheck,
    VerificationCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Started,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub step: PaStep,
    pub step_status: StepStatus,
    pub message: String,
    pub details: BTreeMap<String, String>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

/// The ordered, append-only log for a single `PAInvocation`. Assigns its
/// own monotonic `sequence` starting at 1 ("exactly `1..N` with
/// no gaps").
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditLogEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        level: AuditLevel,
        step: PaStep,
        step_status: StepStatus,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
        error_code: Option<ErrorCode>,
        error_message: Option<String>,
    ) {
        self.entries.push(AuditLogEntry {
            sequence: self.entries.len() as u64 + 1,
            timestamp: Utc::now(),
            level,
            step,
            step_status,
            message: message.into(),
            details,
            error_code,
            error_message,
        });
    }

    pub fn started(&mut self, step: PaStep, message: impl Into<String>) {
        self.push(AuditLevel::Info, step, StepStatus::Started, message, BTreeMap::new(), None, None);
    }

    pub fn completed(&mut self, step: PaStep, message: impl Into<String>, details: BTreeMap<String, String>) {
        self.push(AuditLevel::Info, step, StepStatus::Completed, message, details, None, None);
    }

    pub fn completed_with_level(
        &mut self,
        step: PaStep,
        level: AuditLevel,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
    ) {
        self.push(level, step, StepStatus::Completed, message, details, None, None);
    }

    pub fn failed(&mut self, step: PaStep, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        self.push(
            AuditLevel::Error,
            step,
            StepStatus::Failed,
            message.clone(),
            BTreeMap::new(),
            Some(code),
            Some(message),
        );
    }

    /// An in-progress record within a state that checks several items
    /// individually before it as a whole completes.
    pub fn detail(&mut self, step: PaStep, level: AuditLevel, message: impl Into<String>, details: BTreeMap<String, String>) {
        self.push(level, step, StepStatus::InProgress, message, details, None, None);
    }

    /// Same as [`Self::detail`] but carrying an `errorCode`.
    pub fn detail_with_error(
        &mut self,
        step: PaStep,
        level: AuditLevel,
        message: impl Into<String>,
        details: BTreeMap<String, String>,
        error_code: ErrorCode,
    ) {
        let message = message.into();
        self.push(level, step, StepStatus::InProgress, message.clone(), details, Some(error_code), Some(message));
    }

    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<AuditLogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a `details` map inline, the same shape the audit narrative
/// calls "structured key/value".
#[macro_export]
macro_rules! audit_details {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = std::collections::BTreeMap::new();
        $( map.insert($key.to_string(), $value.to_string()); )*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic_from_one() {
        let mut log = AuditLog::new();
        log.started(PaStep::VerificationStarted, "start");
        log.completed(PaStep::VerificationStarted, "started", BTreeMap::new());
        log.started(PaStep::UnwrapSod, "unwrap");
        log.failed(PaStep::UnwrapSod, ErrorCode::InvalidSodFormat, "bad envelope");

        let entries = log.into_entries();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[test]
    fn failed_entry_carries_error_code_and_message() {
        let mut log = AuditLog::new();
        log.failed(PaStep::LookupCsca, ErrorCode::CscaNotFound, "no CSCA");
        let entries = log.into_entries();
        assert_eq!(entries[0].error_code, Some(ErrorCode::CscaNotFound));
        assert_eq!(entries[0].step_status, StepStatus::Failed);
    }
}
