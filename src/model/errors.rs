//! Per-entity parsing error shape: attached to a `ParsedFile`
//! rather than aborting the parse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// A parse-time error or informational note, located within the source
/// blob well enough for an operator to find the offending record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingError {
    pub code: ErrorCode,
    /// Human-locatable position: an LDIF record index/DN, or a Master
    /// List certificate index.
    pub locator: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ParsingError {
    pub fn new(code: ErrorCode, locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            locator: locator.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// `DUPLICATE_CERTIFICATE` is informational: the fingerprint
    /// already existed, but the (uploadId, fingerprint) audit pair is
    /// still recorded.
    pub fn duplicate_certificate(locator: impl Into<String>, fingerprint: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateCertificate,
            locator,
            format!("certificate with fingerprint {fingerprint} already present"),
        )
    }
}
