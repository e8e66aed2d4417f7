//! Data model shared by the parser, validator, publisher, and PA engine.

pub mod certificate;
pub mod crl;
pub mod errors;
pub mod ids;

pub use certificate::{Certificate, CertificateData, CertType, DnInfo, Status, ValidationError, ValidationResult, ValidityPeriod, Severity};
pub use crl::{Crl, CrlData, RevokedEntry};
pub use errors::ParsingError;
pub use ids::{CertificateId, CrlId, Fingerprint, PaInvocationId, UploadId};

/// Tag distinguishing the ingest formats the parser accepts . Selects the parser strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    EmrtdCompleteLdif,
    EmrtdDeltaLdif,
    CscaMasterListLdif,
    MasterListSignedCms,
    DscNonConformingLdif,
}

impl FileFormat {
    /// Whether this format's bytes are framed as LDIF text vs. raw CMS.
    pub fn is_ldif(&self) -> bool {
        !matches!(self, FileFormat::MasterListSignedCms)
    }
}
