//! Error types for the PKD core.
//!
//! `PkdError` is the `?`-propagated error for calls that can only
//! succeed or fail as a whole (a single certificate parse, a signature
//! check, a repository round-trip). It is deliberately coarser than the
//! structured per-entity error list the parser/validator/PA engine
//! attach to batches and invocations — see [`ErrorCode`] for the
//! taxonomy those use, and `crate::model::errors` for the attached-error
//! shapes themselves.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, PkdError>;

/// The error-kind taxonomy from the error handling design: codes, not
/// types, so that parser/validator/PA results can carry a stable,
/// serializable classification independent of whatever Rust error value
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Parsing
    InvalidFileFormat,
    MalformedLdif,
    CertParseError,
    CrlParseError,
    MasterListCmsParseError,
    DuplicateCertificate,

    // Validation
    SignatureInvalid,
    ChainIncomplete,
    Expired,
    NotYetValid,
    ConstraintsInvalid,
    CrlStale,
    CrlSignatureInvalid,

    // Passive Authentication
    InvalidSodFormat,
    DscExtractionFailed,
    CscaNotFound,
    TrustChainInvalid,
    SodSignatureInvalid,
    DataGroupHashMismatch,
    UndeclaredDataGroup,
    CertificateRevoked,
    CrlUnavailable,

    // Infrastructure
    RepositoryUnavailable,
    DirectoryUnavailable,
    Timeout,
    Cancelled,
}

/// Main error type for core operations.
///
/// Raw cryptographic/parsing exception messages are wrapped here rather
/// than leaked verbatim; callers that need the taxonomy code for a
/// structured response use [`PkdError::code`].
#[derive(Error, Debug)]
pub enum PkdError {
    /// The top-level container (LDIF file, Master List, upload) is not a
    /// recognized format at all.
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// LDIF-specific structural error (unterminated continuation line,
    /// missing `dn:` attribute, bad base64 in a `;binary::` value).
    #[error("malformed LDIF: {0}")]
    MalformedLdif(String),

    /// X.509 certificate DER could not be parsed.
    #[error("certificate parse error: {0}")]
    CertParse(String),

    /// X.509 CRL DER could not be parsed.
    #[error("CRL parse error: {0}")]
    CrlParse(String),

    /// CMS `SignedData` (Master List or EF.SOD) could not be parsed.
    #[error("CMS parse error: {0}")]
    CmsParse(String),

    /// A signature algorithm OID outside the ICAO 9303-legal set
    /// (RSA-PKCS1, RSA-PSS, ECDSA, Ed25519).
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedSignatureAlgorithm(String),

    /// EF.SOD envelope or its encapsulated `LDSSecurityObject` is
    /// structurally invalid.
    #[error("invalid EF.SOD format: {0}")]
    InvalidSodFormat(String),

    /// The DSC could not be extracted from the SOD's CMS certificate set.
    #[error("DSC extraction failed: {0}")]
    DscExtractionFailed(String),

    /// No CSCA in the trust store matches the DSC's issuer DN.
    #[error("CSCA not found for issuer: {0}")]
    CscaNotFound(String),

    /// A presented data group is not declared in the SOD's hash list.
    #[error("undeclared data group: {0}")]
    UndeclaredDataGroup(u8),

    /// DG1 (MRZ) structure or check digits are invalid.
    #[error("invalid DG1 (MRZ): {0}")]
    InvalidDg1(String),

    /// DG2 (face image) structure is invalid.
    #[error("invalid DG2 (face image): {0}")]
    InvalidDg2(String),

    /// The trust store repository is unreachable or returned a fault.
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// The directory (publisher) backend is unreachable or returned a fault.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A call exceeded its configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// The caller canceled the operation at a cancellation boundary.
    #[error("operation cancelled")]
    Cancelled,

    /// Startup-time configuration is invalid ("fail startup,
    /// not mid-PA").
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Base64 decoding failed (LDIF `;binary::` values, DG payloads).
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// UTF-8 decoding failed while framing an LDIF record.
    #[error("UTF-8 decode error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON (de)serialization of audit logs / responses failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error reading an uploaded file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic ASN.1 tag/length traversal error (see [`crate::crypto::asn1`]).
    #[error("ASN.1 error: {0}")]
    Asn1(#[from] crate::crypto::asn1::Asn1Error),

    /// Anything else, wrapped rather than leaked verbatim.
    #[error("{0}")]
    Other(String),
}

impl PkdError {
    /// The stable taxonomy code for this error, for structured
    /// per-entity error lists and audit log entries.
    pub fn code(&self) -> ErrorCode {
        match self {
            PkdError::InvalidFileFormat(_) => ErrorCode::InvalidFileFormat,
            PkdError::MalformedLdif(_) => ErrorCode::MalformedLdif,
            PkdError::CertParse(_) => ErrorCode::CertParseError,
            PkdError::CrlParse(_) => ErrorCode::CrlParseError,
            PkdError::CmsParse(_) => ErrorCode::MasterListCmsParseError,
            PkdError::UnsupportedSignatureAlgorithm(_) => ErrorCode::SignatureInvalid,
            PkdError::InvalidSodFormat(_) => ErrorCode::InvalidSodFormat,
            PkdError::DscExtractionFailed(_) => ErrorCode::DscExtractionFailed,
            PkdError::CscaNotFound(_) => ErrorCode::CscaNotFound,
            PkdError::UndeclaredDataGroup(_) => ErrorCode::UndeclaredDataGroup,
            PkdError::InvalidDg1(_) => ErrorCode::InvalidSodFormat,
            PkdError::InvalidDg2(_) => ErrorCode::InvalidSodFormat,
            PkdError::RepositoryUnavailable(_) => ErrorCode::RepositoryUnavailable,
            PkdError::DirectoryUnavailable(_) => ErrorCode::DirectoryUnavailable,
            PkdError::Timeout => ErrorCode::Timeout,
            PkdError::Cancelled => ErrorCode::Cancelled,
            PkdError::Configuration(_) => ErrorCode::RepositoryUnavailable,
            PkdError::Base64(_) => ErrorCode::MalformedLdif,
            PkdError::Utf8(_) => ErrorCode::MalformedLdif,
            PkdError::Serialization(_) => ErrorCode::InvalidFileFormat,
            PkdError::Io(_) => ErrorCode::RepositoryUnavailable,
            PkdError::Asn1(_) => ErrorCode::InvalidSodFormat,
            PkdError::Other(_) => ErrorCode::InvalidFileFormat,
        }
    }

    /// True for the infrastructure-kind errors that abort the current
    /// call rather than attaching to an entity and continuing the batch
    ///.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::RepositoryUnavailable
                | ErrorCode::DirectoryUnavailable
                | ErrorCode::Timeout
                | ErrorCode::Cancelled
        )
    }
}
