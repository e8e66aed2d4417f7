//! Certificate data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::ids::{CertificateId, Fingerprint, UploadId};

/// Inferred classification of an ingested certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertType {
    Csca,
    Dsc,
    DscNc,
    Unknown,
}

/// Lifecycle status of a validated `Certificate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Valid,
    Invalid,
    Expired,
    NotYetValid,
    Revoked,
}

/// Severity of a `ValidationError`/`ParsingError` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
}

/// A single attached error/warning, carrying a stable taxonomy code,
/// never a raw exception message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

impl ValidationError {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Error,
            occurred_at: Utc::now(),
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Warning,
            occurred_at: Utc::now(),
        }
    }
}

/// Normalized Subject/Issuer DN components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnInfo {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    /// Uppercased ISO 3166-1 alpha-2 country code ("equals the
    /// `C=` RDN of the parsed subject, uppercased").
    pub country_code: Option<String>,
    pub raw: String,
    /// Only meaningful on `IssuerInfo`: whether the issuer's Basic
    /// Constraints declare `CA=true`.
    pub is_ca: bool,
}

impl From<crate::crypto::x509::DnComponents> for DnInfo {
    fn from(dn: crate::crypto::x509::DnComponents) -> Self {
        Self {
            common_name: dn.common_name,
            organization: dn.organization,
            organizational_unit: dn.organizational_unit,
            country_code: dn.country,
            raw: dn.raw,
            is_ca: false,
        }
    }
}

/// notBefore/notAfter (or thisUpdate/nextUpdate for CRLs), both UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub not_before: DateTime<Utc>,
    pub not_after: Option<DateTime<Utc>>,
}

/// Roll-up of the individual validity checks a `Certificate` went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub overall_status: Status,
    pub signature_valid: bool,
    pub chain_valid: bool,
    pub not_revoked: bool,
    pub validity_valid: bool,
    pub constraints_valid: bool,
    pub validated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Parser output: a certificate extracted but not yet validated
///. Transient — consumed by the validator
/// and discarded.
#[derive(Debug, Clone)]
pub struct CertificateData {
    pub der: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub subject: DnInfo,
    pub issuer: DnInfo,
    pub serial_hex: String,
    pub validity: ValidityPeriod,
    pub cert_type: CertType,
    pub country_code: Option<String>,
    pub path_len_constraint: Option<u32>,
    pub signature_algorithm_oid: String,
    pub public_key_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    pub tbs_certificate_der: Vec<u8>,
}

impl CertificateData {
    /// Build from parsed X.509 fields plus the classification inferred
    /// by the call site (LDIF infers `CertType` from Basic
    /// Constraints and `pkdConformanceText`; the Master List sub-parser
    /// has no such record metadata, so it only ever infers CSCA/UNKNOWN).
    pub fn from_extracted(
        der: Vec<u8>,
        extracted: &crate::crypto::x509::ExtractedCertificate,
        cert_type: CertType,
    ) -> Self {
        Self {
            fingerprint: Fingerprint::new(extracted.fingerprint.clone()),
            subject: DnInfo::from(extracted.subject.clone()),
            issuer: DnInfo::from(extracted.issuer.clone()),
            serial_hex: extracted.serial_hex.clone(),
            validity: ValidityPeriod {
                not_before: extracted.not_before,
                not_after: Some(extracted.not_after),
            },
            cert_type,
            country_code: extracted.subject.country.clone(),
            path_len_constraint: extracted.path_len_constraint,
            signature_algorithm_oid: extracted.signature_algorithm_oid.clone(),
            public_key_bytes: extracted.public_key_bytes.clone(),
            signature: extracted.signature.clone(),
            tbs_certificate_der: extracted.tbs_certificate_der.clone(),
            der,
        }
    }
}

/// Validated, trust-store-resident certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub upload_id: UploadId,
    pub fingerprint: Fingerprint,
    #[serde(with = "der_as_base64")]
    pub der: Vec<u8>,
    pub serial_hex: String,
    pub subject: DnInfo,
    pub issuer: DnInfo,
    pub validity: ValidityPeriod,
    pub cert_type: CertType,
    pub status: Status,
    pub validation_result: ValidationResult,
    pub validation_errors: Vec<ValidationError>,
}

impl Certificate {
    /// True when this certificate may act as a CSCA cache entry: a CSCA
    /// that is still structurally usable as a trust anchor.
    pub fn usable_as_csca(&self) -> bool {
        self.cert_type == CertType::Csca && matches!(self.status, Status::Valid | Status::Expired)
    }

    /// Re-extract this certificate's `subjectPublicKey` bytes from its
    /// retained DER. `Certificate` keeps only the fields the trust store
    /// and publisher need at rest; validator chain checks and the PA
    /// engine's trust-chain/SOD-signature steps both need the raw issuer
    /// key back, so this is the one shared place that re-parses for it.
    pub fn public_key_bytes(&self) -> Option<Vec<u8>> {
        crate::crypto::x509::extract_certificate(&self.der).ok().map(|e| e.public_key_bytes)
    }
}

mod der_as_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(der: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(der))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
