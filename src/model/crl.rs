//! CRL data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::certificate::{DnInfo, ValidationError, ValidityPeriod};
use crate::model::ids::{CrlId, UploadId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedEntry {
    pub serial_hex: String,
    pub revocation_date: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Parser output: a CRL extracted but not yet validated . Transient.
#[derive(Debug, Clone)]
pub struct CrlData {
    pub der: Vec<u8>,
    /// Full issuer DN, retained for signature verification.
    pub issuer: DnInfo,
    pub country_code: Option<String>,
    pub validity: ValidityPeriod,
    pub revoked: Vec<RevokedEntry>,
    pub signature_algorithm_oid: String,
    pub signature: Vec<u8>,
    pub tbs_cert_list_der: Vec<u8>,
}

/// Validated, trust-store-resident CRL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crl {
    pub id: CrlId,
    pub upload_id: UploadId,
    /// Normalized bare CN, used as the PA lookup key (e.g.
    /// `CN=CSCA-KR,C=KR` → `CSCA-KR`).
    pub issuer_cn: String,
    /// Full issuer DN, retained for the signature check against the
    /// issuing CSCA.
    pub issuer_dn: String,
    pub country_code: Option<String>,
    pub validity: ValidityPeriod,
    #[serde(with = "der_as_base64")]
    pub der: Vec<u8>,
    pub revoked_count: usize,
    pub revoked: Vec<RevokedEntry>,
    pub validation_errors: Vec<ValidationError>,
    /// Whether this CRL's issuer DN matched a CSCA in the trust store
    /// ("chain-linked"; unlinked is stored with a WARNING).
    pub chain_linked: bool,
}

impl Crl {
    /// True if `serial_hex` appears in this CRL's revoked-entry list.
    pub fn revokes_serial(&self, serial_hex: &str) -> bool {
        self.revoked.iter().any(|e| e.serial_hex.eq_ignore_ascii_case(serial_hex))
    }
}

/// Extracts the bare `CN=...` value from a full DN string, e.g.
/// `CN=CSCA-KR,C=KR` → `CSCA-KR`.
pub fn normalize_issuer_cn(dn: &str) -> String {
    dn.split(',')
        .find_map(|rdn| rdn.trim().strip_prefix("CN="))
        .unwrap_or(dn)
        .to_string()
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
