//! CMS Master List sub-parser.
//!
//! Decodes a `SignedData` envelope and emits one `CertificateData` per
//! embedded CSCA, as if it had been parsed from LDIF. Signature
//! verification against a configured trust anchor is best-effort: an
//! absent or failing anchor degrades to a `WARNING`, never a hard abort.

use crate::config::CoreConfig;
use crate::crypto::{cms, x509};
use crate::error::ErrorCode;
use crate::error::PkdError;
use crate::model::{CertType, CertificateData, FileFormat, ParsingError, UploadId};
use crate::trust_store::TrustStoreRepository;

use super::ParsedFile;

fn build_certificate_data(der: Vec<u8>) -> Result<CertificateData, PkdError> {
    let extracted = x509::extract_certificate(&der)?;
    // The Master List carries only CSCAs; anything self-signed-shaped is
    // treated as one, everything else is UNKNOWN rather than guessed at
    //.
    let cert_type = if extracted.is_ca { CertType::Csca } else { CertType::Unknown };
    Ok(CertificateData::from_extracted(der, &extracted, cert_type))
}

/// Best-effort CMS signature verification against `config`'s configured
/// trust anchor. Never returns an error to the caller: every outcome
/// (no anchor configured, signature mismatch, parse failure) becomes a
/// `ParsingError` pushed onto `errors`.
fn verify_trust_anchor(der_bytes: &[u8], config: &CoreConfig, locator: &str, errors: &mut Vec<ParsingError>) {
    match &config.master_list_trust_anchor {
        None => errors.push(ParsingError::new(
            ErrorCode::MasterListCmsParseError,
            locator,
            "no Master List trust anchor configured; CMS signature not verified",
        )),
        Some(anchor_der) => match cms::verify_signed_data_signature(der_bytes, anchor_der) {
            Ok(true) => {}
            Ok(false) => errors.push(ParsingError::new(
                ErrorCode::MasterListCmsParseError,
                locator,
                "Master List CMS signature verification failed",
            )),
            Err(e) => errors.push(ParsingError::new(e.code(), locator, e.to_string())),
        },
    }
}

/// Walk every `CertificateChoices` the embedded `SET OF Certificate`
/// contains ("traverse every level of SET/SEQUENCE nesting
/// observed and skip non-certificate elements silently") and build one
/// `CertificateData` per CSCA, attaching a `ParsingError` (not aborting)
/// for any certificate that fails to parse.
pub fn parse_embedded(
    bytes: &[u8],
    config: &CoreConfig,
    locator: &str,
    errors: &mut Vec<ParsingError>,
) -> Vec<CertificateData> {
    verify_trust_anchor(bytes, config, locator, errors);

    let der_list = match cms::parse_master_list(bytes) {
        Ok(list) => list,
        Err(e) => {
            errors.push(ParsingError::new(e.code(), locator, e.to_string()));
            return Vec::new();
        }
    };

    der_list
        .into_iter()
        .enumerate()
        .filter_map(|(i, der)| match build_certificate_data(der) {
            Ok(data) => Some(data),
            Err(e) => {
                errors.push(ParsingError::new(e.code(), format!("{locator}[{i}]"), e.to_string()));
                None
            }
        })
        .collect()
}

/// Top-level entry point for `FileFormat::MasterListSignedCms`.
pub async fn parse(
    bytes: &[u8],
    upload_id: UploadId,
    config: &CoreConfig,
    trust_store: &dyn TrustStoreRepository,
) -> Result<ParsedFile, PkdError> {
    let mut parsed = ParsedFile::new(upload_id, FileFormat::MasterListSignedCms);
    let candidates = parse_embedded(bytes, config, "masterList", &mut parsed.errors);
    super::dedup_and_finalize(candidates, upload_id, trust_store, &mut parsed).await?;
    Ok(parsed)
}
