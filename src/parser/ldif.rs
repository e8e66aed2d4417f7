//! RFC 2849 LDIF sub-parser.
//!
//! Handles the three attributes the core cares about per entry:
//! `userCertificate;binary` (extract a `CertificateData`),
//! `certificateRevocationList;binary` (extract a `CrlData`), and
//! `pkdMasterListContent` (recurse into the Master List sub-parser on
//! the binary value). Everything else in a record is ignored.

use base64::Engine;

use crate::config::CoreConfig;
use crate::error::PkdError;
use crate::model::{CertType, CertificateData, CrlData, DnInfo, FileFormat, ParsingError, RevokedEntry, UploadId, ValidityPeriod};
use crate::trust_store::TrustStoreRepository;

use super::{master_list, ParsedFile};

#[derive(Debug, Clone)]
struct RawAttr {
    /// Attribute name including any `;option` suffix, lowercased, used
    /// for matching (`usercertificate;binary`, `pkdmasterlistcontent`).
    name_lower: String,
    is_base64: bool,
    value: String,
}

#[derive(Debug, Clone)]
struct LdifRecord {
    dn: String,
    attrs: Vec<RawAttr>,
}

impl LdifRecord {
    fn has_attr(&self, name_lower: &str) -> bool {
        self.attrs.iter().any(|a| a.name_lower == name_lower)
    }
}

/// Normalize line endings, strip comment lines, and unfold RFC 2849
/// continuation lines (a line beginning with a single space continues
/// the previous line, with the leading space removed).
fn unfold_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    for raw_line in normalized.split('\n') {
        if raw_line.starts_with(' ') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&raw_line[1..]);
                continue;
            }
            // A continuation line with nothing to continue is a framing error,
            // surfaced by the caller finding an orphaned value line below.
        }
        if raw_line.starts_with('#') {
            continue;
        }
        lines.push(raw_line.to_string());
    }
    lines
}

/// Split `name:value`, `name::base64value`, or `name: value` (RFC 2849
/// §2: exactly one space separates the colon(s) from the value).
fn split_attr_line(line: &str) -> Result<(String, bool, String), PkdError> {
    let colon = line
        .find(':')
        .ok_or_else(|| PkdError::MalformedLdif(format!("attribute line missing ':': {line:?}")))?;
    let name = line[..colon].to_string();
    let rest = &line[colon + 1..];
    let (is_base64, value) = if let Some(stripped) = rest.strip_prefix(':') {
        (true, stripped.trim_start().to_string())
    } else {
        (false, rest.trim_start().to_string())
    };
    Ok((name, is_base64, value))
}

fn parse_ldif_text(text: &str) -> Result<Vec<LdifRecord>, PkdError> {
    let lines = unfold_lines(text);
    let mut records = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    let mut flush = |block: &mut Vec<&str>, records: &mut Vec<LdifRecord>| -> Result<(), PkdError> {
        if block.is_empty() {
            return Ok(());
        }
        let (dn_name, _, dn_value) = split_attr_line(block[0])?;
        if !dn_name.eq_ignore_ascii_case("dn") {
            return Err(PkdError::MalformedLdif(format!(
                "record does not start with 'dn:': {:?}",
                block[0]
            )));
        }
        let mut attrs = Vec::with_capacity(block.len() - 1);
        for line in &block[1..] {
            let (name, is_base64, value) = split_attr_line(line)?;
            attrs.push(RawAttr {
                name_lower: name.to_lowercase(),
                is_base64,
                value,
            });
        }
        records.push(LdifRecord { dn: dn_value, attrs });
        block.clear();
        Ok(())
    };

    for line in &lines {
        if line.is_empty() {
            flush(&mut block, &mut records)?;
        } else {
            block.push(line.as_str());
        }
    }
    flush(&mut block, &mut records)?;

    Ok(records)
}

fn decode_attr_bytes(attr: &RawAttr) -> Result<Vec<u8>, PkdError> {
    if attr.is_base64 {
        Ok(base64::engine::general_purpose::STANDARD.decode(attr.value.trim())?)
    } else {
        Ok(attr.value.as_bytes().to_vec())
    }
}

fn decode_certificate(attr: &RawAttr, dn: &str, has_conformance_text: bool) -> Result<CertificateData, ParsingError> {
    let der = decode_attr_bytes(attr).map_err(|e| ParsingError::new(e.code(), dn, e.to_string()))?;
    let extracted = crate::crypto::x509::extract_certificate(&der).map_err(|e| ParsingError::new(e.code(), dn, e.to_string()))?;

    let cert_type = if extracted.is_ca {
        CertType::Csca
    } else if has_conformance_text {
        CertType::DscNc
    } else {
        CertType::Dsc
    };

    Ok(CertificateData::from_extracted(der, &extracted, cert_type))
}

fn decode_crl(attr: &RawAttr, dn: &str) -> Result<CrlData, ParsingError> {
    let der = decode_attr_bytes(attr).map_err(|e| ParsingError::new(e.code(), dn, e.to_string()))?;
    let extracted = crate::crypto::x509::extract_crl(&der).map_err(|e| ParsingError::new(e.code(), dn, e.to_string()))?;

    Ok(CrlData {
        country_code: extracted.issuer.country.clone(),
        issuer: DnInfo::from(extracted.issuer),
        validity: ValidityPeriod {
            not_before: extracted.this_update,
            not_after: extracted.next_update,
        },
        revoked: extracted
            .revoked
            .into_iter()
            .map(|r| RevokedEntry {
                serial_hex: r.serial_hex,
                revocation_date: r.revocation_date,
                reason: r.reason,
            })
            .collect(),
        signature_algorithm_oid: extracted.signature_algorithm_oid,
        signature: extracted.signature,
        tbs_cert_list_der: extracted.tbs_cert_list_der,
        der,
    })
}

const ATTR_USER_CERTIFICATE: &str = "usercertificate;binary";
const ATTR_CRL: &str = "certificaterevocationlist;binary";
const ATTR_MASTER_LIST_CONTENT: &str = "pkdmasterlistcontent";
const ATTR_CONFORMANCE_TEXT: &str = "pkdconformancetext";

/// Entry point for every LDIF-framed `FileFormat`.
pub async fn parse(
    bytes: &[u8],
    format: FileFormat,
    upload_id: UploadId,
    config: &CoreConfig,
    trust_store: &dyn TrustStoreRepository,
) -> Result<ParsedFile, PkdError> {
    let text = std::str::from_utf8(bytes)?;
    let records = parse_ldif_text(text)?;

    let mut parsed = ParsedFile::new(upload_id, format);
    let mut candidates = Vec::new();

    for record in &records {
        let has_conformance_text = record.has_attr(ATTR_CONFORMANCE_TEXT);

        for attr in &record.attrs {
            match attr.name_lower.as_str() {
                ATTR_USER_CERTIFICATE => match decode_certificate(attr, &record.dn, has_conformance_text) {
                    Ok(data) => candidates.push(data),
                    Err(e) => parsed.errors.push(e),
                },
                ATTR_CRL => match decode_crl(attr, &record.dn) {
                    Ok(data) => parsed.crls.push(data),
                    Err(e) => parsed.errors.push(e),
                },
                ATTR_MASTER_LIST_CONTENT => match decode_attr_bytes(attr) {
                    Ok(ml_bytes) => {
                        candidates.extend(master_list::parse_embedded(&ml_bytes, config, &record.dn, &mut parsed.errors));
                    }
                    Err(e) => parsed.errors.push(ParsingError::new(e.code(), &record.dn, e.to_string())),
                },
                _ => {}
            }
        }
    }

    // Per-file dedup ("a given fingerprint appears at most once").
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(candidates.len());
    for data in candidates {
        if seen.insert(data.fingerprint.clone()) {
            deduped.push(data);
        } else {
            parsed
                .errors
                .push(ParsingError::duplicate_certificate(&data.subject.raw, data.fingerprint.as_str()));
        }
    }

    super::dedup_and_finalize(deduped, upload_id, trust_store, &mut parsed).await?;
    Ok(parsed)
}
