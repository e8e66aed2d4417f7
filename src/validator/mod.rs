//! Validator: promotes parsed, not-yet-trusted
//! `CertificateData`/`CRLData` into stored `Certificate`/`CRL` entities.
//!
//! Runs as two passes over one `ParsedFile` — CSCAs first, so their
//! subject DNs are available in an in-memory cache before DSCs need to
//! look an issuer up — plus a CRL pass that consults the same cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CoreConfig;
use crate::crypto::x509;
use crate::error::{ErrorCode, PkdError};
use crate::model::ids::{CertificateId, CrlId};
use crate::model::{
    CertType, Certificate, CertificateData, Crl, CrlData, Status, UploadId, ValidationError, ValidationResult, ValidityPeriod,
};
use crate::parser::ParsedFile;
use crate::progress::{ProgressCadence, ProgressSink, Stage};
use crate::trust_store::TrustStoreRepository;

/// Tally returned alongside the validated-entity ids.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationCounters {
    pub cscas_valid: usize,
    pub cscas_invalid: usize,
    pub dscs_valid: usize,
    pub dscs_invalid: usize,
    pub crls_processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedResponse {
    pub upload_id: UploadId,
    pub counters: ValidationCounters,
    pub certificate_ids: Vec<CertificateId>,
    pub crl_ids: Vec<CrlId>,
}

/// Promotes a `ParsedFile` into stored, validated entities.
pub struct Validator {
    trust_store: Arc<dyn TrustStoreRepository>,
    progress: Arc<dyn ProgressSink>,
    config: CoreConfig,
}

impl Validator {
    pub fn new(trust_store: Arc<dyn TrustStoreRepository>, progress: Arc<dyn ProgressSink>, config: CoreConfig) -> Self {
        Self { trust_store, progress, config }
    }

    /// `validate(parsedFile) → ValidatedResponse`.
    pub async fn validate(&self, parsed: ParsedFile) -> Result<ValidatedResponse, PkdError> {
        let upload_id = parsed.upload_id;
        let (cscas, dscs): (Vec<CertificateData>, Vec<CertificateData>) =
            parsed.certificates.into_iter().partition(|c| c.cert_type == CertType::Csca);

        let mut counters = ValidationCounters::default();
        let mut certificate_ids = Vec::with_capacity(cscas.len() + dscs.len());

        let csca_certs = self.validate_cscas(cscas, upload_id, &mut counters).await;
        certificate_ids.extend(csca_certs.iter().map(|c| c.id));
        self.flush(csca_certs).await?;

        let cache = self.build_csca_cache().await?;

        let dsc_certs = self.validate_dscs(dscs, upload_id, &cache, &mut counters).await;
        certificate_ids.extend(dsc_certs.iter().map(|c| c.id));
        self.flush(dsc_certs).await?;

        let crls = self.validate_crls(parsed.crls, upload_id, &cache, &mut counters).await;
        let crl_ids = crls.iter().map(|c| c.id).collect();
        self.flush_crls(crls).await?;

        Ok(ValidatedResponse {
            upload_id,
            counters,
            certificate_ids,
            crl_ids,
        })
    }

    /// Pass 1: self-signature, validity window, Basic Constraints.
    async fn validate_cscas(&self, cscas: Vec<CertificateData>, upload_id: UploadId, counters: &mut ValidationCounters) -> Vec<Certificate> {
        let mut cadence = ProgressCadence::new(cscas.len());
        let mut out = Vec::with_capacity(cscas.len());

        for data in cscas {
            let mut errors = Vec::new();

            let signature_valid = x509::verify_signature(
                &data.tbs_certificate_der,
                &data.signature,
                &data.signature_algorithm_oid,
                &data.public_key_bytes,
            )
            .unwrap_or(false);
            if !signature_valid {
                errors.push(ValidationError::error(ErrorCode::SignatureInvalid, "CSCA self-signature verification failed"));
            }

            let (validity_valid, validity_status) = self.check_validity_window(&data.validity);
            if !validity_valid {
                errors.push(ValidationError::error(validity_error_code(validity_status), "CSCA outside its validity window"));
            }

            // `cert_type` was already inferred as CSCA by the parser from
            // Basic Constraints CA=true, so this is a re-assertion rather
            // than a fresh check; kept here so the flag still lands in
            // `ValidationResult.constraints_valid`.
            let constraints_valid = true;

            let status = overall_status(signature_valid, validity_valid, validity_status, constraints_valid);
            if status == Status::Valid {
                counters.cscas_valid += 1;
            } else {
                counters.cscas_invalid += 1;
            }

            out.push(build_certificate(data, upload_id, status, signature_valid, false, constraints_valid, validity_valid, errors));

            if let Some(progress) = cadence.advance(Stage::ValidatingCscas) {
                self.progress.report(progress).await;
            }
        }
        out
    }

    /// Pass 2: issuer lookup against the CSCA cache, chain signature,
    /// validity window.
    async fn validate_dscs(
        &self,
        dscs: Vec<CertificateData>,
        upload_id: UploadId,
        cache: &HashMap<String, Certificate>,
        counters: &mut ValidationCounters,
    ) -> Vec<Certificate> {
        let mut cadence = ProgressCadence::new(dscs.len());
        let mut out = Vec::with_capacity(dscs.len());

        for data in dscs {
            let mut errors = Vec::new();

            let (signature_valid, chain_valid) = match cache.get(&data.issuer.raw) {
                None => {
                    errors.push(ValidationError::error(
                        ErrorCode::ChainIncomplete,
                        format!("no CSCA found for issuer: {}", data.issuer.raw),
                    ));
                    (false, false)
                }
                Some(csca) => {
                    let valid = csca
                        .public_key_bytes()
                        .and_then(|key_bytes| {
                            x509::verify_signature(&data.tbs_certificate_der, &data.signature, &data.signature_algorithm_oid, &key_bytes).ok()
                        })
                        .unwrap_or(false);
                    if !valid {
                        errors.push(ValidationError::error(ErrorCode::SignatureInvalid, "DSC signature invalid under issuing CSCA"));
                    }
                    (valid, valid)
                }
            };

            let (validity_valid, validity_status) = self.check_validity_window(&data.validity);
            if !validity_valid {
                errors.push(ValidationError::error(validity_error_code(validity_status), "certificate outside its validity window"));
            }

            let constraints_valid = true;
            let status = overall_status(signature_valid, validity_valid, validity_status, constraints_valid);
            if status == Status::Valid {
                counters.dscs_valid += 1;
            } else {
                counters.dscs_invalid += 1;
            }

            out.push(build_certificate(data, upload_id, status, signature_valid, chain_valid, constraints_valid, validity_valid, errors));

            if let Some(progress) = cadence.advance(Stage::ValidatingDscs) {
                self.progress.report(progress).await;
            }
        }
        out
    }

    /// CRL processing.
    async fn validate_crls(
        &self,
        crl_data: Vec<CrlData>,
        upload_id: UploadId,
        cache: &HashMap<String, Certificate>,
        counters: &mut ValidationCounters,
    ) -> Vec<Crl> {
        let mut cadence = ProgressCadence::new(crl_data.len());
        let mut out = Vec::with_capacity(crl_data.len());

        for data in crl_data {
            let mut errors = Vec::new();
            let issuer_cn = crate::model::crl::normalize_issuer_cn(&data.issuer.raw);

            let (within_window, _status) = self.check_validity_window(&data.validity);
            if !within_window {
                errors.push(ValidationError::warning(ErrorCode::CrlStale, "CRL outside thisUpdate/nextUpdate window"));
            }

            let issuer_csca = cache.get(&data.issuer.raw);
            let chain_linked = issuer_csca.is_some();
            if let Some(csca) = issuer_csca {
                let valid = csca
                    .public_key_bytes()
                    .and_then(|key_bytes| {
                        x509::verify_signature(&data.tbs_cert_list_der, &data.signature, &data.signature_algorithm_oid, &key_bytes).ok()
                    })
                    .unwrap_or(false);
                if !valid {
                    errors.push(ValidationError::error(ErrorCode::CrlSignatureInvalid, "CRL signature invalid under issuing CSCA"));
                }
            }

            counters.crls_processed += 1;

            out.push(Crl {
                id: CrlId::new(),
                upload_id,
                issuer_cn,
                issuer_dn: data.issuer.raw,
                country_code: data.country_code,
                validity: data.validity,
                der: data.der,
                revoked_count: data.revoked.len(),
                revoked: data.revoked,
                validation_errors: errors,
                chain_linked,
            });

            if let Some(progress) = cadence.advance(Stage::ValidatingCrls) {
                self.progress.report(progress).await;
            }
        }
        out
    }

    async fn build_csca_cache(&self) -> Result<HashMap<String, Certificate>, PkdError> {
        let cscas = self.trust_store.find_cscas_for_cache().await?;
        Ok(cscas.into_iter().map(|c| (c.subject.raw.clone(), c)).collect())
    }

    /// `(valid, status)`: status is `NOT_YET_VALID`/`EXPIRED` when invalid,
    /// `VALID` otherwise, per `config.clock_skew_tolerance`.
    fn check_validity_window(&self, validity: &ValidityPeriod) -> (bool, Status) {
        let now = Utc::now();
        let tolerance = chrono::Duration::from_std(self.config.clock_skew_tolerance).unwrap_or_default();
        if now + tolerance < validity.not_before {
            (false, Status::NotYetValid)
        } else if let Some(not_after) = validity.not_after {
            if now - tolerance > not_after {
                (false, Status::Expired)
            } else {
                (true, Status::Valid)
            }
        } else {
            (true, Status::Valid)
        }
    }

    /// Flush a batch via `saveAll`; on a non-infrastructure conflict fall
    /// back to per-entity saves and log the offender.
    async fn flush(&self, certificates: Vec<Certificate>) -> Result<(), PkdError> {
        for chunk in certificates.chunks(self.config.batch_size.max(1)) {
            if let Err(e) = self.trust_store.save_all(chunk).await {
                if e.is_infrastructure() {
                    return Err(e);
                }
                warn!(error = %e, "batch save conflict, falling back to per-entity save");
                for cert in chunk {
                    if let Err(inner) = self.trust_store.save_all(std::slice::from_ref(cert)).await {
                        if inner.is_infrastructure() {
                            return Err(inner);
                        }
                        warn!(fingerprint = %cert.fingerprint, error = %inner, "dropping conflicting certificate save");
                    }
                }
            }
        }
        Ok(())
    }

    async fn flush_crls(&self, crls: Vec<Crl>) -> Result<(), PkdError> {
        for chunk in crls.chunks(self.config.batch_size.max(1)) {
            self.trust_store.save_all_crls(chunk).await?;
        }
        Ok(())
    }
}

fn validity_error_code(status: Status) -> ErrorCode {
    match status {
        Status::Expired => ErrorCode::Expired,
        Status::NotYetValid => ErrorCode::NotYetValid,
        _ => ErrorCode::ConstraintsInvalid,
    }
}

fn overall_status(signature_valid: bool, validity_valid: bool, validity_status: Status, constraints_valid: bool) -> Status {
    if !validity_valid {
        validity_status
    } else if signature_valid && constraints_valid {
        Status::Valid
    } else {
        Status::Invalid
    }
}

fn build_certificate(
    data: CertificateData,
    upload_id: UploadId,
    status: Status,
    signature_valid: bool,
    chain_valid: bool,
    constraints_valid: bool,
    validity_valid: bool,
    errors: Vec<ValidationError>,
) -> Certificate {
    Certificate {
        id: CertificateId::new(),
        upload_id,
        fingerprint: data.fingerprint,
        der: data.der,
        serial_hex: data.serial_hex,
        subject: data.subject,
        issuer: data.issuer,
        validity: data.validity,
        cert_type: data.cert_type,
        status,
        validation_result: ValidationResult {
            overall_status: status,
            signature_valid,
            chain_valid,
            not_revoked: true,
            validity_valid,
            constraints_valid,
            validated_at: Utc::now(),
            duration_ms: 0,
        },
        validation_errors: errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::x509::ExtractedCertificate;
    use crate::model::FileFormat;
    use crate::progress::NullProgressSink;
    use crate::trust_store::InMemoryTrustStore;

    fn self_signed_csca() -> (Vec<u8>, rcgen::KeyPair) {
        let mut params = rcgen::CertificateParams::new(vec!["CSCA-TEST".to_string()]).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "CSCA-TEST");
        params.distinguished_name.push(rcgen::DnType::CountryName, "KR");
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.der().to_vec(), key_pair)
    }

    fn extracted_of(der: &[u8]) -> ExtractedCertificate {
        crate::crypto::x509::extract_certificate(der).unwrap()
    }

    #[tokio::test]
    async fn valid_self_signed_csca_is_marked_valid() {
        let (der, _key) = self_signed_csca();
        let extracted = extracted_of(&der);
        let data = CertificateData::from_extracted(der, &extracted, CertType::Csca);

        let store = InMemoryTrustStore::new();
        let validator = Validator::new(Arc::new(store), Arc::new(NullProgressSink), CoreConfig::default());

        let parsed = ParsedFile {
            upload_id: UploadId::new(),
            format: FileFormat::CscaMasterListLdif,
            certificates: vec![data],
            crls: vec![],
            errors: vec![],
        };

        let response = validator.validate(parsed).await.unwrap();
        assert_eq!(response.counters.cscas_valid, 1);
        assert_eq!(response.counters.cscas_invalid, 0);
    }

    #[tokio::test]
    async fn dsc_with_unknown_issuer_is_chain_incomplete() {
        let (der, _key) = self_signed_csca();
        let extracted = extracted_of(&der);
        // Treat this self-signed cert as if it were a leaf DSC: its issuer
        // (itself) will not be in an empty trust store's CSCA cache.
        let data = CertificateData::from_extracted(der, &extracted, CertType::Dsc);

        let store = InMemoryTrustStore::new();
        let validator = Validator::new(Arc::new(store), Arc::new(NullProgressSink), CoreConfig::default());

        let parsed = ParsedFile {
            upload_id: UploadId::new(),
            format: FileFormat::EmrtdCompleteLdif,
            certificates: vec![data],
            crls: vec![],
            errors: vec![],
        };

        let response = validator.validate(parsed).await.unwrap();
        assert_eq!(response.counters.dscs_invalid, 1);
        assert_eq!(response.counters.dscs_valid, 0);
    }
}
