//! Passive Authentication engine.
//!
//! `PaEngine::authenticate_passport` runs the nine-state Passive
//! Authentication algorithm over one presented EF.SOD plus a set of data
//! groups, narrating every transition into an [`audit::AuditLog`] so the
//! returned [`PaInvocation`] is a complete, self-contained record of
//! what happened — the same "verify once, keep the full trail" shape
//! [`crate::validator::Validator`] uses for batch validation, scaled
//! down to a single call.

pub mod audit;
pub mod dg1;
pub mod dg2;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit_details;
use crate::config::CoreConfig;
use crate::crypto::{cms, x509};
use crate::error::{ErrorCode, PkdError};
use crate::model::certificate::{Severity, ValidationError};
use crate::model::ids::PaInvocationId;
use crate::model::crl::normalize_issuer_cn;
use crate::trust_store::TrustStoreRepository;

pub use audit::{AuditLevel, AuditLog, AuditLogEntry, PaStep, StepStatus};

/// Caller-supplied context attached to a `PAInvocation` for later audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub requested_by: Option<String>,
}

/// `authenticatePassport` inputs.
#[derive(Debug, Clone)]
pub struct AuthenticatePassportRequest {
    pub sod_bytes: Vec<u8>,
    /// Presented data groups, keyed by DG number (1-16).
    pub data_groups: BTreeMap<u8, Vec<u8>>,
    pub issuing_country: Option<String>,
    pub document_number: Option<String>,
    pub request_metadata: RequestMetadata,
}

/// Outcome of one PA invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaStatus {
    Valid,
    Invalid,
    Error,
}

/// The complete, frozen record of one Passive Authentication call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaInvocation {
    pub invocation_id: PaInvocationId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub overall_status: PaStatus,
    pub certificate_chain_valid: bool,
    pub sod_signature_valid: bool,
    pub total_data_groups: usize,
    pub valid_data_groups: usize,
    pub invalid_data_groups: usize,
    pub errors: Vec<ValidationError>,
    pub audit_log: Vec<AuditLogEntry>,
}

/// A data-related failure at a fail-fast state: the invocation still
/// completes normally with `overallStatus=INVALID`, it just skips every
/// state after the one that failed.
struct DataFailure {
    code: ErrorCode,
    message: String,
}

/// An infrastructure fault: the invocation completes with
/// `overallStatus=ERROR` rather than `INVALID`.
struct InfraFailure {
    code: ErrorCode,
    message: String,
}

enum StepFailure {
    Data(DataFailure),
    Infra(InfraFailure),
}

fn classify(step: &str, e: PkdError, data_code: ErrorCode) -> StepFailure {
    if e.is_infrastructure() {
        StepFailure::Infra(InfraFailure { code: e.code(), message: format!("{step}: {e}") })
    } else {
        StepFailure::Data(DataFailure { code: data_code, message: e.to_string() })
    }
}

/// Runs the nine-state Passive Authentication algorithm.
pub struct PaEngine {
    trust_store: Arc<dyn TrustStoreRepository>,
    config: CoreConfig,
}

impl PaEngine {
    pub fn new(trust_store: Arc<dyn TrustStoreRepository>, config: CoreConfig) -> Self {
        Self { trust_store, config }
    }

    /// `authenticatePassport(request) → PAInvocation`.
    pub async fn authenticate_passport(&self, request: AuthenticatePassportRequest) -> PaInvocation {
        let invocation_id = PaInvocationId::new();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut audit = AuditLog::new();

        audit.started(PaStep::VerificationStarted, "passive authentication invocation started");
        audit.completed(
            PaStep::VerificationStarted,
            "request accepted",
            audit_details! {
                "documentNumber" => request.document_number.clone().unwrap_or_default(),
                "issuingCountry" => request.issuing_country.clone().unwrap_or_default(),
                "presentedDataGroups" => request.data_groups.keys().map(|n| n.to_string()).collect::<Vec<_>>().join(","),
            },
        );

        match self.run(&request, &mut audit).await {
            Ok(outcome) => self.finish(invocation_id, started_at, clock, audit, outcome),
            Err(failure) => self.abort(invocation_id, started_at, clock, audit, failure),
        }
    }

    /// The fail-fast prefix of the algorithm: `UNWRAP_SOD` through
    /// `VERIFY_SOD_SIGNATURE`, then the non-fail-fast `VERIFY_DG_HASHES`
    /// and `CRL_CHECK` (these two always run to completion).
    async fn run(&self, request: &AuthenticatePassportRequest, audit: &mut AuditLog) -> Result<Outcome, StepFailure> {
        let sod = self.unwrap_and_parse_sod(request, audit)?;
        let dsc = self.extract_dsc(&sod, audit)?;
        let csca = self.lookup_csca(&dsc, audit).await?;
        self.verify_trust_chain(&dsc, &csca, audit)?;
        self.verify_sod_signature(&sod, &dsc, audit)?;

        let dg_outcome = self.verify_dg_hashes(request, &sod, audit);
        let crl_outcome = self.crl_check(&dsc, &csca, audit).await?;

        Ok(Outcome {
            certificate_chain_valid: true,
            sod_signature_valid: true,
            dg_outcome,
            crl_outcome,
        })
    }

    // -- UNWRAP_SOD + EXTRACT_DSC + EXTRACT_DG_HASHES --------------------
    //
    // `cms::parse_sod` performs all three structural steps in one pass
    // (envelope unwrap, CMS decode, LDSSecurityObject decode); it is
    // split back into its own states here purely for audit narration,
    // re-running the cheap envelope check once more to report it on its
    // own line.

    fn unwrap_and_parse_sod(&self, request: &AuthenticatePassportRequest, audit: &mut AuditLog) -> Result<cms::ParsedSod, StepFailure> {
        audit.started(PaStep::UnwrapSod, "unwrapping EF.SOD envelope");
        match crate::crypto::asn1::unwrap_application_tag(&request.sod_bytes, 23) {
            Ok(Some(_)) => audit.completed(PaStep::UnwrapSod, "unwrapped [APPLICATION 23] envelope", BTreeMap::new()),
            Ok(None) => audit.completed(PaStep::UnwrapSod, "no envelope present, already CMS ContentInfo", BTreeMap::new()),
            Err(e) => {
                audit.failed(PaStep::UnwrapSod, ErrorCode::InvalidSodFormat, e.to_string());
                return Err(StepFailure::Data(DataFailure { code: ErrorCode::InvalidSodFormat, message: e.to_string() }));
            }
        }

        audit.started(PaStep::ExtractDsc, "parsing CMS SignedData and extracting DSC");
        match cms::parse_sod(&request.sod_bytes) {
            Ok(sod) if sod.dsc_candidates.is_empty() => {
                audit.failed(PaStep::ExtractDsc, ErrorCode::DscExtractionFailed, "SOD certificate set is empty");
                Err(StepFailure::Data(DataFailure {
                    code: ErrorCode::DscExtractionFailed,
                    message: "SOD certificate set is empty".into(),
                }))
            }
            Ok(sod) => Ok(sod),
            Err(e) => {
                let failure = classify("EXTRACT_DSC", e, ErrorCode::DscExtractionFailed);
                match &failure {
                    StepFailure::Data(f) => audit.failed(PaStep::ExtractDsc, f.code, f.message.clone()),
                    StepFailure::Infra(f) => audit.failed(PaStep::ExtractDsc, f.code, f.message.clone()),
                }
                Err(failure)
            }
        }
    }

    fn extract_dsc(&self, sod: &cms::ParsedSod, audit: &mut AuditLog) -> Result<x509::ExtractedCertificate, StepFailure> {
        // EXTRACT_DSC is a single state ("first certificate in the CMS
        // certificate set is the DSC"); DER
        // re-parsing happens here rather than inside `unwrap_and_parse_sod`
        // so a structurally-invalid DSC reports under the same state name.
        let der = &sod.dsc_candidates[0];
        match x509::extract_certificate(der) {
            Ok(dsc) => {
                audit.completed(
                    PaStep::ExtractDsc,
                    "DSC extracted",
                    audit_details! {
                        "subject" => dsc.subject.raw.clone(),
                        "issuer" => dsc.issuer.raw.clone(),
                    },
                );
                Ok(dsc)
            }
            Err(e) => {
                audit.failed(PaStep::ExtractDsc, ErrorCode::DscExtractionFailed, e.to_string());
                Err(StepFailure::Data(DataFailure { code: ErrorCode::DscExtractionFailed, message: e.to_string() }))
            }
        }
    }

    async fn lookup_csca(&self, dsc: &x509::ExtractedCertificate, audit: &mut AuditLog) -> Result<crate::model::Certificate, StepFailure> {
        audit.started(PaStep::LookupCsca, format!("looking up CSCA for issuer {}", dsc.issuer.raw));
        // The DSC is taken from the SOD itself, never looked up in the
        // directory — only the CSCA is resolved against the trust store.
        match self.trust_store.find_by_subject_dn(&dsc.issuer.raw).await {
            Ok(Some(csca)) => {
                audit.completed(PaStep::LookupCsca, "CSCA found", audit_details! { "issuer" => dsc.issuer.raw.clone() });
                Ok(csca)
            }
            Ok(None) => {
                let message = format!("no CSCA in trust store for issuer: {}", dsc.issuer.raw);
                audit.failed(PaStep::LookupCsca, ErrorCode::CscaNotFound, message.clone());
                Err(StepFailure::Data(DataFailure { code: ErrorCode::CscaNotFound, message }))
            }
            Err(e) => {
                let failure = classify("LOOKUP_CSCA", e, ErrorCode::CscaNotFound);
                match &failure {
                    StepFailure::Data(f) => audit.failed(PaStep::LookupCsca, f.code, f.message.clone()),
                    StepFailure::Infra(f) => audit.failed(PaStep::LookupCsca, f.code, f.message.clone()),
                }
                Err(failure)
            }
        }
    }

    fn verify_trust_chain(
        &self,
        dsc: &x509::ExtractedCertificate,
        csca: &crate::model::Certificate,
        audit: &mut AuditLog,
    ) -> Result<(), StepFailure> {
        audit.started(PaStep::VerifyTrustChain, "verifying DSC signature and validity under CSCA");

        let tolerance = chrono::Duration::from_std(self.config.clock_skew_tolerance).unwrap_or_default();
        let now = Utc::now();
        let within_validity = now + tolerance >= dsc.not_before && now - tolerance <= dsc.not_after;

        let signature_valid = csca
            .public_key_bytes()
            .and_then(|key_bytes| x509::verify_signature(&dsc.tbs_certificate_der, &dsc.signature, &dsc.signature_algorithm_oid, &key_bytes).ok())
            .unwrap_or(false);

        if !within_validity {
            let message = "DSC is outside its notBefore/notAfter validity window";
            audit.failed(PaStep::VerifyTrustChain, ErrorCode::TrustChainInvalid, message);
            return Err(StepFailure::Data(DataFailure { code: ErrorCode::TrustChainInvalid, message: message.into() }));
        }
        if !signature_valid {
            let message = "DSC signature does not verify under the CSCA's public key";
            audit.failed(PaStep::VerifyTrustChain, ErrorCode::TrustChainInvalid, message);
            return Err(StepFailure::Data(DataFailure { code: ErrorCode::TrustChainInvalid, message: message.into() }));
        }

        audit.completed(PaStep::VerifyTrustChain, "DSC chains to a trusted CSCA", BTreeMap::new());
        Ok(())
    }

    fn verify_sod_signature(&self, sod: &cms::ParsedSod, dsc: &x509::ExtractedCertificate, audit: &mut AuditLog) -> Result<(), StepFailure> {
        audit.started(PaStep::VerifySodSignature, "verifying SOD signature under DSC");
        let valid = x509::verify_signature(&sod.signed_message, &sod.signature, &sod.signature_algorithm_oid, &dsc.public_key_bytes).unwrap_or(false);
        if !valid {
            let message = "EF.SOD signature does not verify under the DSC's public key";
            audit.failed(PaStep::VerifySodSignature, ErrorCode::SodSignatureInvalid, message);
            return Err(StepFailure::Data(DataFailure { code: ErrorCode::SodSignatureInvalid, message: message.into() }));
        }
        audit.completed(PaStep::VerifySodSignature, "SOD signature verified", BTreeMap::new());
        Ok(())
    }

    /// `VERIFY_DG_HASHES`: never fail-fast. Every
    /// presented data group is checked; declared-but-absent DGs are
    /// WARNINGs; presented-but-undeclared DGs are `UNDECLARED_DATA_GROUP`
    /// ERRORs counted as invalid.
    fn verify_dg_hashes(&self, request: &AuthenticatePassportRequest, sod: &cms::ParsedSod, audit: &mut AuditLog) -> DgOutcome {
        audit.started(
            PaStep::ExtractDgHashes,
            format!("decoded LDSSecurityObject declaring {} data group(s)", sod.lds_security_object.declared_data_groups().len()),
        );
        audit.completed(
            PaStep::ExtractDgHashes,
            "data group hash list extracted",
            audit_details! { "hashAlgorithm" => sod.lds_security_object.hash_algorithm.oid.to_string() },
        );

        audit.started(PaStep::VerifyDgHashes, "comparing presented data groups against declared hashes");

        let mut valid = 0usize;
        let mut invalid = 0usize;
        let mut errors = Vec::new();

        for (&dg_number, dg_bytes) in &request.data_groups {
            match sod.lds_security_object.hash_for_dg(dg_number) {
                None => {
                    invalid += 1;
                    let message = format!("DG{dg_number} presented but not declared in EF.SOD");
                    errors.push(ValidationError::error(ErrorCode::UndeclaredDataGroup, message.clone()));
                    audit.detail_with_error(
                        PaStep::VerifyDgHashes,
                        AuditLevel::Error,
                        message,
                        audit_details! { "dataGroup" => dg_number.to_string() },
                        ErrorCode::UndeclaredDataGroup,
                    );
                }
                Some(expected) => {
                    let dg_hash_algorithm_oid = sod.lds_security_object.hash_algorithm.oid.to_string();
                    let actual = cms::hash_with_algorithm(&dg_hash_algorithm_oid, dg_bytes).unwrap_or_default();
                    if x509::constant_time_eq(expected, &actual) {
                        valid += 1;
                        audit.detail(
                            PaStep::VerifyDgHashes,
                            AuditLevel::Info,
                            format!("DG{dg_number} hash matched"),
                            audit_details! { "dataGroup" => dg_number.to_string() },
                        );
                    } else {
                        invalid += 1;
                        let message = format!("DG{dg_number} hash mismatch");
                        errors.push(ValidationError::error(ErrorCode::DataGroupHashMismatch, message.clone()));
                        audit.detail_with_error(
                            PaStep::VerifyDgHashes,
                            AuditLevel::Error,
                            message,
                            audit_details! {
                                "dataGroup" => dg_number.to_string(),
                                "expected" => hex::encode(expected),
                                "actual" => hex::encode(&actual),
                            },
                            ErrorCode::DataGroupHashMismatch,
                        );
                    }
                }
            }
        }

        for declared_dg in sod.lds_security_object.declared_data_groups() {
            if !request.data_groups.contains_key(&declared_dg) {
                audit.detail(
                    PaStep::VerifyDgHashes,
                    AuditLevel::Warn,
                    format!("DG{declared_dg} declared in EF.SOD but not presented"),
                    audit_details! { "dataGroup" => declared_dg.to_string() },
                );
            }
        }

        let total = request.data_groups.len();
        if invalid == 0 {
            audit.completed(
                PaStep::VerifyDgHashes,
                "all presented data groups verified",
                audit_details! { "valid" => valid.to_string(), "invalid" => invalid.to_string() },
            );
        } else {
            audit.completed_with_level(
                PaStep::VerifyDgHashes,
                AuditLevel::Error,
                "one or more presented data groups failed verification",
                audit_details! { "valid" => valid.to_string(), "invalid" => invalid.to_string() },
            );
        }

        DgOutcome { total, valid, invalid, errors }
    }

    /// `CRL_CHECK`: best-effort, never fails the
    /// invocation over a missing CRL unless `strict_crl_mode` promotes it.
    async fn crl_check(&self, dsc: &x509::ExtractedCertificate, csca: &crate::model::Certificate, audit: &mut AuditLog) -> Result<CrlOutcome, StepFailure> {
        audit.started(PaStep::CrlCheck, "checking DSC revocation status");

        let issuer_cn = normalize_issuer_cn(&csca.subject.raw);
        let country = csca.subject.country_code.as_deref();

        let lookup = self
            .trust_store
            .find_crl_by_issuer_and_country(&issuer_cn, country)
            .await
            .map_err(|e| classify("CRL_CHECK", e, ErrorCode::CrlUnavailable))?;

        match lookup {
            None => {
                let message = format!("no CRL available for issuer {issuer_cn}");
                if self.config.strict_crl_mode {
                    audit.failed(PaStep::CrlCheck, ErrorCode::CrlUnavailable, message.clone());
                    Ok(CrlOutcome::Unavailable { error: Some(ValidationError::error(ErrorCode::CrlUnavailable, message)) })
                } else {
                    audit.completed_with_level(PaStep::CrlCheck, AuditLevel::Warn, message.clone(), BTreeMap::new());
                    Ok(CrlOutcome::Unavailable { error: None })
                }
            }
            Some(crl) if crl.revokes_serial(&dsc.serial_hex) => {
                let message = format!("DSC serial {} is revoked", dsc.serial_hex);
                audit.failed(PaStep::CrlCheck, ErrorCode::CertificateRevoked, message.clone());
                Ok(CrlOutcome::Revoked { error: ValidationError::error(ErrorCode::CertificateRevoked, message) })
            }
            Some(_) => {
                audit.completed(PaStep::CrlCheck, "DSC not present in CRL", BTreeMap::new());
                Ok(CrlOutcome::Clean)
            }
        }
    }

    fn finish(&self, invocation_id: PaInvocationId, started_at: DateTime<Utc>, clock: Instant, mut audit: AuditLog, outcome: Outcome) -> PaInvocation {
        let mut errors = outcome.dg_outcome.errors;
        let crl_error = match outcome.crl_outcome {
            CrlOutcome::Clean => None,
            CrlOutcome::Unavailable { error } => error,
            CrlOutcome::Revoked { error } => Some(error),
        };
        let revoked = crl_error.as_ref().map(|e| e.code == ErrorCode::CertificateRevoked).unwrap_or(false);
        if let Some(e) = crl_error {
            errors.push(e);
        }

        let overall_status = if revoked || outcome.dg_outcome.invalid > 0 || errors.iter().any(|e| e.severity == Severity::Error) {
            PaStatus::Invalid
        } else {
            PaStatus::Valid
        };

        audit.started(PaStep::VerificationCompleted, "finalizing invocation");
        audit.completed(
            PaStep::VerificationCompleted,
            "passive authentication invocation completed",
            audit_details! { "overallStatus" => format!("{overall_status:?}") },
        );

        let completed_at = Utc::now();
        PaInvocation {
            invocation_id,
            started_at,
            completed_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            overall_status,
            certificate_chain_valid: outcome.certificate_chain_valid,
            sod_signature_valid: outcome.sod_signature_valid,
            total_data_groups: outcome.dg_outcome.total,
            valid_data_groups: outcome.dg_outcome.valid,
            invalid_data_groups: outcome.dg_outcome.invalid,
            errors,
            audit_log: audit.into_entries(),
        }
    }

    fn abort(&self, invocation_id: PaInvocationId, started_at: DateTime<Utc>, clock: Instant, mut audit: AuditLog, failure: StepFailure) -> PaInvocation {
        let (overall_status, code, message) = match failure {
            StepFailure::Data(f) => (PaStatus::Invalid, f.code, f.message),
            StepFailure::Infra(f) => (PaStatus::Error, f.code, f.message),
        };

        audit.started(PaStep::VerificationCompleted, "finalizing invocation after early failure");
        audit.completed_with_level(
            PaStep::VerificationCompleted,
            AuditLevel::Error,
            "passive authentication invocation aborted",
            audit_details! { "overallStatus" => format!("{overall_status:?}") },
        );

        let completed_at = Utc::now();
        PaInvocation {
            invocation_id,
            started_at,
            completed_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            overall_status,
            certificate_chain_valid: false,
            sod_signature_valid: false,
            total_data_groups: 0,
            valid_data_groups: 0,
            invalid_data_groups: 0,
            errors: vec![ValidationError::error(code, message)],
            audit_log: audit.into_entries(),
        }
    }
}

struct DgOutcome {
    total: usize,
    valid: usize,
    invalid: usize,
    errors: Vec<ValidationError>,
}

enum CrlOutcome {
    Clean,
    Unavailable { error: Option<ValidationError> },
    Revoked { error: ValidationError },
}

struct Outcome {
    certificate_chain_valid: bool,
    sod_signature_valid: bool,
    dg_outcome: DgOutcome,
    crl_outcome: CrlOutcome,
}
