//! Directory publication: translate validated `Certificate`/
//! `Crl` entities into directory entries with deterministic DNs, and
//! upsert them idempotently.
//!
//! `DirectoryClient` is expressed as an `async_trait` — one capability
//! value injected at construction, the wire protocol (an LDAP-compatible
//! directory) never leaking into this module's types.

pub mod dn;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::error::PkdError;
use crate::model::{CertType, Certificate, Crl, Status, UploadId};
use crate::trust_store::TrustStoreRepository;

pub use memory::InMemoryDirectoryClient;

/// One directory entry, already shaped for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub object_class: Vec<&'static str>,
    pub cn: String,
    pub sn: Option<String>,
    pub description: String,
    pub binary_attribute_name: &'static str,
    pub binary_value: Vec<u8>,
    pub country_code: String,
}

/// Outcome of upserting one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    AlreadyExists,
}

/// LDAP-compatible directory wire contract.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn add_entry(&self, entry: &DirectoryEntry) -> Result<UpsertOutcome, PkdError>;

    /// Batched write . A non-infrastructure
    /// error here triggers the publisher's per-entry fallback; an
    /// infrastructure error aborts the call.
    async fn add_batch(&self, entries: &[DirectoryEntry]) -> Result<Vec<UpsertOutcome>, PkdError>;
}

/// Result of one `publish` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PublishResponse {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Publishes every validated entity from one upload into the directory
///. All-or-none by status: INVALID/EXPIRED entities are
/// published the same as VALID ones, distinguished only by `description`.
pub struct Publisher {
    trust_store: Arc<dyn TrustStoreRepository>,
    directory: Arc<dyn DirectoryClient>,
    config: CoreConfig,
    base_dn: String,
}

impl Publisher {
    pub fn new(
        trust_store: Arc<dyn TrustStoreRepository>,
        directory: Arc<dyn DirectoryClient>,
        config: CoreConfig,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            trust_store,
            directory,
            config,
            base_dn: base_dn.into(),
        }
    }

    /// Publish every `Certificate`/`Crl` produced by `upload_id`
    /// (`publish(uploadId) → PublishResponse`).
    pub async fn publish(&self, upload_id: UploadId) -> Result<PublishResponse, PkdError> {
        let certificates = self.trust_store.find_by_upload_id(upload_id).await?;
        let crls = self.trust_store.find_crls_by_upload_id(upload_id).await?;

        let mut entries: Vec<DirectoryEntry> = Vec::with_capacity(certificates.len() + crls.len());
        entries.extend(certificates.iter().map(|c| self.certificate_entry(c)));
        entries.extend(crls.iter().map(|c| self.crl_entry(c)));

        info!(upload_id = %upload_id, entries = entries.len(), "publishing upload");

        let mut response = PublishResponse::default();
        for chunk in entries.chunks(self.config.directory_batch_size) {
            self.publish_chunk(chunk, &mut response).await?;
        }
        Ok(response)
    }

    async fn publish_chunk(
        &self,
        chunk: &[DirectoryEntry],
        response: &mut PublishResponse,
    ) -> Result<(), PkdError> {
        match self.directory.add_batch(chunk).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    tally(outcome, response);
                }
                Ok(())
            }
            Err(e) if e.is_infrastructure() => Err(e),
            Err(e) => {
                warn!(error = %e, "directory batch write failed, falling back to per-entry");
                for entry in chunk {
                    match self.directory.add_entry(entry).await {
                        Ok(outcome) => tally(outcome, response),
                        Err(e) if e.is_infrastructure() => return Err(e),
                        Err(e) => {
                            warn!(dn = %entry.dn, error = %e, "entry publish failed");
                            response.failed += 1;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn certificate_entry(&self, cert: &Certificate) -> DirectoryEntry {
        let class = match cert.cert_type {
            CertType::Csca => dn::ArtifactClass::Csca,
            _ => dn::ArtifactClass::Dsc,
        };
        let country_code = cert.subject.country_code.clone().unwrap_or_default();
        let messages: Vec<String> = cert.validation_errors.iter().map(|e| e.message.clone()).collect();
        DirectoryEntry {
            dn: dn::certificate_dn(class, &cert.subject.raw, &cert.serial_hex, &country_code, &self.base_dn),
            object_class: vec!["top", "pkiUser"],
            cn: cert.subject.raw.clone(),
            sn: Some(cert.serial_hex.clone()),
            description: status_description(cert.status, &messages),
            binary_attribute_name: "userCertificate;binary",
            binary_value: cert.der.clone(),
            country_code,
        }
    }

    fn crl_entry(&self, crl: &Crl) -> DirectoryEntry {
        let country_code = crl.country_code.clone().unwrap_or_default();
        let messages: Vec<String> = crl.validation_errors.iter().map(|e| e.message.clone()).collect();
        DirectoryEntry {
            dn: dn::crl_dn(&crl.issuer_dn, &country_code, &self.base_dn),
            object_class: vec!["top", "pkiCA"],
            cn: crl.issuer_dn.clone(),
            sn: None,
            description: if messages.is_empty() {
                "VALID".to_string()
            } else {
                messages.join("; ")
            },
            binary_attribute_name: "certificateRevocationList;binary",
            binary_value: crl.der.clone(),
            country_code,
        }
    }
}

fn tally(outcome: UpsertOutcome, response: &mut PublishResponse) {
    match outcome {
        UpsertOutcome::Created => response.uploaded += 1,
        UpsertOutcome::AlreadyExists => response.skipped += 1,
    }
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Valid => "VALID",
        Status::Invalid => "INVALID",
        Status::Expired => "EXPIRED",
        Status::NotYetValid => "NOT_YET_VALID",
        Status::Revoked => "REVOKED",
    }
}

/// `"VALID"` when the overall status is VALID, else `"<STATUS>: <err1>;
/// <err2>; ..."`.
fn status_description(status: Status, messages: &[String]) -> String {
    if status == Status::Valid {
        return "VALID".to_string();
    }
    let label = status_label(status);
    if messages.is_empty() {
        label.to_string()
    } else {
        format!("{label}: {}", messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_status_ignores_messages() {
        assert_eq!(status_description(Status::Valid, &["ignored".into()]), "VALID");
    }

    #[test]
    fn invalid_status_joins_messages() {
        let desc = status_description(Status::Expired, &["cert expired".into(), "chain incomplete".into()]);
        assert_eq!(desc, "EXPIRED: cert expired; chain incomplete");
    }

    #[test]
    fn invalid_status_without_messages_is_bare_label() {
        assert_eq!(status_description(Status::Revoked, &[]), "REVOKED");
    }
}
