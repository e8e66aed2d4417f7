//! Trust store repository contract.
//!
//! A plain constructor-injected capability value behind a
//! `dyn TrustStoreRepository`, rather than a framework-managed DB client.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::PkdError;
use crate::model::{Certificate, Crl, Fingerprint, UploadId};

pub use memory::InMemoryTrustStore;

/// Repository of `Certificate` and `CRL` aggregates, keyed for the three
/// lookups the validator and PA engine need: fingerprint (dedup),
/// subject DN (CSCA lookup), issuer CN + country (CRL lookup).
#[async_trait]
pub trait TrustStoreRepository: Send + Sync {
    /// Bulk existence check :
    /// never call this per-entity during parsing.
    async fn find_existing_fingerprints(
        &self,
        fingerprints: &HashSet<Fingerprint>,
    ) -> Result<HashSet<Fingerprint>, PkdError>;

    /// Unique-by-fingerprint batch save. A conflict within the batch
    /// ("on unique-fingerprint conflict... fall back to
    /// per-entity save and log the conflict") is the caller's
    /// responsibility to detect via a second `find_existing_fingerprints`
    /// call; the repository itself simply upserts idempotently.
    async fn save_all(&self, certificates: &[Certificate]) -> Result<(), PkdError>;

    async fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Option<Certificate>, PkdError>;

    async fn find_by_upload_id(&self, upload_id: UploadId) -> Result<Vec<Certificate>, PkdError>;

    /// CRLs produced by a given upload, for the publisher's
    /// `publish(uploadId)`.
    async fn find_crls_by_upload_id(&self, upload_id: UploadId) -> Result<Vec<Crl>, PkdError>;

    /// CSCAs eligible for the validator's between-passes cache
    /// (`certType=CSCA` and `status IN {VALID, EXPIRED}`, REVOKED
    /// excluded).
    async fn find_cscas_for_cache(&self) -> Result<Vec<Certificate>, PkdError>;

    async fn save_all_crls(&self, crls: &[Crl]) -> Result<(), PkdError>;

    async fn find_crl_by_issuer_and_country(
        &self,
        issuer_cn: &str,
        country_code: Option<&str>,
    ) -> Result<Option<Crl>, PkdError>;

    /// Records that `fingerprint` was seen again under `upload_id`, even
    /// when it already existed.
    async fn record_upload_audit(
        &self,
        upload_id: UploadId,
        fingerprint: Fingerprint,
    ) -> Result<(), PkdError>;

    /// Number of (uploadId, fingerprint) audit rows recorded, for
    /// idempotence tests.
    async fn count_audit_rows(&self) -> Result<usize, PkdError>;
}
