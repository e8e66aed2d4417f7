//! Reference in-memory [`TrustStoreRepository`], used by tests and as
//! the default when no persistence backend is wired in. A plain
//! `Arc<RwLock<HashMap<...>>>` index, no disk-backed persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::TrustStoreRepository;
use crate::error::PkdError;
use crate::model::{Certificate, Crl, Fingerprint, UploadId};

#[derive(Default)]
struct State {
    certificates: HashMap<Fingerprint, Certificate>,
    crls: Vec<Crl>,
    audit_rows: Vec<(UploadId, Fingerprint)>,
}

/// In-memory trust store. Safe to share across concurrent readers/writers
/// : all mutation goes through a single
/// `RwLock`, so concurrent writers conflicting on the same fingerprint
/// simply serialize rather than corrupt state.
#[derive(Default, Clone)]
pub struct InMemoryTrustStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrustStoreRepository for InMemoryTrustStore {
    async fn find_existing_fingerprints(
        &self,
        fingerprints: &HashSet<Fingerprint>,
    ) -> Result<HashSet<Fingerprint>, PkdError> {
        let state = self.state.read().await;
        Ok(fingerprints
            .iter()
            .filter(|fp| state.certificates.contains_key(*fp))
            .cloned()
            .collect())
    }

    async fn save_all(&self, certificates: &[Certificate]) -> Result<(), PkdError> {
        let mut state = self.state.write().await;
        for cert in certificates {
            state.certificates.insert(cert.fingerprint.clone(), cert.clone());
        }
        debug!(count = certificates.len(), "saved certificates");
        Ok(())
    }

    async fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Option<Certificate>, PkdError> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .find(|cert| cert.subject.raw == subject_dn)
            .cloned())
    }

    async fn find_by_upload_id(&self, upload_id: UploadId) -> Result<Vec<Certificate>, PkdError> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .filter(|cert| cert.upload_id == upload_id)
            .cloned()
            .collect())
    }

    async fn find_crls_by_upload_id(&self, upload_id: UploadId) -> Result<Vec<Crl>, PkdError> {
        let state = self.state.read().await;
        Ok(state
            .crls
            .iter()
            .filter(|crl| crl.upload_id == upload_id)
            .cloned()
            .collect())
    }

    async fn find_cscas_for_cache(&self) -> Result<Vec<Certificate>, PkdError> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .filter(|cert| cert.usable_as_csca())
            .cloned()
            .collect())
    }

    async fn save_all_crls(&self, crls: &[Crl]) -> Result<(), PkdError> {
        let mut state = self.state.write().await;
        for crl in crls {
            if let Some(existing) = state
                .crls
                .iter_mut()
                .find(|c| c.issuer_dn == crl.issuer_dn && c.country_code == crl.country_code)
            {
                *existing = crl.clone();
            } else {
                state.crls.push(crl.clone());
            }
        }
        Ok(())
    }

    async fn find_crl_by_issuer_and_country(
        &self,
        issuer_cn: &str,
        country_code: Option<&str>,
    ) -> Result<Option<Crl>, PkdError> {
        let state = self.state.read().await;
        Ok(state
            .crls
            .iter()
            .find(|c| {
                c.issuer_cn == issuer_cn && c.country_code.as_deref() == country_code
            })
            .cloned())
    }

    async fn record_upload_audit(
        &self,
        upload_id: UploadId,
        fingerprint: Fingerprint,
    ) -> Result<(), PkdError> {
        let mut state = self.state.write().await;
        state.audit_rows.push((upload_id, fingerprint));
        Ok(())
    }

    async fn count_audit_rows(&self) -> Result<usize, PkdError> {
        let state = self.state.read().await;
        Ok(state.audit_rows.len())
    }
}
