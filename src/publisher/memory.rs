//! Reference in-memory [`DirectoryClient`], used by tests and as the
//! default when no real directory backend is wired in. Modeled on
//! `trust_store::memory::InMemoryTrustStore`'s `Arc<RwLock<HashMap<...>>>`
//! shape.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DirectoryClient, DirectoryEntry, UpsertOutcome};
use crate::error::PkdError;

/// In-memory directory keyed by DN. `add_entry`/`add_batch` never fail
/// (no transport to fault); this exists purely as the reference wire
/// contract implementation for tests.
#[derive(Default, Clone)]
pub struct InMemoryDirectoryClient {
    entries: Arc<RwLock<HashMap<String, DirectoryEntry>>>,
}

impl InMemoryDirectoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries.read().await.get(dn).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Every stored entry, for tests that need to assert over the whole
    /// published set rather than one DN at a time.
    pub async fn entries(&self) -> Vec<DirectoryEntry> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectoryClient {
    async fn add_entry(&self, entry: &DirectoryEntry) -> Result<UpsertOutcome, PkdError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get_mut(&entry.dn) {
            *existing = entry.clone();
            Ok(UpsertOutcome::AlreadyExists)
        } else {
            entries.insert(entry.dn.clone(), entry.clone());
            Ok(UpsertOutcome::Created)
        }
    }

    async fn add_batch(&self, entries: &[DirectoryEntry]) -> Result<Vec<UpsertOutcome>, PkdError> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            outcomes.push(self.add_entry(entry).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(dn: &str) -> DirectoryEntry {
        DirectoryEntry {
            dn: dn.to_string(),
            object_class: vec!["top", "pkiUser"],
            cn: "CN=CSCA-KR,C=KR".into(),
            sn: Some("01".into()),
            description: "VALID".into(),
            binary_attribute_name: "userCertificate;binary",
            binary_value: vec![1, 2, 3],
            country_code: "KR".into(),
        }
    }

    #[tokio::test]
    async fn add_entry_reports_created_then_already_exists() {
        let client = InMemoryDirectoryClient::new();
        let entry = sample_entry("cn=test,o=csca,c=KR,dc=pkd");
        assert_eq!(client.add_entry(&entry).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(client.add_entry(&entry).await.unwrap(), UpsertOutcome::AlreadyExists);
        assert_eq!(client.len().await, 1);
    }

    #[tokio::test]
    async fn add_batch_applies_every_entry() {
        let client = InMemoryDirectoryClient::new();
        let entries = vec![sample_entry("cn=a,o=csca,c=KR,dc=pkd"), sample_entry("cn=b,o=csca,c=KR,dc=pkd")];
        let outcomes = client.add_batch(&entries).await.unwrap();
        assert_eq!(outcomes, vec![UpsertOutcome::Created, UpsertOutcome::Created]);
        assert_eq!(client.len().await, 2);
    }
}
