//! CMS Master List ingest: bulk CSCA validation and directory
//! publication of the resulting VALID/EXPIRED mix.

mod support;

use std::sync::Arc;

use pkd_core::prelude::*;
use pkd_core::progress::NullProgressSink;
use pkd_core::publisher::InMemoryDirectoryClient;

#[tokio::test]
async fn fifty_cscas_five_expired_validate_and_publish_with_expired_descriptions() {
    let store: Arc<dyn TrustStoreRepository> = Arc::new(InMemoryTrustStore::new());
    let config = CoreConfig::default();

    let mut csca_ders = Vec::with_capacity(50);
    for i in 0..45 {
        let (cert, _key) = support::generate_csca(&format!("CSCA-OK-{i:02}"), "KR");
        csca_ders.push(cert.der().to_vec());
    }
    for i in 0..5 {
        let (cert, _key) = support::generate_expired_csca(&format!("CSCA-EXPIRED-{i:02}"), "KR");
        csca_ders.push(cert.der().to_vec());
    }
    assert_eq!(csca_ders.len(), 50);

    let master_list_der = support::build_master_list(&csca_ders);

    let parser = Parser::new(store.clone(), config.clone());
    let upload_id = UploadId::new();
    let parsed = parser
        .parse(&master_list_der, FileFormat::MasterListSignedCms, upload_id)
        .await
        .expect("master list with no configured trust anchor parses without signature verification");

    assert_eq!(parsed.certificates.len(), 50);

    let validator = Validator::new(store.clone(), Arc::new(NullProgressSink), config.clone());
    let response = validator.validate(parsed).await.expect("validation completes");

    assert_eq!(response.counters.cscas_valid, 45);
    assert_eq!(response.counters.cscas_invalid, 5);

    let directory = Arc::new(InMemoryDirectoryClient::new());
    let publisher = Publisher::new(store.clone(), directory.clone(), config.clone(), "dc=pkd,dc=example");
    let publish_response = publisher.publish(upload_id).await.expect("publish succeeds");

    assert_eq!(publish_response.uploaded, 50);
    assert_eq!(publish_response.failed, 0);

    let expired_descriptions = directory
        .entries()
        .await
        .into_iter()
        .filter(|entry| entry.description.starts_with("EXPIRED:"))
        .count();
    assert_eq!(expired_descriptions, 5);
}
