//! LDIF ingest: duplicate-upload audit bookkeeping.

mod support;

use std::sync::Arc;

use pkd_core::prelude::*;
use pkd_core::progress::NullProgressSink;

#[tokio::test]
async fn reuploading_the_same_file_doubles_the_audit_rows_but_not_the_certificates() {
    let store: Arc<dyn TrustStoreRepository> = Arc::new(InMemoryTrustStore::new());
    let config = CoreConfig::default();

    let mut ldif = String::new();
    for i in 0..10 {
        let (cert, _key) = support::generate_csca(&format!("CSCA-{i:02}"), "KR");
        ldif.push_str(&support::ldif_record(
            &format!("cn=CSCA-{i:02},o=csca,c=KR,dc=pkd"),
            "userCertificate;binary",
            &cert.der().to_vec(),
        ));
        ldif.push('\n');
    }

    let parser = Parser::new(store.clone(), config.clone());
    let validator = Validator::new(store.clone(), Arc::new(NullProgressSink), config.clone());

    let upload_1 = UploadId::new();
    let parsed_1 = parser
        .parse(ldif.as_bytes(), FileFormat::EmrtdCompleteLdif, upload_1)
        .await
        .expect("first upload parses cleanly");
    assert_eq!(parsed_1.certificates.len(), 10);
    assert!(parsed_1.errors.is_empty(), "first upload has no duplicates: {:?}", parsed_1.errors);

    validator.validate(parsed_1).await.expect("first upload validates");
    assert_eq!(store.count_audit_rows().await.unwrap(), 10);

    let upload_2 = UploadId::new();
    let parsed_2 = parser
        .parse(ldif.as_bytes(), FileFormat::EmrtdCompleteLdif, upload_2)
        .await
        .expect("second upload parses cleanly");

    // Every entry was already present, so none gets promoted into the
    // certificate list, but every one is still flagged as a duplicate.
    assert_eq!(parsed_2.certificates.len(), 0);
    assert_eq!(parsed_2.errors.len(), 10);
    for error in &parsed_2.errors {
        assert_eq!(error.code, ErrorCode::DuplicateCertificate);
    }

    validator.validate(parsed_2).await.expect("second (empty) upload validates");

    assert_eq!(store.count_audit_rows().await.unwrap(), 20);

    let from_upload_1 = store.find_by_upload_id(upload_1).await.unwrap();
    let from_upload_2 = store.find_by_upload_id(upload_2).await.unwrap();
    assert_eq!(from_upload_1.len(), 10);
    assert_eq!(from_upload_2.len(), 0);
}

#[tokio::test]
async fn malformed_top_level_framing_fails_the_whole_parse() {
    let store: Arc<dyn TrustStoreRepository> = Arc::new(InMemoryTrustStore::new());
    let parser = Parser::new(store, CoreConfig::default());

    let bogus = b"cn: no-dn-here\n\n".to_vec();
    let result = parser.parse(&bogus, FileFormat::EmrtdCompleteLdif, UploadId::new()).await;
    assert!(result.is_err(), "a record with no leading dn: line must reject the whole file");
}
