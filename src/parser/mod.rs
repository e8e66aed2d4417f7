//! File ingest: decode an uploaded byte blob plus a declared
//! `FileFormat` into a `ParsedFile` of extracted, not-yet-validated
//! `CertificateData`/`CrlData`.

pub mod ldif;
pub mod master_list;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::PkdError;
use crate::model::{CertificateData, CrlData, FileFormat, Fingerprint, ParsingError, UploadId};
use crate::trust_store::TrustStoreRepository;

/// Aggregate parser output: lives only between
/// parser and validator, then is discarded.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub upload_id: UploadId,
    pub format: FileFormat,
    pub certificates: Vec<CertificateData>,
    pub crls: Vec<CrlData>,
    pub errors: Vec<ParsingError>,
}

impl ParsedFile {
    pub fn new(upload_id: UploadId, format: FileFormat) -> Self {
        Self {
            upload_id,
            format,
            certificates: Vec::new(),
            crls: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Decodes upload bytes per `FileFormat`, dispatching to the LDIF or
/// CMS Master List sub-parser.
pub struct Parser {
    trust_store: Arc<dyn TrustStoreRepository>,
    config: CoreConfig,
}

impl Parser {
    pub fn new(trust_store: Arc<dyn TrustStoreRepository>, config: CoreConfig) -> Self {
        Self { trust_store, config }
    }

    /// `parse(bytes, format, uploadId) → ParsedFile`.
    pub async fn parse(
        &self,
        bytes: &[u8],
        format: FileFormat,
        upload_id: UploadId,
    ) -> Result<ParsedFile, PkdError> {
        if format.is_ldif() {
            ldif::parse(bytes, format, upload_id, &self.config, self.trust_store.as_ref()).await
        } else {
            master_list::parse(bytes, upload_id, &self.config, self.trust_store.as_ref()).await
        }
    }
}

/// Single bulk existence check against every candidate fingerprint
/// , then a second, purely in-memory pass deciding per entry.
/// Shared by the LDIF and Master List sub-parsers so the one-bulk-query
/// rule holds regardless of which sub-parser produced the candidates
/// (including certificates recovered from a Master List embedded inside
/// an LDIF entry via `pkdMasterListContent`).
pub(crate) async fn dedup_and_finalize(
    candidates: Vec<CertificateData>,
    upload_id: UploadId,
    trust_store: &dyn TrustStoreRepository,
    parsed: &mut ParsedFile,
) -> Result<(), PkdError> {
    let fingerprints: HashSet<Fingerprint> = candidates.iter().map(|c| c.fingerprint.clone()).collect();
    let existing = trust_store.find_existing_fingerprints(&fingerprints).await?;

    for data in candidates {
        if existing.contains(&data.fingerprint) {
            parsed
                .errors
                .push(ParsingError::duplicate_certificate(&data.subject.raw, data.fingerprint.as_str()));
        }
        // Every candidate gets an audit row, not just duplicates: a
        // re-upload of an already-known fingerprint must still leave a
        // trace of which upload saw it, so "upload N certs twice" reads
        // as 2N audit rows rather than N.
        trust_store.record_upload_audit(upload_id, data.fingerprint.clone()).await?;
        if !existing.contains(&data.fingerprint) {
            parsed.certificates.push(data);
        }
    }
    Ok(())
}
