//! SHA-256 fingerprinting of DER-encoded certificates and CRLs.

use sha2::{Digest, Sha256};

/// Compute the lowercase-hex SHA-256 fingerprint of a DER-encoded blob.
///
/// This is the globally unique identifier of a [`crate::model::Certificate`]
/// in the trust store ("Fingerprint").
pub fn sha256_fingerprint(der: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hex::encode(hasher.finalize())
}
