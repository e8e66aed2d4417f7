//! Newtype identifiers, deliberately plain `Uuid` wrappers with
//! no event-sourcing or domain-framework marker traits attached — this
//! core has no dependency on such a framework.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(UploadId, "Opaque identifier attached to every entity produced in one ingest.");
uuid_id!(CertificateId, "Identity of a validated, stored `Certificate`.");
uuid_id!(CrlId, "Identity of a validated, stored `CRL`.");
uuid_id!(PaInvocationId, "Identity of one Passive Authentication call.");

/// Lowercase-hex SHA-256 of a certificate's DER encoding: the globally
/// unique identifier of a `Certificate` in the trust store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already-computed lowercase-hex SHA-256 digest.
    ///
    /// Use [`crate::crypto::sha256_fingerprint`] to compute one from DER
    /// bytes; this constructor just asserts the shape invariant.
    pub fn new(hex: impl Into<String>) -> Self {
        let hex = hex.into();
        debug_assert_eq!(hex.len(), 64, "fingerprint must be 64 hex characters");
        debug_assert!(
            hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
            "fingerprint must be lowercase hex"
        );
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
