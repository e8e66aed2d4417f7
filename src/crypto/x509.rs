//! X.509 certificate and CRL parsing, plus signature/validity/constraint
//! verification.
//!
//! Parsing is delegated to [`x509_parser`]: parse once, pull every field
//! the validator needs, never hold the borrowed `X509Certificate<'_>`
//! past the function that produced it. Signature verification dispatches
//! across the three families the eMRTD world actually uses — RSA-PKCS1,
//! RSA-PSS, and ECDSA — with `rsa`/`ring` as first-class dependencies.

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use crate::error::PkdError;

/// Normalized Distinguished Name components.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DnComponents {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    /// Uppercased ISO 3166-1 alpha-2 country code from the `C=` RDN, if present.
    pub country: Option<String>,
    /// The full DN rendered RFC 4514-ish, for display and as a lookup key.
    pub raw: String,
}

/// Every field the validator and PA engine need from a parsed certificate,
/// extracted once and owned (no lifetime tied to the DER buffer).
#[derive(Debug, Clone)]
pub struct ExtractedCertificate {
    pub subject: DnComponents,
    pub issuer: DnComponents,
    pub serial_hex: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_ca: bool,
    pub path_len_constraint: Option<u32>,
    pub signature_algorithm_oid: String,
    /// Raw `subjectPublicKey` BIT STRING payload: a PKCS#1 `RSAPublicKey`
    /// DER blob for RSA keys, an uncompressed EC point for ECDSA keys, or
    /// 32 raw bytes for Ed25519 — exactly the form each verifier below
    /// expects, so no further ASN.1 unwrapping is needed to use this
    /// certificate as an issuer.
    pub public_key_bytes: Vec<u8>,
    /// Raw bitstring of the certificate's own signature.
    pub signature: Vec<u8>,
    /// DER bytes of the signed `tbsCertificate`, for verifying this
    /// certificate's own signature against its issuer.
    pub tbs_certificate_der: Vec<u8>,
    pub fingerprint: String,
}

/// Every field the validator needs from a parsed CRL.
#[derive(Debug, Clone)]
pub struct ExtractedCrl {
    pub issuer: DnComponents,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub revoked: Vec<RevokedEntryRaw>,
    pub signature_algorithm_oid: String,
    pub signature: Vec<u8>,
    pub tbs_cert_list_der: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RevokedEntryRaw {
    pub serial_hex: String,
    pub revocation_date: DateTime<Utc>,
    pub reason: Option<String>,
}

fn asn1_time_to_utc(t: &x509_parser::time::ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or_else(Utc::now)
}

fn dn_components(name: &X509Name) -> DnComponents {
    let common_name = name
        .iter_common_name()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);
    let organization = name
        .iter_organization()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);
    let organizational_unit = name
        .iter_organizational_unit()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(str::to_string);
    let country = name
        .iter_country()
        .next()
        .and_then(|a| a.as_str().ok())
        .map(|s| s.to_uppercase());

    DnComponents {
        common_name,
        organization,
        organizational_unit,
        country,
        raw: name.to_string(),
    }
}

/// Parse a DER-encoded X.509 certificate and extract every field the
/// validator and PA engine need.
pub fn extract_certificate(der: &[u8]) -> Result<ExtractedCertificate, PkdError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| PkdError::CertParse(e.to_string()))?;

    let (is_ca, path_len_constraint) = cert
        .basic_constraints()
        .map_err(|e| PkdError::CertParse(e.to_string()))?
        .map(|bc| (bc.value.ca, bc.value.path_len_constraint))
        .unwrap_or((false, None));

    let validity = cert.validity();

    Ok(ExtractedCertificate {
        subject: dn_components(cert.subject()),
        issuer: dn_components(cert.issuer()),
        serial_hex: hex::encode(cert.raw_serial()),
        not_before: asn1_time_to_utc(&validity.not_before),
        not_after: asn1_time_to_utc(&validity.not_after),
        is_ca,
        path_len_constraint,
        signature_algorithm_oid: cert.signature_algorithm.algorithm.to_id_string(),
        public_key_bytes: cert.public_key().subject_public_key.as_ref().to_vec(),
        signature: cert.signature_value.as_ref().to_vec(),
        tbs_certificate_der: cert.tbs_certificate.as_ref().to_vec(),
        fingerprint: crate::crypto::sha256_fingerprint(der),
    })
}

/// Parse a DER-encoded X.509 CRL and extract every field the validator needs.
pub fn extract_crl(der: &[u8]) -> Result<ExtractedCrl, PkdError> {
    let (_, crl) = CertificateRevocationList::from_der(der)
        .map_err(|e| PkdError::CrlParse(e.to_string()))?;

    let revoked = crl
        .iter_revoked_certificates()
        .map(|entry| RevokedEntryRaw {
            serial_hex: hex::encode(entry.raw_serial()),
            revocation_date: asn1_time_to_utc(&entry.revocation_date),
            reason: entry
                .reason_code()
                .map(|(_, code)| format!("{:?}", code.1)),
        })
        .collect();

    Ok(ExtractedCrl {
        issuer: dn_components(crl.issuer()),
        this_update: asn1_time_to_utc(&crl.last_update()),
        next_update: crl.next_update().map(|t| asn1_time_to_utc(&t)),
        revoked,
        signature_algorithm_oid: crl.signature_algorithm.algorithm.to_id_string(),
        signature: crl.signature_value.as_ref().to_vec(),
        tbs_cert_list_der: crl.tbs_cert_list.as_ref().to_vec(),
    })
}

// ---------------------------------------------------------------------
// Signature verification
// ---------------------------------------------------------------------

const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
const OID_RSASSA_PSS: &str = "1.2.840.113549.1.1.10";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";
const OID_ECDSA_WITH_SHA512: &str = "1.2.840.10045.4.3.4";
const OID_ED25519: &str = "1.3.101.112";

/// Verify that `signature` over `message` was produced by the private key
/// whose raw `subjectPublicKey` bitstring payload is `key_bytes`
/// (see [`ExtractedCertificate::public_key_bytes`]), for the given
/// signature algorithm OID.
///
/// Dispatches across RSA-PKCS1, RSA-PSS, ECDSA P-256/P-384, and Ed25519 —
/// every algorithm an ICAO 9303 DSC or CSCA may legally use. An OID
/// outside this set is reported as `SIGNATURE_INVALID`, never a panic.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    signature_algorithm_oid: &str,
    key_bytes: &[u8],
) -> Result<bool, PkdError> {
    match signature_algorithm_oid {
        OID_SHA256_WITH_RSA => verify_rsa_pkcs1(key_bytes, message, signature, &ring::signature::RSA_PKCS1_2048_8192_SHA256),
        OID_SHA384_WITH_RSA => verify_rsa_pkcs1(key_bytes, message, signature, &ring::signature::RSA_PKCS1_2048_8192_SHA384),
        OID_SHA512_WITH_RSA => verify_rsa_pkcs1(key_bytes, message, signature, &ring::signature::RSA_PKCS1_2048_8192_SHA512),
        OID_SHA1_WITH_RSA => verify_rsa_pkcs1(key_bytes, message, signature, &ring::signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY),
        OID_RSASSA_PSS => verify_rsa_pss(key_bytes, message, signature),
        OID_ECDSA_WITH_SHA256 => verify_ecdsa(key_bytes, message, signature, &ring::signature::ECDSA_P256_SHA256_ASN1),
        OID_ECDSA_WITH_SHA384 => verify_ecdsa(key_bytes, message, signature, &ring::signature::ECDSA_P384_SHA384_ASN1),
        OID_ECDSA_WITH_SHA512 => verify_ecdsa(key_bytes, message, signature, &ring::signature::ECDSA_P384_SHA384_ASN1),
        OID_ED25519 => verify_ed25519(key_bytes, message, signature),
        other => Err(PkdError::UnsupportedSignatureAlgorithm(other.to_string())),
    }
}

fn verify_rsa_pkcs1(
    key_bytes: &[u8],
    message: &[u8],
    signature: &[u8],
    alg: &'static dyn ring::signature::VerificationAlgorithm,
) -> Result<bool, PkdError> {
    let public_key = ring::signature::UnparsedPublicKey::new(alg, key_bytes);
    Ok(public_key.verify(message, signature).is_ok())
}

fn verify_ecdsa(
    key_bytes: &[u8],
    message: &[u8],
    signature: &[u8],
    alg: &'static dyn ring::signature::VerificationAlgorithm,
) -> Result<bool, PkdError> {
    let public_key = ring::signature::UnparsedPublicKey::new(alg, key_bytes);
    Ok(public_key.verify(message, signature).is_ok())
}

fn verify_rsa_pss(key_bytes: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, PkdError> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pss::VerifyingKey;
    use rsa::sha2::Sha256;
    use rsa::signature::Verifier;

    let rsa_key = rsa::RsaPublicKey::from_pkcs1_der(key_bytes)
        .map_err(|e| PkdError::CertParse(format!("invalid RSA public key: {e}")))?;
    let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(rsa_key);
    let sig = rsa::pss::Signature::try_from(signature)
        .map_err(|e| PkdError::CertParse(format!("invalid RSA-PSS signature: {e}")))?;
    Ok(verifying_key.verify(message, &sig).is_ok())
}

fn verify_ed25519(key_bytes: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, PkdError> {
    use ed25519_dalek::{Signature, VerifyingKey};

    let key_array: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| PkdError::CertParse("Ed25519 public key must be 32 bytes".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|e| PkdError::CertParse(format!("invalid Ed25519 public key: {e}")))?;
    let sig_array: [u8; 64] = signature
        .try_into()
        .map_err(|_| PkdError::CertParse("Ed25519 signature must be 64 bytes".into()))?;
    let sig = Signature::from_bytes(&sig_array);
    Ok(verifying_key.verify_strict(message, &sig).is_ok())
}

/// Compare two byte slices (a declared vs. an actual hash) in constant
/// time.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generates a throwaway self-signed CSCA-shaped certificate for tests
    /// via `CertificateParams` + `CertificateParams::self_signed`.
    fn generate_self_signed_ca(cn: &str, country: &str) -> Vec<u8> {
        use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose};

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        dn.push(DnType::CountryName, country);

        let mut cert_params = CertificateParams::new(vec![]).unwrap();
        cert_params.distinguished_name = dn;
        cert_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        cert_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let key_pair = KeyPair::generate().unwrap();
        let cert = cert_params.self_signed(&key_pair).unwrap();
        cert.der().to_vec()
    }

    #[test]
    fn extracts_subject_country_uppercased() {
        let der = generate_self_signed_ca("Test CSCA", "kr");
        let extracted = extract_certificate(&der).unwrap();
        assert_eq!(extracted.subject.country.as_deref(), Some("KR"));
        assert!(extracted.is_ca);
    }

    #[test]
    fn fingerprint_matches_sha256_of_der() {
        let der = generate_self_signed_ca("Test CSCA", "KR");
        let extracted = extract_certificate(&der).unwrap();
        assert_eq!(extracted.fingerprint, crate::crypto::sha256_fingerprint(&der));
    }

    #[test]
    fn self_signature_verifies() {
        let der = generate_self_signed_ca("Test CSCA", "KR");
        let extracted = extract_certificate(&der).unwrap();
        let valid = verify_signature(
            &extracted.tbs_certificate_der,
            &extracted.signature,
            &extracted.signature_algorithm_oid,
            &extracted.public_key_bytes,
        )
        .unwrap();
        assert!(valid);
    }

    #[test]
    fn tampered_signature_fails() {
        let der = generate_self_signed_ca("Test CSCA", "KR");
        let extracted = extract_certificate(&der).unwrap();
        let mut bad_sig = extracted.signature.clone();
        if let Some(byte) = bad_sig.first_mut() {
            *byte ^= 0xFF;
        }
        let valid = verify_signature(
            &extracted.tbs_certificate_der,
            &bad_sig,
            &extracted.signature_algorithm_oid,
            &extracted.public_key_bytes,
        )
        .unwrap();
        assert!(!valid);
    }
}
