//! Shared fixture builders for the integration tests: throwaway
//! CSCA/DSC key material via `rcgen`, and hand-rolled DER for the CMS
//! envelopes (`EF.SOD`, CMS Master List) that the production parsers
//! only ever receive pre-built from an issuing authority.

#![allow(dead_code)]

use std::sync::Arc;

use der::asn1::{ObjectIdentifier, OctetString};
use der::Encode;
use pkd_core::crypto::cms::{AlgorithmIdentifier, DataGroupHash, LdsSecurityObject};
use pkd_core::crypto::x509;
use pkd_core::model::{CertType, CertificateData, FileFormat, UploadId};
use pkd_core::parser::ParsedFile;
use pkd_core::progress::NullProgressSink;
use pkd_core::trust_store::TrustStoreRepository;
use pkd_core::validator::Validator;
use pkd_core::CoreConfig;
use time::{Duration, OffsetDateTime};

pub const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
pub const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
const OID_DATA: &str = "1.2.840.113549.1.7.1";

// --- minimal BER/DER TLV construction -------------------------------

fn encode_len(len: usize) -> Vec<u8> {
    if len < 128 {
        vec![len as u8]
    } else {
        let mut octets = len.to_be_bytes().to_vec();
        while octets.first() == Some(&0) {
            octets.remove(0);
        }
        let mut out = vec![0x80 | octets.len() as u8];
        out.extend(octets);
        out
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn seq(content: &[u8]) -> Vec<u8> {
    tlv(0x30, content)
}

fn set_of(der_elements: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x31, &der_elements.concat())
}

/// `[0] EXPLICIT` wrapper, also reused as the `[0] IMPLICIT` SET wrapper
/// for `certificates` — both are tag `0xA0`, constructed.
fn ctx0(content: &[u8]) -> Vec<u8> {
    tlv(0xA0, content)
}

fn oid_der(s: &str) -> Vec<u8> {
    ObjectIdentifier::new(s).unwrap().to_der().unwrap()
}

fn octet_string_der(bytes: &[u8]) -> Vec<u8> {
    OctetString::new(bytes.to_vec()).unwrap().to_der().unwrap()
}

fn integer_u8(n: u8) -> Vec<u8> {
    n.to_der().unwrap()
}

fn algorithm_identifier_der(oid_str: &str) -> Vec<u8> {
    seq(&oid_der(oid_str))
}

/// `IssuerAndSerialNumber`. Nothing downstream reads `SignerIdentifier`
/// (see `parse_signed_data`), so an empty issuer `Name` is safe.
fn issuer_and_serial_number(serial: u8) -> Vec<u8> {
    let empty_name = seq(&[]);
    seq(&[empty_name, integer_u8(serial)].concat())
}

fn signer_info_der(digest_alg_oid: &str, sig_alg_oid: &str, signature: &[u8]) -> Vec<u8> {
    let parts = [
        integer_u8(1),
        issuer_and_serial_number(1),
        algorithm_identifier_der(digest_alg_oid),
        algorithm_identifier_der(sig_alg_oid),
        octet_string_der(signature),
    ];
    seq(&parts.concat())
}

fn encap_content_info_der(econtent_type_oid: &str, payload: &[u8]) -> Vec<u8> {
    let wrapped = ctx0(&octet_string_der(payload));
    seq(&[oid_der(econtent_type_oid), wrapped].concat())
}

fn signed_data_der(digest_alg_oid: &str, encap_content_info: Vec<u8>, certificates_der: &[Vec<u8>], signer_info: Vec<u8>) -> Vec<u8> {
    let mut parts = vec![
        integer_u8(1),
        set_of(&[algorithm_identifier_der(digest_alg_oid)]),
        encap_content_info,
    ];
    if !certificates_der.is_empty() {
        // CertificateSet: each plain Certificate is an untagged
        // CertificateChoices, so the raw cert DER nests straight inside
        // the `[0] IMPLICIT` wrapper.
        parts.push(tlv(0xA0, &certificates_der.concat()));
    }
    parts.push(set_of(&[signer_info]));
    seq(&parts.concat())
}

fn content_info_der(signed_data: Vec<u8>) -> Vec<u8> {
    seq(&[oid_der(OID_SIGNED_DATA), ctx0(&signed_data)].concat())
}

/// Builds a full `EF.SOD` (the `[APPLICATION 23]`-wrapped CMS
/// `SignedData` around an `LdsSecurityObject`), with no `signedAttrs` —
/// the raw `LdsSecurityObject` DER is the signed message.
pub fn build_sod(lds: &LdsSecurityObject, dsc_der: &[u8], signature: &[u8]) -> Vec<u8> {
    let econtent = lds.to_der().expect("LdsSecurityObject encodes");
    let signer_info = signer_info_der(OID_SHA256, OID_ECDSA_WITH_SHA256, signature);
    let encap = encap_content_info_der(OID_DATA, &econtent);
    let signed_data = signed_data_der(OID_SHA256, encap, &[dsc_der.to_vec()], signer_info);
    let content_info = content_info_der(signed_data);
    tlv(0x77, &content_info)
}

/// Builds a CMS `SignedData` around a hand-rolled `CscaMasterList`
/// (`SEQUENCE { version INTEGER, certList SET OF Certificate }`). The
/// signature bytes are never checked unless a trust anchor is
/// configured, so a placeholder is enough.
pub fn build_master_list(csca_ders: &[Vec<u8>]) -> Vec<u8> {
    // DER's canonical SET OF ordering sorts elements by their encoded
    // octets; a compliant issuer's encoder would already do this.
    let mut sorted = csca_ders.to_vec();
    sorted.sort();

    let master_list_econtent = seq(&[integer_u8(0), set_of(&sorted)].concat());
    let signer_info = signer_info_der(OID_SHA256, OID_ECDSA_WITH_SHA256, &[0u8; 8]);
    let encap = encap_content_info_der(OID_DATA, &master_list_econtent);
    let signed_data = signed_data_der(OID_SHA256, encap, &[], signer_info);
    content_info_der(signed_data)
}

pub fn build_lds_security_object(dg_hashes: &[(u8, Vec<u8>)]) -> LdsSecurityObject {
    LdsSecurityObject {
        version: 0,
        hash_algorithm: AlgorithmIdentifier {
            oid: ObjectIdentifier::new(OID_SHA256).unwrap(),
            parameters: None,
        },
        data_group_hash_values: dg_hashes
            .iter()
            .map(|(number, hash)| DataGroupHash {
                data_group_number: *number as u64,
                hash_value: OctetString::new(hash.clone()).unwrap(),
            })
            .collect(),
        lds_version_info: None,
    }
}

pub fn sha256(bytes: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(bytes).to_vec()
}

/// Wraps a DG payload the way a presented data group arrives: a plain
/// primitive OCTET STRING holding the raw bytes.
pub fn dg_octet_string(bytes: &[u8]) -> Vec<u8> {
    octet_string_der(bytes)
}

// --- rcgen key material ----------------------------------------------

pub fn generate_csca(cn: &str, country: &str) -> (rcgen::Certificate, rcgen::KeyPair) {
    generate_csca_with_validity(cn, country, false)
}

pub fn generate_expired_csca(cn: &str, country: &str) -> (rcgen::Certificate, rcgen::KeyPair) {
    generate_csca_with_validity(cn, country, true)
}

fn generate_csca_with_validity(cn: &str, country: &str, expired: bool) -> (rcgen::Certificate, rcgen::KeyPair) {
    let mut params = rcgen::CertificateParams::new(vec![]).unwrap();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    dn.push(rcgen::DnType::CountryName, country);
    params.distinguished_name = dn;
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![rcgen::KeyUsagePurpose::KeyCertSign, rcgen::KeyUsagePurpose::CrlSign];
    if expired {
        params.not_before = OffsetDateTime::now_utc() - Duration::days(800);
        params.not_after = OffsetDateTime::now_utc() - Duration::days(400);
    } else {
        params.not_before = OffsetDateTime::now_utc() - Duration::days(1);
        params.not_after = OffsetDateTime::now_utc() + Duration::days(3650);
    }

    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    (cert, key_pair)
}

pub fn generate_dsc(cn: &str, country: &str, csca_cert: &rcgen::Certificate, csca_key: &rcgen::KeyPair) -> (rcgen::Certificate, rcgen::KeyPair) {
    let mut params = rcgen::CertificateParams::new(vec![]).unwrap();
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, cn);
    dn.push(rcgen::DnType::CountryName, country);
    params.distinguished_name = dn;
    params.is_ca = rcgen::IsCa::NoCa;
    params.not_before = OffsetDateTime::now_utc() - Duration::days(1);
    params.not_after = OffsetDateTime::now_utc() + Duration::days(1825);

    let dsc_key = rcgen::KeyPair::generate().unwrap();
    let cert = params.signed_by(&dsc_key, csca_cert, csca_key).unwrap();
    (cert, dsc_key)
}

/// Raw ECDSA P-256/SHA-256 signature (ASN.1 DER, matching
/// `ring::signature::ECDSA_P256_SHA256_ASN1` on the verify side) over an
/// arbitrary message, from an `rcgen`-generated key pair.
pub fn sign_ecdsa_p256(key_pair: &rcgen::KeyPair, message: &[u8]) -> Vec<u8> {
    let pkcs8 = key_pair.serialize_der();
    let rng = ring::rand::SystemRandom::new();
    let ring_key = ring::signature::EcdsaKeyPair::from_pkcs8(&ring::signature::ECDSA_P256_SHA256_ASN1_SIGNING, &pkcs8, &rng).unwrap();
    ring_key.sign(&rng, message).unwrap().as_ref().to_vec()
}

// --- LDIF text ---------------------------------------------------------

pub fn ldif_record(dn: &str, attr_name: &str, der: &[u8]) -> String {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    format!("dn: {dn}\n{attr_name}:: {b64}\n")
}

/// Pushes a self-signed CSCA straight into the trust store via the
/// normal validator pipeline, so its stored `subject.raw` is guaranteed
/// to match whatever a DSC's `issuer.raw` later parses to from the same
/// underlying `x509_parser` codepath.
pub async fn seed_csca(store: &Arc<dyn TrustStoreRepository>, der: Vec<u8>) {
    let extracted = x509::extract_certificate(&der).expect("valid CSCA DER");
    let data = CertificateData::from_extracted(der, &extracted, CertType::Csca);
    let mut parsed = ParsedFile::new(UploadId::new(), FileFormat::CscaMasterListLdif);
    parsed.certificates.push(data);

    let validator = Validator::new(store.clone(), Arc::new(NullProgressSink), CoreConfig::default());
    validator.validate(parsed).await.expect("CSCA seeds cleanly");
}
