//! CMS `SignedData` (RFC 5652) parsing for Master Lists and EF.SOD.
//!
//! Grounded in the `cms`/`der` parsing idiom from the ICAO-9303 reference
//! material (`EfSod`/`LdsSecurityObject` in the retrieved pack): schema-
//! conforming structure (`ContentInfo`, `SignedData`, `SignerInfo`,
//! `CertificateChoices`) is decoded with the `cms` crate's derived
//! `Sequence` impls; the two ICAO-specific payloads those crates don't
//! know about — the Master List's `CscaMasterList` encapsulated content
//! and the EF.SOD's `LDSSecurityObject` encapsulated content — are
//! modeled here the same way, as small `der::Sequence` structs, rather
//! than hand-parsed.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::{ObjectIdentifier, OctetString, PrintableString, SetOfVec};
use der::{Decode, Encode, Sequence};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::crypto::asn1::unwrap_application_tag;
use crate::error::PkdError;

const EF_SOD_APPLICATION_TAG: u32 = 23;
const OID_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
const OID_SHA256: &str = "2.16.840.1.101.3.4.2.1";
const OID_SHA384: &str = "2.16.840.1.101.3.4.2.2";
const OID_SHA512: &str = "2.16.840.1.101.3.4.2.3";

/// A minimal, owned `AlgorithmIdentifier` (RFC 5280 §4.1.1.2): just what
/// the validator needs (the OID), with parameters carried as opaque DER
/// in case a caller ever needs to re-encode it.
#[derive(Clone, Debug, Sequence)]
pub struct AlgorithmIdentifier {
    pub oid: ObjectIdentifier,
    pub parameters: Option<der::Any>,
}

/// ICAO Doc 9303 Part 12 `CscaMasterList`: the Master List's encapsulated
/// content, a version tag over a `SET OF Certificate`.
#[derive(Clone, Debug, Sequence)]
struct CscaMasterList {
    version: u32,
    cert_list: SetOfVec<der::Any>,
}

/// ICAO Doc 9303 Part 11 §4.6.2.3 `LDSSecurityObject`: the EF.SOD's
/// encapsulated content, carrying the per-data-group hash values that
/// Passive Authentication checks presented data groups against.
#[derive(Clone, Debug, Sequence)]
pub struct LdsSecurityObject {
    pub version: u64,
    pub hash_algorithm: AlgorithmIdentifier,
    pub data_group_hash_values: Vec<DataGroupHash>,
    pub lds_version_info: Option<LdsVersionInfo>,
}

#[derive(Clone, Debug, Sequence)]
pub struct DataGroupHash {
    pub data_group_number: u64,
    pub hash_value: OctetString,
}

#[derive(Clone, Debug, Sequence)]
pub struct LdsVersionInfo {
    pub lds_version: PrintableString,
    pub unicode_version: PrintableString,
}

impl LdsSecurityObject {
    /// The declared hash for a given data group number, if present.
    pub fn hash_for_dg(&self, dg_number: u8) -> Option<&[u8]> {
        self.data_group_hash_values
            .iter()
            .find(|dg| dg.data_group_number == dg_number as u64)
            .map(|dg| dg.hash_value.as_bytes())
    }

    /// Every data group number this SOD declares a hash for.
    pub fn declared_data_groups(&self) -> Vec<u8> {
        self.data_group_hash_values
            .iter()
            .map(|dg| dg.data_group_number as u8)
            .collect()
    }
}

/// Everything the validator/PA engine need out of a parsed `SignedData`
/// envelope: the embedded certificates, the signer's declared algorithms
/// and signature, and the exact bytes that signature was computed over.
pub struct ParsedSignedData {
    /// DER bytes of every embedded `Certificate` choice (Master List:
    /// every CSCA; EF.SOD: the DSC, conventionally exactly one).
    pub certificates: Vec<Vec<u8>>,
    pub digest_algorithm_oid: String,
    pub signature_algorithm_oid: String,
    pub signature: Vec<u8>,
    /// Bytes the signature actually verifies against: the re-encoded
    /// `signedAttrs` SET when present (RFC 5652 §5.4), otherwise the raw
    /// encapsulated content.
    pub signed_message: Vec<u8>,
    /// Raw DER bytes of the encapsulated content (`eContent`), needed to
    /// check the `signedAttrs` message-digest attribute when present.
    pub econtent: Vec<u8>,
}

fn decode_content_info(der_bytes: &[u8]) -> Result<SignedData, PkdError> {
    let content_info = ContentInfo::from_der(der_bytes)
        .map_err(|e| PkdError::CmsParse(format!("invalid ContentInfo: {e}")))?;
    content_info
        .content
        .decode_as::<SignedData>()
        .map_err(|e| PkdError::CmsParse(format!("invalid SignedData: {e}")))
}

fn extract_certificates(signed_data: &SignedData) -> Vec<Vec<u8>> {
    let Some(certs) = &signed_data.certificates else {
        return Vec::new();
    };
    certs
        .0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => cert.to_der().ok(),
            _ => None,
        })
        .collect()
}

/// Parse a CMS `SignedData` and return everything needed to verify its
/// signature against a trust anchor, without yet interpreting the
/// encapsulated content.
fn parse_signed_data(der_bytes: &[u8]) -> Result<(SignedData, ParsedSignedData), PkdError> {
    let signed_data = decode_content_info(der_bytes)?;

    let signer_info = signed_data
        .signer_infos
        .0
        .as_slice()
        .first()
        .ok_or_else(|| PkdError::CmsParse("SignedData has no SignerInfo".into()))?
        .clone();

    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| PkdError::CmsParse("missing encapsulated content".into()))?
        .to_der()
        .map_err(|e| PkdError::CmsParse(format!("re-encoding eContent failed: {e}")))?;
    // `econtent` is itself an OCTET STRING wrapping the real payload.
    let econtent_payload = der::asn1::OctetString::from_der(&econtent)
        .map_err(|e| PkdError::CmsParse(format!("eContent is not an OCTET STRING: {e}")))?
        .into_bytes();

    let signed_message = match &signer_info.signed_attrs {
        Some(signed_attrs) => signed_attrs
            .to_der()
            .map_err(|e| PkdError::CmsParse(format!("re-encoding signedAttrs failed: {e}")))?,
        None => econtent_payload.clone(),
    };

    if let Some(signed_attrs) = &signer_info.signed_attrs {
        verify_message_digest(signed_attrs, &signer_info.digest_alg.oid.to_string(), &econtent_payload)?;
    }

    let parsed = ParsedSignedData {
        certificates: extract_certificates(&signed_data),
        digest_algorithm_oid: signer_info.digest_alg.oid.to_string(),
        signature_algorithm_oid: signer_info.signature_algorithm.oid.to_string(),
        signature: signer_info.signature.as_bytes().to_vec(),
        signed_message,
        econtent: econtent_payload,
    };

    Ok((signed_data, parsed))
}

/// Hash `data` with the digest algorithm named by `oid` (SHA-256/384/512).
/// Exposed for `VERIFY_DG_HASHES`, which hashes presented data
/// group bytes under the SOD's declared `hash_algorithm` for comparison
/// against `LdsSecurityObject::hash_for_dg`.
pub fn hash_with_algorithm(oid: &str, data: &[u8]) -> Result<Vec<u8>, PkdError> {
    digest(oid, data)
}

fn digest(oid: &str, data: &[u8]) -> Result<Vec<u8>, PkdError> {
    match oid {
        OID_SHA256 => Ok(Sha256::digest(data).to_vec()),
        OID_SHA384 => Ok(Sha384::digest(data).to_vec()),
        OID_SHA512 => Ok(Sha512::digest(data).to_vec()),
        other => Err(PkdError::UnsupportedSignatureAlgorithm(format!(
            "unsupported digest algorithm: {other}"
        ))),
    }
}

fn verify_message_digest(
    signed_attrs: &cms::signed_data::SignedAttributes,
    digest_algorithm_oid: &str,
    econtent_payload: &[u8],
) -> Result<(), PkdError> {
    let message_digest_attr = signed_attrs
        .iter()
        .find(|attr| attr.oid.to_string() == OID_MESSAGE_DIGEST)
        .ok_or_else(|| PkdError::InvalidSodFormat("signedAttrs missing message-digest".into()))?;

    let declared = message_digest_attr
        .values
        .iter()
        .next()
        .ok_or_else(|| PkdError::InvalidSodFormat("empty message-digest attribute".into()))?
        .decode_as::<OctetString>()
        .map_err(|e| PkdError::InvalidSodFormat(format!("invalid message-digest attribute: {e}")))?;

    let actual = digest(digest_algorithm_oid, econtent_payload)?;
    if !crate::crypto::x509::constant_time_eq(declared.as_bytes(), &actual) {
        return Err(PkdError::InvalidSodFormat(
            "message-digest attribute does not match eContent".into(),
        ));
    }
    Ok(())
}

/// Verify a CMS `SignedData` envelope's signature against a trust-anchor
/// certificate's public key . Used to
/// optionally verify a Master List's own signature; never used to decide
/// whether to accept the embedded certificates structurally.
pub fn verify_signed_data_signature(
    der_bytes: &[u8],
    anchor_certificate_der: &[u8],
) -> Result<bool, PkdError> {
    let (_signed_data, parsed) = parse_signed_data(der_bytes)?;
    let anchor = crate::crypto::x509::extract_certificate(anchor_certificate_der)?;
    crate::crypto::x509::verify_signature(
        &parsed.signed_message,
        &parsed.signature,
        &parsed.signature_algorithm_oid,
        &anchor.public_key_bytes,
    )
}

/// Parse an ICAO Doc 9303 Part 12 Master List and return the DER bytes
/// of every embedded CSCA certificate.
///
/// The Master List's own `SignedData` is validated structurally here
/// (every level of nesting is traversed, non-certificate
/// `CertificateChoices` variants are skipped); whether its signature is
/// trusted is a validator-level decision, not this parser's.
pub fn parse_master_list(der_bytes: &[u8]) -> Result<Vec<Vec<u8>>, PkdError> {
    let (signed_data, _parsed) = parse_signed_data(der_bytes)?;

    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| PkdError::MasterListCmsParseError("Master List has no encapsulated content".into()))?;
    let master_list = econtent
        .decode_as::<CscaMasterList>()
        .map_err(|e| PkdError::MasterListCmsParseError(format!("invalid CscaMasterList: {e}")))?;

    Ok(master_list
        .cert_list
        .0
        .iter()
        .filter_map(|any| any.to_der().ok())
        .collect())
}

/// Everything the validator needs from a parsed EF.SOD: the embedded
/// DSC candidate(s), the declared/verified signature material, and the
/// decoded `LDSSecurityObject` (the per-data-group hash list).
pub struct ParsedSod {
    pub dsc_candidates: Vec<Vec<u8>>,
    pub digest_algorithm_oid: String,
    pub signature_algorithm_oid: String,
    pub signature: Vec<u8>,
    pub signed_message: Vec<u8>,
    pub lds_security_object: LdsSecurityObject,
}

/// Unwrap the `[APPLICATION 23]` EF.SOD envelope (if present), parse the
/// inner CMS `SignedData`, and decode its `LDSSecurityObject` payload.
pub fn parse_sod(sod_bytes: &[u8]) -> Result<ParsedSod, PkdError> {
    let inner = unwrap_application_tag(sod_bytes, EF_SOD_APPLICATION_TAG)?
        .map(|c| c.to_vec());
    let content_info_der: &[u8] = inner.as_deref().unwrap_or(sod_bytes);

    let (_signed_data, parsed) = parse_signed_data(content_info_der)?;

    let lds_security_object = LdsSecurityObject::from_der(&parsed.econtent)
        .map_err(|e| PkdError::InvalidSodFormat(format!("invalid LDSSecurityObject: {e}")))?;

    Ok(ParsedSod {
        dsc_candidates: parsed.certificates,
        digest_algorithm_oid: parsed.digest_algorithm_oid,
        signature_algorithm_oid: parsed.signature_algorithm_oid,
        signature: parsed.signature,
        signed_message: parsed.signed_message,
        lds_security_object,
    })
}
