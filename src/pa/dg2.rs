//! DG2 (ISO/IEC 19794-5 face biometric) parser.
//!
//! DG2 is tolerant by necessity: real passports in the wild nest their
//! `FaceInfo`/`FaceImageBlock` structures in at least four distinct
//! shapes. Rather than modeling each variant as its own schema, this
//! walks the ASN.1 tree generically with [`crate::crypto::asn1`] and
//! branches on what it actually finds at each level — "keep unwrapping
//! until you see something recognizable".

use crate::crypto::asn1::{read_tlv, unwrap_tagged_layers, TagClass, UNIVERSAL_OCTET_STRING, UNIVERSAL_SEQUENCE};
use crate::error::PkdError;

const MIN_PAYLOAD_SIZE: usize = 100;
const ISO_19794_5_HEADER_LEN: usize = 20;
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG2000_MAGIC: [u8; 6] = [0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50];

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageFormat {
    Jpeg,
    Jpeg2000,
    Unknown,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FaceImage {
    pub format: ImageFormat,
    pub size: usize,
    #[serde(with = "bytes_as_base64")]
    pub bytes: Vec<u8>,
    pub base64: String,
    pub data_url: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Dg2Result {
    pub face_count: usize,
    pub face_images: Vec<FaceImage>,
}

mod bytes_as_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Jpeg2000 => "image/jp2",
        ImageFormat::Unknown => "application/octet-stream",
    }
}

/// Format detection by magic bytes: a JPEG
/// magic can appear at the very start of the scanned region; the
/// JPEG2000 magic is looked for after its own 4-byte box-length prefix,
/// so it can appear starting at offset 0 or 4 of the scanned slice.
fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.starts_with(&JPEG_MAGIC) {
        return ImageFormat::Jpeg;
    }
    if bytes.len() >= 10 && bytes[4..10] == JPEG2000_MAGIC {
        return ImageFormat::Jpeg2000;
    }
    ImageFormat::Unknown
}

/// Scan an ISO/IEC 19794-5 FaceImageBlock payload:
/// the container starts with a 20-byte header (`FAC\0`, `010\0`,
/// big-endian total length, face count, 6 reserved bytes); the actual
/// image is located by scanning from offset 20 for a JPEG or JPEG2000
/// magic.
fn locate_image(payload: &[u8]) -> &[u8] {
    if payload.len() <= ISO_19794_5_HEADER_LEN {
        return payload;
    }
    let scan_region = &payload[ISO_19794_5_HEADER_LEN..];
    for offset in 0..scan_region.len() {
        let candidate = &scan_region[offset..];
        if candidate.starts_with(&JPEG_MAGIC) || (candidate.len() >= 10 && candidate[4..10] == JPEG2000_MAGIC) {
            return candidate;
        }
    }
    // No recognizable magic: fall back to the whole post-header region
    // rather than the full payload ("image starts at or after offset 20").
    scan_region
}

fn build_face_image(payload: &[u8]) -> Option<FaceImage> {
    if payload.len() <= MIN_PAYLOAD_SIZE {
        // Exactly 100 bytes is filtered, 101 bytes is retained.
        return None;
    }
    let image_bytes = locate_image(payload).to_vec();
    let format = detect_format(&image_bytes);
    let base64 = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&image_bytes)
    };
    let data_url = format!("data:{};base64,{}", mime_for(format), base64);
    Some(FaceImage {
        format,
        size: image_bytes.len(),
        bytes: image_bytes,
        base64,
        data_url,
    })
}

/// Unwrap tagging layers around `buf` until a universal SEQUENCE or
/// OCTET STRING is found, returning which it was plus the unwrapped
/// content.
enum Unwrapped<'a> {
    OctetString(&'a [u8]),
    Sequence(&'a [u8]),
}

fn unwrap_branch(buf: &[u8]) -> Result<Unwrapped<'_>, PkdError> {
    let (header, content) = unwrap_tagged_layers(buf).map_err(|e| PkdError::InvalidDg2(e.to_string()))?;
    if header.class == TagClass::Universal && header.number == UNIVERSAL_SEQUENCE {
        return Ok(Unwrapped::Sequence(content));
    }
    if !header.constructed {
        // Either a genuine universal OCTET STRING, or a primitive
        // context/application tag that implicitly carries an OCTET
        // STRING payload.
        return Ok(Unwrapped::OctetString(content));
    }
    Err(PkdError::InvalidDg2(format!(
        "unexpected tag in FaceInfo: class {:?} number {}",
        header.class, header.number
    )))
}

/// Walk one `SEQUENCE`'s top-level elements, returning each element's raw
/// TLV slice (header + content) in order.
fn sequence_elements(seq_content: &[u8]) -> Result<Vec<&[u8]>, PkdError> {
    let mut out = Vec::new();
    let mut cur = seq_content;
    while !cur.is_empty() {
        let (header, content, rest) = read_tlv(cur).map_err(|e| PkdError::InvalidDg2(e.to_string()))?;
        let element_len = header.header_len + header.content_len;
        out.push(&cur[..element_len]);
        cur = rest;
    }
    Ok(out)
}

/// The last OCTET STRING found among a `SEQUENCE`'s (possibly further
/// tag-wrapped) elements — variant A's "FaceImageBlock SEQUENCE whose
/// last OCTET STRING is the image payload".
fn last_octet_string_in_sequence(seq_content: &[u8]) -> Result<&[u8], PkdError> {
    let elements = sequence_elements(seq_content)?;
    let mut last = None;
    for element in elements {
        if let Ok(Unwrapped::OctetString(content)) = unwrap_branch(element) {
            last = Some(content);
        }
    }
    last.ok_or_else(|| PkdError::InvalidDg2("FaceImageBlock SEQUENCE has no OCTET STRING element".into()))
}

/// Parse one `FaceInfo` element, branching across variants A/B/C.
/// Variant D (extra tag wrapping at any level) is handled
/// transparently by [`unwrap_branch`]/[`unwrap_tagged_layers`] peeling
/// as many layers as present before classifying.
fn parse_face_info(face_info_element: &[u8]) -> Result<&[u8], PkdError> {
    match unwrap_branch(face_info_element)? {
        // Variant C: FaceInfo is directly an OCTET STRING.
        Unwrapped::OctetString(payload) => Ok(payload),
        // Variant A or B: FaceInfo is a SEQUENCE.
        Unwrapped::Sequence(seq_content) => {
            let elements = sequence_elements(seq_content)?;
            let first = elements
                .first()
                .ok_or_else(|| PkdError::InvalidDg2("FaceInfo SEQUENCE is empty".into()))?;
            match unwrap_branch(first)? {
                // Variant B: first element of FaceInfo is directly an OCTET STRING.
                Unwrapped::OctetString(payload) => Ok(payload),
                // Variant A: descend into the FaceImageBlock SEQUENCE and take
                // its last OCTET STRING.
                Unwrapped::Sequence(block_content) => last_octet_string_in_sequence(block_content),
            }
        }
    }
}

/// Locate the `FaceInfos` SEQUENCE within the DG2 top-level SEQUENCE.
fn locate_face_infos(top_sequence_content: &[u8]) -> Result<&[u8], PkdError> {
    let elements = sequence_elements(top_sequence_content)?;
    let last = elements
        .last()
        .ok_or_else(|| PkdError::InvalidDg2("DG2 top-level SEQUENCE is empty".into()))?;
    match unwrap_branch(last)? {
        Unwrapped::Sequence(content) => Ok(content),
        Unwrapped::OctetString(_) => Err(PkdError::InvalidDg2("expected FaceInfos SEQUENCE, found OCTET STRING".into())),
    }
}

/// Parse a DG2 data group, extracting every face image across the four
/// observed variants. Payloads of 100 bytes or fewer
/// (metadata-only entries) are filtered from the result.
pub fn parse_dg2(dg2_bytes: &[u8]) -> Result<Dg2Result, PkdError> {
    let (top_header, top_content) = unwrap_tagged_layers(dg2_bytes).map_err(|e| PkdError::InvalidDg2(e.to_string()))?;
    if top_header.class != TagClass::Universal || top_header.number != UNIVERSAL_SEQUENCE {
        return Err(PkdError::InvalidDg2("DG2 does not contain a top-level SEQUENCE".into()));
    }

    let face_infos_content = locate_face_infos(top_content)?;
    let face_info_elements = sequence_elements(face_infos_content)?;

    let mut face_images = Vec::new();
    for element in face_info_elements {
        let payload = parse_face_info(element)?;
        if let Some(image) = build_face_image(payload) {
            face_images.push(image);
        }
    }

    Ok(Dg2Result {
        face_count: face_images.len(),
        face_images,
    })
}
