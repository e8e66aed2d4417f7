//! DG2 (face biometric) parsing: format detection for the JPEG2000
//! magic (not exercised by the unit tests, which only cover JPEG) and a
//! FaceInfos container holding more than one face.

use pkd_core::pa::dg2::{parse_dg2, ImageFormat};

const JPEG2000_MAGIC: [u8; 6] = [0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const UNIVERSAL_OCTET_STRING: u8 = 0x04;
const UNIVERSAL_SEQUENCE: u8 = 0x30;

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if content.len() < 128 {
        out.push(content.len() as u8);
    } else {
        let len_bytes = (content.len() as u32).to_be_bytes();
        let significant: Vec<u8> = len_bytes.iter().copied().skip_while(|&b| b == 0).collect();
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(&significant);
    }
    out.extend_from_slice(content);
    out
}

fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(UNIVERSAL_OCTET_STRING, content)
}

fn sequence(content: &[u8]) -> Vec<u8> {
    tlv(UNIVERSAL_SEQUENCE, content)
}

fn iso_19794_5_header() -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(b"FAC\0");
    header.extend_from_slice(b"010\0");
    header.extend_from_slice(&[0, 0, 0, 0]);
    header.extend_from_slice(&[0, 1]);
    header.extend_from_slice(&[0; 6]);
    header
}

fn iso_19794_5_jpeg(image_body_len: usize) -> Vec<u8> {
    let mut payload = iso_19794_5_header();
    payload.extend_from_slice(&JPEG_MAGIC);
    payload.extend(std::iter::repeat(0xAA).take(image_body_len));
    payload
}

fn iso_19794_5_jpeg2000(image_body_len: usize) -> Vec<u8> {
    let mut payload = iso_19794_5_header();
    payload.extend_from_slice(&[0, 0, 0, 0]); // box-length prefix, not checked by the parser
    payload.extend_from_slice(&JPEG2000_MAGIC);
    payload.extend(std::iter::repeat(0xBB).take(image_body_len));
    payload
}

#[test]
fn jpeg2000_magic_is_detected_after_its_box_length_prefix() {
    let payload = iso_19794_5_jpeg2000(200);
    let face_info = octet_string(&payload); // variant C
    let face_infos = sequence(&face_info);
    let top = sequence(&face_infos);

    let result = parse_dg2(&top).unwrap();
    assert_eq!(result.face_count, 1);
    assert_eq!(result.face_images[0].format, ImageFormat::Jpeg2000);
    assert_eq!(result.face_images[0].data_url.split(',').next().unwrap(), "data:image/jp2;base64");
}

#[test]
fn two_face_infos_in_one_dg2_produce_two_face_images() {
    let jpeg_payload = iso_19794_5_jpeg(150);
    let jpeg2000_payload = iso_19794_5_jpeg2000(150);

    let first = octet_string(&jpeg_payload);
    let second = octet_string(&jpeg2000_payload);
    let face_infos = sequence(&[first, second].concat());
    let top = sequence(&face_infos);

    let result = parse_dg2(&top).unwrap();
    assert_eq!(result.face_count, 2);
    assert_eq!(result.face_images[0].format, ImageFormat::Jpeg);
    assert_eq!(result.face_images[1].format, ImageFormat::Jpeg2000);
}

#[test]
fn a_lone_unrecognized_magic_is_reported_unknown_but_still_extracted() {
    let mut payload = iso_19794_5_header();
    payload.extend(std::iter::repeat(0xCC).take(200));
    let face_info = octet_string(&payload);
    let face_infos = sequence(&face_info);
    let top = sequence(&face_infos);

    let result = parse_dg2(&top).unwrap();
    assert_eq!(result.face_count, 1);
    assert_eq!(result.face_images[0].format, ImageFormat::Unknown);
}
