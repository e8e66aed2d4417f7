//! DG1 (MRZ) parser.
//!
//! DG1 wraps an OCTET STRING containing the MRZ ASCII text, itself
//! wrapped in an unspecified number of APPLICATION/context-specific
//! tagging layers — the same "unwrap until you recognize something"
//! shape [`crate::crypto::asn1::unwrap_tagged_layers`] already handles
//! for DG2, reused here rather than re-implemented.

use crate::crypto::asn1::{unwrap_tagged_layers, TagClass, UNIVERSAL_OCTET_STRING};
use crate::error::PkdError;

const TD3_LENGTH: usize = 88;
const LINE_LENGTH: usize = 44;

/// TD3-format MRZ fields: two 44-character lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Td3Fields {
    pub document_type: String,
    pub issuing_country: String,
    pub surname: String,
    pub given_names: String,
    pub document_number: String,
    pub document_number_check_digit: char,
    pub nationality: String,
    pub date_of_birth: String,
    pub date_of_birth_check_digit: char,
    pub sex: String,
    pub expiration_date: String,
    pub expiration_date_check_digit: char,
    pub personal_number: String,
    pub personal_number_check_digit: char,
    pub composite_check_digit: char,
}

/// Unwrap DG1's tagging layers and decode the contained MRZ text as
/// US-ASCII ("Unwrap any number of APPLICATION/context-
/// specific TaggedObject layers until an OCTET STRING is reached").
pub fn decode_mrz_text(dg1_bytes: &[u8]) -> Result<String, PkdError> {
    let (header, content) =
        unwrap_tagged_layers(dg1_bytes).map_err(|e| PkdError::InvalidDg1(format!("could not locate MRZ OCTET STRING: {e}")))?;

    if header.class != TagClass::Universal || header.number != UNIVERSAL_OCTET_STRING {
        return Err(PkdError::InvalidDg1(format!(
            "expected OCTET STRING, found tag class {:?} number {}",
            header.class, header.number
        )));
    }

    if !content.is_ascii() {
        return Err(PkdError::InvalidDg1("MRZ content is not US-ASCII".into()));
    }
    Ok(String::from_utf8_lossy(content).into_owned())
}

fn field(s: &str, start: usize, end: usize) -> String {
    s.get(start..end).unwrap_or_default().trim_end_matches('<').replace('<', " ").trim().to_string()
}

fn raw_field(s: &str, start: usize, end: usize) -> String {
    s.get(start..end).unwrap_or_default().to_string()
}

fn char_at(s: &str, idx: usize) -> char {
    s.as_bytes().get(idx).copied().unwrap_or(b'<') as char
}

/// Parse a TD3-format MRZ ("Line 1... Line 2..."). Does not
/// itself verify check digits — see [`verify_check_digit`] for that,
/// which callers may treat as optional.
pub fn parse_td3(mrz_text: &str) -> Result<Td3Fields, PkdError> {
    let normalized: String = mrz_text.chars().filter(|c| !c.is_whitespace() || *c == '<').collect();
    if normalized.len() != TD3_LENGTH {
        return Err(PkdError::InvalidDg1(format!(
            "TD3 MRZ must be {TD3_LENGTH} characters, got {}",
            normalized.len()
        )));
    }

    let line1 = &normalized[0..LINE_LENGTH];
    let line2 = &normalized[LINE_LENGTH..TD3_LENGTH];

    let full_name = field(line1, 5, 44);
    let (surname, given_names) = match full_name.split_once("  ") {
        Some((s, g)) => (s.trim().to_string(), g.trim().to_string()),
        None => (full_name, String::new()),
    };
    // `field()` already collapsed `<` runs to single spaces, so the name
    // separator `<<` may have become a single space rather than two; fall
    // back to splitting on the raw line when that happens.
    let (surname, given_names) = if given_names.is_empty() && surname.contains(' ') {
        let raw_name = raw_field(line1, 5, 44);
        match raw_name.split_once("<<") {
            Some((s, g)) => (
                s.replace('<', " ").trim().to_string(),
                g.trim_end_matches('<').replace('<', " ").trim().to_string(),
            ),
            None => (surname, given_names),
        }
    } else {
        (surname, given_names)
    };

    Ok(Td3Fields {
        document_type: field(line1, 0, 1),
        issuing_country: field(line1, 2, 5),
        surname,
        given_names,
        document_number: field(line2, 0, 9),
        document_number_check_digit: char_at(line2, 9),
        nationality: field(line2, 10, 13),
        date_of_birth: raw_field(line2, 13, 19),
        date_of_birth_check_digit: char_at(line2, 19),
        sex: field(line2, 20, 21),
        expiration_date: raw_field(line2, 21, 27),
        expiration_date_check_digit: char_at(line2, 27),
        personal_number: field(line2, 28, 42),
        personal_number_check_digit: char_at(line2, 42),
        composite_check_digit: char_at(line2, 43),
    })
}

/// `YYMMDD` → `YYYY-MM-DD` with the ICAO pivot (`YY >= 50 →
/// 19YY`, `YY < 50 → 20YY`).
pub fn expand_mrz_date(yymmdd: &str) -> Option<String> {
    if yymmdd.len() != 6 || !yymmdd.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: u32 = yymmdd[0..2].parse().ok()?;
    let mm = &yymmdd[2..4];
    let dd = &yymmdd[4..6];
    let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
    Some(format!("{year:04}-{mm}-{dd}"))
}

/// The MRZ check-digit algorithm: weights `7,3,1` repeating
/// over the characters, `<` → 0, digit → its value, letter → `value -
/// 'A' + 10`, summed mod 10. Verification is optional but the algorithm
/// is implemented in full here for callers that opt in.
pub fn compute_check_digit(field: &str) -> u8 {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let sum: u32 = field
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let value = match b {
                b'<' => 0,
                b'0'..=b'9' => (b - b'0') as u32,
                b'A'..=b'Z' => (b - b'A') as u32 + 10,
                _ => 0,
            };
            value * WEIGHTS[i % 3]
        })
        .sum();
    (sum % 10) as u8
}

/// Verify `field`'s check digit against the MRZ's declared digit character.
pub fn verify_check_digit(field: &str, declared: char) -> bool {
    declared.to_digit(10).map(|d| d as u8) == Some(compute_check_digit(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    // A well-formed TD3 MRZ (two 44-char lines) for a fictional document.
    const LINE1: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<";
    const LINE2: &str = "L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    #[test]
    fn parses_td3_line1_fields() {
        let fields = parse_td3(&format!("{LINE1}{LINE2}")).unwrap();
        assert_eq!(fields.document_type, "P");
        assert_eq!(fields.issuing_country, "UTO");
        assert_eq!(fields.surname, "ERIKSSON");
        assert_eq!(fields.given_names, "ANNA MARIA");
    }

    #[test]
    fn parses_td3_line2_fields() {
        let fields = parse_td3(&format!("{LINE1}{LINE2}")).unwrap();
        assert_eq!(fields.document_number, "L898902C3");
        assert_eq!(fields.document_number_check_digit, '6');
        assert_eq!(fields.nationality, "UTO");
        assert_eq!(fields.date_of_birth, "740812");
        assert_eq!(fields.sex, "F");
        assert_eq!(fields.expiration_date, "120415");
        assert_eq!(fields.composite_check_digit, '0');
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(parse_td3("TOO SHORT").is_err());
    }

    #[test]
    fn expands_pivot_years() {
        assert_eq!(expand_mrz_date("740812").as_deref(), Some("1974-08-12"));
        assert_eq!(expand_mrz_date("120415").as_deref(), Some("2012-04-15"));
        assert_eq!(expand_mrz_date("500101").as_deref(), Some("1950-01-01"));
        assert_eq!(expand_mrz_date("490101").as_deref(), Some("2049-01-01"));
    }

    #[test]
    fn check_digit_matches_known_example() {
        // ICAO 9303 Part 4 worked example: document number field "L898902C3<"
        // with trailing check digit '6'.
        assert_eq!(compute_check_digit("L898902C3<"), 6);
        assert!(verify_check_digit("L898902C3<", '6'));
        assert!(!verify_check_digit("L898902C3<", '7'));
    }

    #[test]
    fn decodes_mrz_octet_string_through_tag_wrapper() {
        let mrz = format!("{LINE1}{LINE2}");
        let mut content = vec![0x04u8, mrz.len() as u8];
        content.extend_from_slice(mrz.as_bytes());
        let wrapped = {
            let mut w = vec![0x61u8, content.len() as u8];
            w.extend_from_slice(&content);
            w
        };
        let decoded = decode_mrz_text(&wrapped).unwrap();
        assert_eq!(decoded, mrz);
    }
}
