//! DN composition and RFC 4514/4515 escaping.

/// Escape a DN attribute value per RFC 4514 §2.4: a leading space or `#`,
/// a trailing space, and any of `,+="<>;\` are escaped with a backslash;
/// embedded NUL is escaped as `\00`.
pub fn escape_dn_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == chars.len() - 1;
        match c {
            ',' | '+' | '=' | '<' | '>' | ';' | '\\' | '"' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_first || is_last => {
                out.push('\\');
                out.push(c);
            }
            '#' if is_first => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for use in an RFC 4515 LDAP search filter: `*`, `(`,
/// `)`, `\`, and NUL are escaped as `\XX` hex.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'*' => out.push_str("\\2a"),
            b'(' => out.push_str("\\28"),
            b')' => out.push_str("\\29"),
            b'\\' => out.push_str("\\5c"),
            0 => out.push_str("\\00"),
            _ => out.push(byte as char),
        }
    }
    out
}

/// The artifact class an entry belongs to, determining DN shape and
/// `objectClass` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    Csca,
    Dsc,
    Crl,
}

impl ArtifactClass {
    fn o_value(self) -> &'static str {
        match self {
            ArtifactClass::Csca => "csca",
            ArtifactClass::Dsc => "dsc",
            ArtifactClass::Crl => "crl",
        }
    }
}

/// Compose the DN for a certificate entry: `cn=<escaped subject
/// DN>+sn=<serial-hex>, o=<class>, c=<CC>, <base-dn>`.
pub fn certificate_dn(
    class: ArtifactClass,
    subject_dn: &str,
    serial_hex: &str,
    country_code: &str,
    base_dn: &str,
) -> String {
    format!(
        "cn={}+sn={},o={},c={},{}",
        escape_dn_value(subject_dn),
        escape_dn_value(serial_hex),
        class.o_value(),
        escape_dn_value(country_code),
        base_dn
    )
}

/// Compose the DN for a CRL entry: `cn=<escaped issuer DN>, o=crl,
/// c=<CC>, <base-dn>`.
pub fn crl_dn(issuer_dn: &str, country_code: &str, base_dn: &str) -> String {
    format!(
        "cn={},o={},c={},{}",
        escape_dn_value(issuer_dn),
        ArtifactClass::Crl.o_value(),
        escape_dn_value(country_code),
        base_dn
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_dn_value("CN=A,B"), "CN\\=A\\,B");
        assert_eq!(escape_dn_value("A+B"), "A\\+B");
        assert_eq!(escape_dn_value("A<B>"), "A\\<B\\>");
        assert_eq!(escape_dn_value("A;B"), "A\\;B");
        assert_eq!(escape_dn_value(r#"A"B"#), "A\\\"B");
    }

    #[test]
    fn escapes_leading_and_trailing_space() {
        assert_eq!(escape_dn_value(" A "), "\\ A\\ ");
        assert_eq!(escape_dn_value("A B"), "A B");
    }

    #[test]
    fn escapes_leading_hash_only() {
        assert_eq!(escape_dn_value("#tag"), "\\#tag");
        assert_eq!(escape_dn_value("a#tag"), "a#tag");
    }

    #[test]
    fn filter_escaping_covers_wildcards_and_parens() {
        assert_eq!(escape_filter_value("a*b(c)d\\e"), "a\\2ab\\28c\\29d\\5ce");
    }

    #[test]
    fn certificate_dn_has_expected_shape() {
        let dn = certificate_dn(
            ArtifactClass::Csca,
            "CN=CSCA-KR,C=KR",
            "01AB",
            "KR",
            "dc=pkd,dc=example",
        );
        assert_eq!(dn, "cn=CN\\=CSCA-KR\\,C\\=KR+sn=01AB,o=csca,c=KR,dc=pkd,dc=example");
    }

    #[test]
    fn crl_dn_has_expected_shape() {
        let dn = crl_dn("CN=CSCA-KR,C=KR", "KR", "dc=pkd,dc=example");
        assert_eq!(dn, "cn=CN\\=CSCA-KR\\,C\\=KR,o=crl,c=KR,dc=pkd,dc=example");
    }
}
