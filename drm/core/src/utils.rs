use data_encoding::{BASE64, BASE64URL_NOPAD, DecodeError};

/**
    Constant-time-agnostic byte slice equality usable in `const` contexts.
*/
pub const fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/**
    Value of a single ASCII hex digit.
*/
pub const fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/**
    ASCII case-insensitive comparison of two strings.
*/
pub fn eq_ignore_ascii_case(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.eq_ignore_ascii_case(b)
}

/**
    Decode standard base64, ignoring any ASCII whitespace (manifests often
    wrap long `cenc:pssh` values across lines).
*/
pub fn decode_base64_lenient(input: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact.as_bytes())
}

/**
    Encode as unpadded base64url, the form used for JWK `kid` and `k` members.
*/
pub fn base64url_encode(bytes: &[u8]) -> String {
    BASE64URL_NOPAD.encode(bytes)
}

/**
    Decode base64url, accepting inputs with or without trailing `=` padding.
*/
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64URL_NOPAD.decode(input.trim().trim_end_matches('=').as_bytes())
}

/**
    Parse a key ID written as 32 hex digits, with or without UUID dashes.
*/
pub fn parse_kid(s: &str) -> Option<[u8; 16]> {
    let mut out = [0u8; 16];
    let mut idx = 0;
    let mut high: Option<u8> = None;
    for c in s.trim().bytes() {
        if c == b'-' {
            continue;
        }
        let v = hex_digit(c)?;
        match high.take() {
            None => high = Some(v),
            Some(h) => {
                if idx >= 16 {
                    return None;
                }
                out[idx] = (h << 4) | v;
                idx += 1;
            }
        }
    }
    (idx == 16 && high.is_none()).then_some(out)
}
