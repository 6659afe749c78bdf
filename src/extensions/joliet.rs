//! Joliet UCS-2 name codec
//!
//! Joliet stores identifiers as UCS-2 big-endian in a parallel
//! Supplementary hierarchy. The escape sequence that announces it is
//! detected on the volume descriptor; this module only converts names.

/// Decode a UCS-2BE identifier; unpaired surrogates become U+FFFD
pub fn decode_ucs2_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Encode a name as UCS-2BE bytes
pub fn encode_ucs2_be(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() * 2);
    for unit in name.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_case_and_spaces() {
        let name = "Mixed Case Name.txt";
        assert_eq!(decode_ucs2_be(&encode_ucs2_be(name)), name);
    }

    #[test]
    fn non_ascii_round_trip() {
        let name = "naïve résumé";
        assert_eq!(decode_ucs2_be(&encode_ucs2_be(name)), name);
    }

    #[test]
    fn odd_trailing_byte_ignored() {
        let mut bytes = encode_ucs2_be("AB");
        bytes.push(0x41);
        assert_eq!(decode_ucs2_be(&bytes), "AB");
    }
}
