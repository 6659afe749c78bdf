//! Identifier encodings
//!
//! ISO9660 restricts identifiers to d-characters (A-Z, 0-9, _) and
//! a-characters (d-characters plus a handful of punctuation). The writer
//! maps arbitrary source names onto those alphabets; the reader only
//! trims and strips version suffixes.

/// Trim trailing spaces from a byte slice
pub fn trim_trailing_spaces(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1] == b' ' {
        end -= 1;
    }
    &bytes[..end]
}

/// Convert ISO9660 d-characters to a string, trimming padding
pub fn dchars_to_str(bytes: &[u8]) -> Result<&str, core::str::Utf8Error> {
    core::str::from_utf8(trim_trailing_spaces(bytes))
}

/// Strip the version suffix from a file identifier
/// (e.g. "FILE.TXT;1" -> "FILE.TXT"), plus any trailing dot
pub fn strip_version(name: &str) -> &str {
    let base = name.split(';').next().unwrap_or(name);
    base.strip_suffix('.').unwrap_or(base)
}

/// Whether a byte is a d-character
pub fn is_dchar(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_'
}

/// Map an arbitrary source name onto the d-character alphabet,
/// preserving at most one dot. Out-of-alphabet bytes become `_`.
pub fn to_dchar_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut seen_dot = false;
    for b in name.bytes() {
        let up = b.to_ascii_uppercase();
        if b == b'.' && !seen_dot {
            seen_dot = true;
            out.push('.');
        } else if is_dchar(up) {
            out.push(up as char);
        } else {
            out.push('_');
        }
    }
    out
}

/// Copy a string into a fixed-width field, space padded, truncated
pub fn copy_padded(dst: &mut [u8], src: &str) {
    dst.fill(b' ');
    let bytes = src.as_bytes();
    let len = bytes.len().min(dst.len());
    dst[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_suffix_is_stripped() {
        assert_eq!(strip_version("FILE.TXT;1"), "FILE.TXT");
        assert_eq!(strip_version("FILE.;1"), "FILE");
        assert_eq!(strip_version("NOVERSION"), "NOVERSION");
    }

    #[test]
    fn dchar_mapping_substitutes() {
        assert_eq!(to_dchar_identifier("readme.txt"), "README.TXT");
        assert_eq!(to_dchar_identifier("a-b c.d.e"), "A_B_C.D_E");
    }

    #[test]
    fn padded_copy_truncates_and_pads() {
        let mut field = [0u8; 8];
        copy_padded(&mut field, "ABC");
        assert_eq!(&field, b"ABC     ");
        copy_padded(&mut field, "ABCDEFGHIJ");
        assert_eq!(&field, b"ABCDEFGH");
    }
}
