//! Date/time formats
//!
//! ISO9660 records timestamps two ways: a packed 7-byte form in
//! directory records and a 17-byte ASCII form in volume descriptors.

/// 7-byte directory record datetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTime7 {
    /// Years since 1900
    pub year: u8,

    /// Month (1-12)
    pub month: u8,

    /// Day (1-31)
    pub day: u8,

    /// Hour (0-23)
    pub hour: u8,

    /// Minute (0-59)
    pub minute: u8,

    /// Second (0-59)
    pub second: u8,

    /// GMT offset in 15-minute intervals (-48 to +52)
    pub gmt_offset: i8,
}

impl DateTime7 {
    /// Parse from the 7-byte record field
    pub fn from_bytes(bytes: &[u8; 7]) -> Self {
        Self {
            year: bytes[0],
            month: bytes[1],
            day: bytes[2],
            hour: bytes[3],
            minute: bytes[4],
            second: bytes[5],
            gmt_offset: bytes[6] as i8,
        }
    }

    /// Encode into the 7-byte record field
    pub fn to_bytes(&self) -> [u8; 7] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.gmt_offset as u8,
        ]
    }

    /// Full year (1900 + year)
    pub fn full_year(&self) -> u16 {
        1900 + self.year as u16
    }
}

/// Encode the 17-byte ASCII volume descriptor datetime
///
/// An all-zero `DateTime7` encodes the "not specified" form: sixteen
/// ASCII '0' digits and a zero offset byte, per ECMA-119 8.4.26.1.
pub fn encode_vd_datetime(dt: &DateTime7) -> [u8; 17] {
    let mut out = [b'0'; 17];
    out[16] = 0;
    if *dt == DateTime7::default() {
        return out;
    }
    let text = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}00",
        dt.full_year(),
        dt.month,
        dt.day,
        dt.hour,
        dt.minute,
        dt.second
    );
    out[..16].copy_from_slice(text.as_bytes());
    out[16] = dt.gmt_offset as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_byte_round_trip() {
        let dt = DateTime7 {
            year: 126,
            month: 8,
            day: 30,
            hour: 12,
            minute: 34,
            second: 56,
            gmt_offset: -8,
        };
        assert_eq!(DateTime7::from_bytes(&dt.to_bytes()), dt);
        assert_eq!(dt.full_year(), 2026);
    }

    #[test]
    fn unspecified_vd_datetime_is_zero_digits() {
        let encoded = encode_vd_datetime(&DateTime7::default());
        assert_eq!(&encoded[..16], b"0000000000000000");
        assert_eq!(encoded[16], 0);
    }

    #[test]
    fn vd_datetime_formats_ascii() {
        let dt = DateTime7 {
            year: 126,
            month: 8,
            day: 30,
            hour: 1,
            minute: 2,
            second: 3,
            gmt_offset: 0,
        };
        let encoded = encode_vd_datetime(&dt);
        assert_eq!(&encoded[..16], b"2026083001020300");
    }
}
