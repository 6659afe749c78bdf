//! Boot Record Volume Descriptor (El Torito)
//!
//! Points at the El Torito boot catalog. The catalog's own entries are
//! outside this codec's scope; on the write path only the catalog
//! sector's placement is reserved.

/// Boot Record Volume Descriptor (type 0)
#[repr(C, packed)]
pub struct BootRecordVolumeDescriptor {
    /// Type code (0 for boot record)
    pub type_code: u8,
    /// Standard identifier "CD001"
    pub identifier: [u8; 5],
    /// Version (1)
    pub version: u8,
    /// Boot system identifier "EL TORITO SPECIFICATION" (32 bytes)
    pub boot_system_id: [u8; 32],
    /// Unused (32 bytes)
    pub unused: [u8; 32],
    /// Absolute LBA of the boot catalog (32-bit LE)
    pub boot_catalog_lba: [u8; 4],
    // Padding to 2048 bytes
}

impl BootRecordVolumeDescriptor {
    /// El Torito magic string
    pub const EL_TORITO_MAGIC: &'static [u8; 23] = b"EL TORITO SPECIFICATION";

    /// Check the boot system identifier
    pub fn validate(&self) -> bool {
        self.boot_system_id.starts_with(Self::EL_TORITO_MAGIC)
    }

    /// Boot catalog LBA
    pub fn catalog_lba(&self) -> u32 {
        u32::from_le_bytes(self.boot_catalog_lba)
    }
}

/// Parse a boot record from a descriptor sector; `None` when the boot
/// system identifier is not El Torito
pub fn parse(data: &[u8]) -> Option<&BootRecordVolumeDescriptor> {
    if data.len() < core::mem::size_of::<BootRecordVolumeDescriptor>() {
        return None;
    }
    let record = unsafe { &*(data.as_ptr() as *const BootRecordVolumeDescriptor) };
    record.validate().then_some(record)
}

/// Encode a Boot Record descriptor referencing a reserved catalog sector
pub fn encode(catalog_lba: u32) -> Vec<u8> {
    let mut d = vec![0u8; 2048];
    d[0] = 0;
    d[1..6].copy_from_slice(b"CD001");
    d[6] = 1;
    d[7..7 + BootRecordVolumeDescriptor::EL_TORITO_MAGIC.len()]
        .copy_from_slice(BootRecordVolumeDescriptor::EL_TORITO_MAGIC);
    d[71..75].copy_from_slice(&catalog_lba.to_le_bytes());
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_parse_round_trip() {
        let bytes = encode(40);
        let record = parse(&bytes).expect("el torito record");
        assert_eq!(record.catalog_lba(), 40);
    }

    #[test]
    fn non_el_torito_ignored() {
        let mut bytes = encode(40);
        bytes[7] = b'X';
        assert!(parse(&bytes).is_none());
    }
}
