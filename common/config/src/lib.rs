// Licensed under the Apache-2.0 license

#![cfg_attr(target_arch = "arm", no_std)]

//! Static descriptions of flash maps and checksum parameters.
//!
//! Platform crates provide concrete values; the image builder turns them
//! into validated layouts.

/// One named region of a flash map, addressed absolutely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRegionSpec {
    pub name: &'static str,
    pub address: u64,
    pub size: u64,
    /// Never filled by the image builder (certificates, reserved gaps).
    pub reserved: bool,
    /// For metadata regions: the firmware region the metadata describes.
    pub describes: Option<&'static str>,
}

impl FlashRegionSpec {
    pub const fn new(name: &'static str, address: u64, size: u64) -> Self {
        Self {
            name,
            address,
            size,
            reserved: false,
            describes: None,
        }
    }

    pub const fn reserved(self) -> Self {
        Self {
            reserved: true,
            ..self
        }
    }

    pub const fn describes(self, firmware: &'static str) -> Self {
        Self {
            describes: Some(firmware),
            ..self
        }
    }

    pub const fn end(&self) -> u64 {
        self.address + self.size
    }
}

/// A complete flash layout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLayoutSpec {
    pub name: &'static str,
    /// Absolute address that maps to offset 0 of the produced image.
    pub origin: u64,
    /// Exclusive end of the flash window the layout must fit in.
    pub flash_end: Option<u64>,
    pub regions: &'static [FlashRegionSpec],
}

impl FlashLayoutSpec {
    pub fn region(&self, name: &str) -> Option<&FlashRegionSpec> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// A region whose start address comes from a symbol in a build-generated
/// header. Without a fixed size the region extends to the next region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRegionSpec {
    pub name: &'static str,
    pub start_symbol: &'static str,
    pub size: Option<u64>,
    pub reserved: bool,
    pub describes: Option<&'static str>,
}

impl SymbolRegionSpec {
    pub const fn new(name: &'static str, start_symbol: &'static str) -> Self {
        Self {
            name,
            start_symbol,
            size: None,
            reserved: false,
            describes: None,
        }
    }

    pub const fn size(self, size: u64) -> Self {
        Self {
            size: Some(size),
            ..self
        }
    }

    pub const fn reserved(self) -> Self {
        Self {
            reserved: true,
            ..self
        }
    }

    pub const fn describes(self, firmware: &'static str) -> Self {
        Self {
            describes: Some(firmware),
            ..self
        }
    }
}

/// Which header symbols describe a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolMapSpec {
    pub name: &'static str,
    pub flash_base_symbol: &'static str,
    /// Symbol holding the address of image offset 0. Defaults to the flash
    /// base when absent.
    pub origin_symbol: Option<&'static str>,
    pub flash_end: Option<u64>,
    pub regions: &'static [SymbolRegionSpec],
}

/// An erase unit of the flash controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSector {
    pub index: u8,
    pub address: u64,
    pub size: u64,
}

impl FlashSector {
    pub const fn end(&self) -> u64 {
        self.address + self.size
    }

    pub const fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }
}

/// Parameters of a 32-bit CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcParams {
    pub name: &'static str,
    /// Generator polynomial in normal (MSB-first) notation.
    pub polynomial: u32,
    pub init: u32,
    /// Reflect both input bytes and the final remainder.
    pub reflect: bool,
    pub xor_out: u32,
    /// Zero-fill a trailing partial word before computing. Word-fed CRC
    /// units load the last bytes into the high lanes of a zeroed register.
    pub pad_to_word: bool,
}

/// CRC-32/MPEG-2 over the byte stream.
pub const CRC32_MPEG2: CrcParams = CrcParams {
    name: "crc32-mpeg2",
    polynomial: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
    reflect: false,
    xor_out: 0x0000_0000,
    pad_to_word: false,
};

/// The common reflected CRC-32 (zlib, Ethernet, PNG).
pub const CRC32_ISO_HDLC: CrcParams = CrcParams {
    name: "crc32-iso-hdlc",
    polynomial: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
    reflect: true,
    xor_out: 0xFFFF_FFFF,
    pad_to_word: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    const REGIONS: &[FlashRegionSpec] = &[
        FlashRegionSpec::new("boot", 0x0800_0000, 0x4000),
        FlashRegionSpec::new("boot_metadata", 0x0800_4000, 0x200).describes("boot"),
        FlashRegionSpec::new("cert", 0x0800_4200, 0x200).reserved(),
    ];

    #[test]
    fn test_region_builders() {
        assert_eq!(REGIONS[1].describes, Some("boot"));
        assert!(!REGIONS[1].reserved);
        assert!(REGIONS[2].reserved);
        assert_eq!(REGIONS[0].end(), 0x0800_4000);
    }

    #[test]
    fn test_layout_lookup() {
        let layout = FlashLayoutSpec {
            name: "test",
            origin: 0x0800_0000,
            flash_end: None,
            regions: REGIONS,
        };
        assert_eq!(layout.region("cert").map(|r| r.address), Some(0x0800_4200));
        assert!(layout.region("app").is_none());
    }

    #[test]
    fn test_symbol_region_builders() {
        let region = SymbolRegionSpec::new("app_metadata", "APP_METADATA_START")
            .size(0x200)
            .describes("app");
        assert_eq!(region.size, Some(0x200));
        assert_eq!(region.describes, Some("app"));
        assert!(SymbolRegionSpec::new("app", "APP_START").size.is_none());
    }

    #[test]
    fn test_sector_contains() {
        let sector = FlashSector {
            index: 4,
            address: 0x0801_0000,
            size: 0x1_0000,
        };
        assert!(sector.contains(0x0801_FFFF));
        assert!(!sector.contains(0x0802_0000));
    }
}
