// Licensed under the Apache-2.0 license

//! STM32F407VG flash map (1 MiB, 12 sectors).
//!
//! | Sector | Size   | Start       | Use                                  |
//! |--------|--------|-------------|--------------------------------------|
//! | 0      | 16 KB  | 0x0800_0000 | Primary bootloader                   |
//! | 1      | 16 KB  | 0x0800_4000 | Private certificate                  |
//! | 2      | 16 KB  | 0x0800_8000 | Error logs                           |
//! | 3      | 16 KB  | 0x0800_C000 | Boot flags and configuration         |
//! | 4      | 64 KB  | 0x0801_0000 | Secondary bootloader                 |
//! | 5-7    | 128 KB | 0x0802_0000 | Application, metadata + cert at end  |
//! | 8      | 128 KB | 0x0808_0000 | Reserved / staged secondary (upper)  |
//! | 9-11   | 128 KB | 0x080A_0000 | Staged application, metadata + cert  |

use mcu_config::{FlashLayoutSpec, FlashRegionSpec, FlashSector, SymbolMapSpec, SymbolRegionSpec};

pub const FLASH_BASE_ADDR: u64 = 0x0800_0000;
pub const FLASH_TOTAL_SIZE: u64 = 1024 * 1024;
pub const FLASH_END_ADDR: u64 = FLASH_BASE_ADDR + FLASH_TOTAL_SIZE;

const KB: u64 = 1024;

/// Space at the end of each firmware slot for metadata and certificate.
pub const SLOT_TRAILER_SIZE: u64 = KB;
pub const METADATA_REGION_SIZE: u64 = 512;
pub const CERT_REGION_SIZE: u64 = 512;

pub const SECTORS: &[FlashSector] = &[
    sector(0, 0x0800_0000, 16 * KB),
    sector(1, 0x0800_4000, 16 * KB),
    sector(2, 0x0800_8000, 16 * KB),
    sector(3, 0x0800_C000, 16 * KB),
    sector(4, 0x0801_0000, 64 * KB),
    sector(5, 0x0802_0000, 128 * KB),
    sector(6, 0x0804_0000, 128 * KB),
    sector(7, 0x0806_0000, 128 * KB),
    sector(8, 0x0808_0000, 128 * KB),
    sector(9, 0x080A_0000, 128 * KB),
    sector(10, 0x080C_0000, 128 * KB),
    sector(11, 0x080E_0000, 128 * KB),
];

const fn sector(index: u8, address: u64, size: u64) -> FlashSector {
    FlashSector {
        index,
        address,
        size,
    }
}

pub fn sector_from_address(address: u64) -> Option<&'static FlashSector> {
    SECTORS.iter().find(|s| s.contains(address))
}

/// Sectors touched by `[address, address + size)`.
pub fn sectors_spanned(address: u64, size: u64) -> Vec<&'static FlashSector> {
    if size == 0 {
        return Vec::new();
    }
    let end = address + size;
    SECTORS
        .iter()
        .filter(|s| s.address < end && address < s.end())
        .collect()
}

const NEW_BOOTLOADER2_START: u64 = 0x0809_0000;
const NEW_BOOTLOADER2_SIZE: u64 = 64 * KB;
const NEW_APP_START: u64 = 0x080A_0000;
const NEW_APP_TOTAL_SIZE: u64 = 384 * KB;

/// Update image staged by the running application: secondary bootloader in
/// the upper half of sector 8 followed by the application in sectors 9-11.
/// The image ends after the application metadata; the trailing certificate
/// is written by the signing step.
pub const UPDATE_IMAGE: FlashLayoutSpec = FlashLayoutSpec {
    name: "stm32f407-update",
    origin: NEW_BOOTLOADER2_START,
    flash_end: Some(FLASH_END_ADDR),
    regions: &[
        FlashRegionSpec::new(
            "boot_sec",
            NEW_BOOTLOADER2_START,
            NEW_BOOTLOADER2_SIZE - SLOT_TRAILER_SIZE,
        ),
        FlashRegionSpec::new(
            "boot_sec_metadata",
            NEW_BOOTLOADER2_START + NEW_BOOTLOADER2_SIZE - SLOT_TRAILER_SIZE,
            METADATA_REGION_SIZE,
        )
        .describes("boot_sec"),
        FlashRegionSpec::new(
            "boot_sec_cert",
            NEW_BOOTLOADER2_START + NEW_BOOTLOADER2_SIZE - CERT_REGION_SIZE,
            CERT_REGION_SIZE,
        )
        .reserved(),
        FlashRegionSpec::new("app", NEW_APP_START, NEW_APP_TOTAL_SIZE - SLOT_TRAILER_SIZE),
        FlashRegionSpec::new(
            "app_metadata",
            NEW_APP_START + NEW_APP_TOTAL_SIZE - SLOT_TRAILER_SIZE,
            METADATA_REGION_SIZE,
        )
        .describes("app"),
    ],
};

/// Symbols the generated `flash_layout.hpp` defines for the update image.
/// Image offset 0 is the start of the staged secondary bootloader.
pub const UPDATE_IMAGE_SYMBOLS: SymbolMapSpec = SymbolMapSpec {
    name: "stm32f407-update",
    flash_base_symbol: "FLASH_BASE_ADDR",
    origin_symbol: Some("NEW_BOOTLOADER2_START"),
    flash_end: Some(FLASH_END_ADDR),
    regions: &[
        SymbolRegionSpec::new("boot_sec", "NEW_BOOTLOADER2_START"),
        SymbolRegionSpec::new("boot_sec_metadata", "NEW_BOOTLOADER2_METADATA_START")
            .size(METADATA_REGION_SIZE)
            .describes("boot_sec"),
        SymbolRegionSpec::new("app", "NEW_APP_START"),
        SymbolRegionSpec::new("app_metadata", "NEW_APP_METADATA_START")
            .size(METADATA_REGION_SIZE)
            .describes("app"),
    ],
};

const APP_START: u64 = 0x0802_0000;
const APP_TOTAL_SIZE: u64 = 384 * KB;

/// Factory image of the whole device as laid out in the firmware's own
/// flash map. This variant has no metadata slot for the secondary
/// bootloader.
pub const FACTORY_IMAGE: FlashLayoutSpec = FlashLayoutSpec {
    name: "stm32f407-factory",
    origin: FLASH_BASE_ADDR,
    flash_end: Some(FLASH_END_ADDR),
    regions: &[
        FlashRegionSpec::new("boot_prim", 0x0800_0000, 16 * KB),
        FlashRegionSpec::new("cert_private", 0x0800_4000, 16 * KB).reserved(),
        FlashRegionSpec::new("error_log", 0x0800_8000, 16 * KB).reserved(),
        FlashRegionSpec::new("config", 0x0800_C000, 16 * KB).reserved(),
        FlashRegionSpec::new("boot_sec", 0x0801_0000, 64 * KB),
        FlashRegionSpec::new("app", APP_START, APP_TOTAL_SIZE - SLOT_TRAILER_SIZE),
        FlashRegionSpec::new(
            "app_metadata",
            APP_START + APP_TOTAL_SIZE - SLOT_TRAILER_SIZE,
            METADATA_REGION_SIZE,
        )
        .describes("app"),
        FlashRegionSpec::new(
            "app_cert",
            APP_START + APP_TOTAL_SIZE - CERT_REGION_SIZE,
            CERT_REGION_SIZE,
        )
        .reserved(),
    ],
};

pub const PRESETS: &[&FlashLayoutSpec] = &[&UPDATE_IMAGE, &FACTORY_IMAGE];

pub fn preset(name: &str) -> Option<&'static FlashLayoutSpec> {
    PRESETS.iter().copied().find(|p| p.name == name)
}
