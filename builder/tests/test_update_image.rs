// Licensed under the Apache-2.0 license

use std::path::{Path, PathBuf};

use mcu_builder::layout::{load_symbol_map, StaticLayout, SymbolLayout, SymbolMap};
use mcu_builder::{
    compose, compose_to_file, verify_image, BuildError, LayoutResolver, MetadataBuilder,
    PayloadMap,
};
use mcu_config_stm32f4::flash::{FACTORY_IMAGE, UPDATE_IMAGE, UPDATE_IMAGE_SYMBOLS};
use mcu_config_stm32f4::{HW_CRC, MCU_ID};
use tempfile::tempdir;

const UPDATE_ORIGIN: u64 = 0x0809_0000;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Secondary bootloader and application binaries plus their metadata.
fn update_payloads() -> PayloadMap {
    let sec: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
    let app: Vec<u8> = (0..10_001u32).map(|i| (i ^ 0x5A) as u8).collect();
    let mcu = std::str::from_utf8(&MCU_ID).unwrap();
    let builder = MetadataBuilder::new(&HW_CRC).timestamp(1_700_000_000);
    let sec_meta = builder.build("1.0", mcu, &sec).unwrap();
    let app_meta = builder.build("2.1.7", mcu, &app).unwrap();

    let mut payloads = PayloadMap::new();
    payloads.insert("boot_sec".into(), sec);
    payloads.insert("boot_sec_metadata".into(), sec_meta.as_bytes().to_vec());
    payloads.insert("app".into(), app);
    payloads.insert("app_metadata".into(), app_meta.as_bytes().to_vec());
    payloads
}

fn build(resolver: &dyn LayoutResolver) -> Vec<u8> {
    let resolution = resolver.resolve().unwrap();
    compose(&resolution.layout, &update_payloads()).unwrap()
}

#[test]
fn test_update_image_offsets() {
    let payloads = update_payloads();
    let image = build(&StaticLayout::preset(&UPDATE_IMAGE));

    // Offsets are relative to the staged secondary bootloader.
    let at = |address: u64| (address - UPDATE_ORIGIN) as usize;
    assert_eq!(image.len(), at(0x080F_FE00));
    assert_eq!(&image[..3000], &payloads["boot_sec"][..]);
    assert!(image[3000..at(0x0809_FC00)].iter().all(|&b| b == 0xFF));
    assert_eq!(&image[at(0x0809_FC00)..][..64], &payloads["boot_sec_metadata"][..]);
    assert!(image[at(0x0809_FC40)..at(0x080A_0000)].iter().all(|&b| b == 0xFF));
    assert_eq!(&image[at(0x080A_0000)..][..10_001], &payloads["app"][..]);
    assert_eq!(&image[at(0x080F_FC00)..][..64], &payloads["app_metadata"][..]);
    assert!(image[at(0x080F_FC40)..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_strategies_agree() {
    let preset = build(&StaticLayout::preset(&UPDATE_IMAGE));
    let from_file = build(&StaticLayout::file(fixture("update_layout.toml")));
    let from_header = build(&SymbolLayout::new(
        fixture("flash_layout.hpp"),
        SymbolMap::from(&UPDATE_IMAGE_SYMBOLS),
    ));
    let from_header_and_map = build(&SymbolLayout::new(
        fixture("flash_layout.hpp"),
        load_symbol_map(&fixture("update_symbols.toml")).unwrap(),
    ));
    assert_eq!(preset, from_file);
    assert_eq!(preset, from_header);
    assert_eq!(preset, from_header_and_map);
}

#[test]
fn test_symbol_map_file_matches_layout_file() {
    let from_file = StaticLayout::file(fixture("update_layout.toml"))
        .resolve()
        .unwrap();
    let from_header = SymbolLayout::new(
        fixture("flash_layout.hpp"),
        load_symbol_map(&fixture("update_symbols.toml")).unwrap(),
    )
    .resolve()
    .unwrap();
    assert_eq!(from_file.layout, from_header.layout);
}

#[test]
fn test_composed_image_verifies() {
    let resolution = StaticLayout::preset(&UPDATE_IMAGE).resolve().unwrap();
    let image = compose(&resolution.layout, &update_payloads()).unwrap();
    let verified = verify_image(&resolution.layout, &image, &HW_CRC).unwrap();
    let regions: Vec<&str> = verified
        .iter()
        .map(|c| c.firmware_region.as_str())
        .collect();
    assert_eq!(regions, ["boot_sec", "app"]);
}

#[test]
fn test_factory_layout_has_no_boot_sec_metadata() {
    let resolution = StaticLayout::preset(&FACTORY_IMAGE).resolve().unwrap();
    assert!(matches!(
        compose(&resolution.layout, &update_payloads()),
        Err(BuildError::RegionNotFound(name)) if name == "boot_sec_metadata"
    ));
}

#[test]
fn test_oversized_app_leaves_no_output() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("update.bin");
    let resolution = StaticLayout::preset(&UPDATE_IMAGE).resolve().unwrap();
    let mut payloads = update_payloads();
    payloads.insert("app".into(), vec![0; 0x5_FC01]);

    let result = compose_to_file(&resolution.layout, &payloads, &output);
    assert!(matches!(
        result,
        Err(BuildError::SizeOverflow { region, .. }) if region == "app"
    ));
    assert!(!output.exists());
}

#[test]
fn test_header_missing_symbol() {
    let dir = tempdir().unwrap();
    let header = dir.path().join("flash_layout.hpp");
    let text = std::fs::read_to_string(fixture("flash_layout.hpp")).unwrap();
    let text: String = text
        .lines()
        .filter(|l| !l.contains("NEW_BOOTLOADER2_METADATA_START"))
        .map(|l| format!("{l}\n"))
        .collect();
    std::fs::write(&header, text).unwrap();

    let result = SymbolLayout::new(&header, SymbolMap::from(&UPDATE_IMAGE_SYMBOLS)).resolve();
    assert!(matches!(
        result,
        Err(BuildError::SymbolNotFound { symbol, .. }) if symbol == "NEW_BOOTLOADER2_METADATA_START"
    ));
}
