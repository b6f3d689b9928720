// Licensed under the Apache-2.0 license

use anyhow::{Context, Result};
use mcu_builder::{MetadataArgs, MetadataMirror};
use mcu_config::CrcParams;
use std::path::Path;

pub(crate) fn generate(args: MetadataArgs) -> Result<()> {
    let report = mcu_builder::generate_metadata(&args).with_context(|| {
        format!(
            "Failed to generate metadata for {}",
            args.firmware.display()
        )
    })?;
    let info = &report.metadata.mirror.info;
    println!("Version:      {}", info.version);
    println!("Build time:   {} ({})", info.build_time, info.build_timestamp);
    println!("Size:         {} bytes", info.firmware_size);
    println!("CRC32:        {}", info.firmware_crc32);
    println!("SHA-256:      {}", info.sha256);
    println!("MCU:          {}", info.mcu_name);
    println!("Metadata:     {}", report.binary_path.display());
    println!("JSON:         {}", report.json_path.display());
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Cannot read file '{}'", path.display()))
}

pub(crate) fn dump(path: &Path) -> Result<()> {
    let bytes = read(path)?;
    let block = mcu_builder::decode_metadata(&bytes, &path.display().to_string())?;
    println!("{}", MetadataMirror::describe(&block, None).to_json()?);
    Ok(())
}

pub(crate) fn verify(metadata: &Path, firmware: &Path, crc: &CrcParams) -> Result<()> {
    let name = metadata.display().to_string();
    let block = mcu_builder::decode_metadata(&read(metadata)?, &name)?;
    mcu_builder::verify_metadata(&block, &read(firmware)?, crc, &name)?;
    println!(
        "{} matches {} ({} bytes, crc {:#010x})",
        name,
        firmware.display(),
        block.firmware_size.get(),
        block.firmware_crc32.get()
    );
    Ok(())
}
