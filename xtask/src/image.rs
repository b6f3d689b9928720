// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use mcu_builder::layout::read_section;
use mcu_builder::{FlashLayout, ImageSummary, PayloadMap};
use mcu_config::CrcParams;
use mcu_config_stm32f4::flash::{
    self, sectors_spanned, FLASH_BASE_ADDR, FLASH_END_ADDR, UPDATE_IMAGE_SYMBOLS,
};
use std::path::Path;

use crate::layout_args::LayoutArgs;

/// Resolves the layout and merges file payloads with the ones the layout
/// source produced itself.
fn resolve_with_payloads(
    args: &LayoutArgs,
    files: &[(&str, &Path)],
) -> Result<(FlashLayout, PayloadMap)> {
    let required: Vec<&str> = files.iter().map(|(region, _)| *region).collect();
    let resolution = args.resolver(&required)?.resolve()?;
    let mut payloads = resolution.payloads;
    for (region, data) in mcu_builder::read_payloads(files.iter().copied())? {
        if payloads.contains_key(&region) {
            bail!("region {region} was given more than one payload");
        }
        payloads.insert(region, data);
    }
    Ok((resolution.layout, payloads))
}

pub(crate) fn compose(args: &LayoutArgs, files: &[(&str, &Path)], output: &Path) -> Result<()> {
    let mut seen = Vec::new();
    for (region, _) in files {
        if seen.contains(region) {
            bail!("region {region} was given more than one payload");
        }
        seen.push(*region);
    }
    let (layout, payloads) = resolve_with_payloads(args, files)?;
    let summary = mcu_builder::compose_to_file(&layout, &payloads, output)
        .with_context(|| format!("Failed to compose {}", output.display()))?;
    print_summary(&summary);
    println!("Image written to {}", output.display());
    Ok(())
}

pub(crate) fn combine(args: &LayoutArgs, files: &[(&str, &Path)], output: &Path) -> Result<()> {
    compose(args, files, output)
}

/// Sector numbers only mean something for layouts of the STM32F407 flash.
fn is_stm32f4_layout(summary: &ImageSummary) -> bool {
    let known = flash::preset(&summary.layout).is_some()
        || summary.layout == UPDATE_IMAGE_SYMBOLS.name;
    known
        && summary
            .regions
            .iter()
            .all(|r| r.address >= FLASH_BASE_ADDR && r.address + r.size <= FLASH_END_ADDR)
}

fn print_summary(summary: &ImageSummary) {
    print!("{summary}");
    if !is_stm32f4_layout(summary) {
        return;
    }
    for region in &summary.regions {
        let sectors: Vec<String> = sectors_spanned(region.address, region.size)
            .iter()
            .map(|s| s.index.to_string())
            .collect();
        if !sectors.is_empty() {
            println!("  {:<20} sectors {}", region.name, sectors.join(","));
        }
    }
}

pub(crate) fn show_layout(args: &LayoutArgs) -> Result<()> {
    let resolution = args.resolver(&[])?.resolve()?;
    print_summary(&ImageSummary::new(&resolution.layout, &resolution.payloads));
    for region in resolution.layout.regions() {
        if let Some(target) = &region.describes {
            println!("  {:<20} describes {target}", region.name);
        }
    }
    Ok(())
}

pub(crate) fn verify(args: &LayoutArgs, image: &Path, crc: &CrcParams) -> Result<()> {
    let layout = args.resolver(&[])?.resolve()?.layout;
    let bytes =
        std::fs::read(image).with_context(|| format!("Cannot read file '{}'", image.display()))?;
    if bytes.len() as u64 != layout.image_size() {
        bail!(
            "{} is {} bytes but layout {} produces {} bytes",
            image.display(),
            bytes.len(),
            layout.name,
            layout.image_size()
        );
    }
    let verified = mcu_builder::verify_image(&layout, &bytes, crc)?;
    if verified.is_empty() {
        bail!("layout {} has no metadata regions to verify", layout.name);
    }
    for component in &verified {
        let version = component
            .metadata
            .firmware_version()
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!(
            "{}: version {}, {} bytes, crc {:#010x}, verified by {}",
            component.firmware_region,
            version,
            component.metadata.firmware_size.get(),
            component.metadata.firmware_crc32.get(),
            component.metadata_region
        );
    }
    println!("Image is valid!");
    Ok(())
}

pub(crate) fn extract_section(elf: &Path, section: &str, output: &Path) -> Result<()> {
    let section = read_section(elf, section)?;
    mcu_builder::write_atomic(output, &section.data)?;
    println!(
        "Wrote {} bytes of {} (address {:#010x}) to {}",
        section.data.len(),
        section.name,
        section.address,
        output.display()
    );
    Ok(())
}
