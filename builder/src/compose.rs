// Licensed under the Apache-2.0 license

use std::fmt;
use std::path::Path;

use flash_image::FirmwareMetadata;
use log::{debug, info, warn};
use mcu_config::CrcParams;

use crate::error::{read_input, BuildError, Result};
use crate::layout::{FlashLayout, FlashRegion, PayloadMap};
use crate::metadata::{decode_metadata, verify_metadata};
use crate::output::write_atomic;

/// Lays out `payloads` according to `layout`.
///
/// Gaps between regions and the unused tail of each region are filled with
/// the region's fill byte. The image ends where the last region ends.
pub fn compose(layout: &FlashLayout, payloads: &PayloadMap) -> Result<Vec<u8>> {
    if let Some(name) = payloads.keys().find(|name| layout.region(name).is_none()) {
        return Err(BuildError::RegionNotFound(name.clone()));
    }

    let mut image = Vec::with_capacity(layout.image_size() as usize);
    for region in layout.regions() {
        let cursor = image.len() as u64;
        if cursor > region.start_offset {
            return Err(BuildError::OffsetOverlap {
                region: region.name.clone(),
                offset: region.start_offset,
                end: cursor,
            });
        }
        image.resize(region.start_offset as usize, region.fill_byte);

        let payload: &[u8] = match payloads.get(&region.name) {
            Some(payload) => payload.as_slice(),
            None if region.reserved => {
                warn!("region {} left empty", region.name);
                &[]
            }
            None => return Err(BuildError::MissingPayload(region.name.clone())),
        };
        if payload.len() as u64 > region.size {
            return Err(BuildError::SizeOverflow {
                region: region.name.clone(),
                len: payload.len() as u64,
                size: region.size,
            });
        }
        debug!(
            "{}: {} of {} bytes at offset {:#x}",
            region.name,
            payload.len(),
            region.size,
            region.start_offset
        );
        image.extend_from_slice(payload);
        image.resize(region.end_offset() as usize, region.fill_byte);
    }
    Ok(image)
}

/// Reads one payload file per region.
pub fn read_payloads<'a, I>(entries: I) -> Result<PayloadMap>
where
    I: IntoIterator<Item = (&'a str, &'a Path)>,
{
    let mut payloads = PayloadMap::new();
    for (region, path) in entries {
        let data = read_input(path)?;
        debug!("{region}: {} bytes from {}", data.len(), path.display());
        payloads.insert(region.to_string(), data);
    }
    Ok(payloads)
}

/// Composes the image and writes it to `path`. Nothing is written unless
/// every region was placed.
pub fn compose_to_file(layout: &FlashLayout, payloads: &PayloadMap, path: &Path) -> Result<ImageSummary> {
    let image = compose(layout, payloads)?;
    write_atomic(path, &image)?;
    info!(
        "Flash image written to {} ({} bytes)",
        path.display(),
        image.len()
    );
    Ok(ImageSummary::new(layout, payloads))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSummary {
    pub name: String,
    pub offset: u64,
    pub address: u64,
    pub size: u64,
    pub used: u64,
    pub reserved: bool,
}

/// Where every region landed, for printing after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub layout: String,
    pub base_address: u64,
    pub image_size: u64,
    pub regions: Vec<RegionSummary>,
}

impl ImageSummary {
    pub fn new(layout: &FlashLayout, payloads: &PayloadMap) -> Self {
        let regions = layout
            .regions()
            .iter()
            .map(|region: &FlashRegion| RegionSummary {
                name: region.name.clone(),
                offset: region.start_offset,
                address: layout.absolute_address(region),
                size: region.size,
                used: payloads
                    .get(&region.name)
                    .map_or(0, |p| p.len() as u64),
                reserved: region.reserved,
            })
            .collect();
        Self {
            layout: layout.name.clone(),
            base_address: layout.flash_base_address,
            image_size: layout.image_size(),
            regions,
        }
    }
}

impl fmt::Display for ImageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Layout {} at {:#010x}, {} bytes",
            self.layout, self.base_address, self.image_size
        )?;
        writeln!(
            f,
            "  {:<20} {:>10} {:>10} {:>10} {:>10}",
            "region", "address", "offset", "size", "used"
        )?;
        for r in &self.regions {
            let used = if r.reserved && r.used == 0 {
                "reserved".to_string()
            } else {
                r.used.to_string()
            };
            writeln!(
                f,
                "  {:<20} {:#010x} {:>#10x} {:>10} {:>10}",
                r.name, r.address, r.offset, r.size, used
            )?;
        }
        Ok(())
    }
}

/// A metadata region that checked out against its firmware.
#[derive(Debug, Clone)]
pub struct VerifiedComponent {
    pub metadata_region: String,
    pub firmware_region: String,
    pub metadata: FirmwareMetadata,
}

fn region_bytes<'a>(image: &'a [u8], region: &FlashRegion) -> Result<&'a [u8]> {
    image
        .get(region.start_offset as usize..region.end_offset() as usize)
        .ok_or_else(|| BuildError::InvalidMetadata {
            source_name: region.name.clone(),
            reason: format!(
                "image is {} bytes, region ends at offset {:#x}",
                image.len(),
                region.end_offset()
            ),
        })
}

/// Checks every metadata region of a composed image against the firmware
/// region it describes, the way the bootloader validates a staged update.
pub fn verify_image(layout: &FlashLayout, image: &[u8], crc: &CrcParams) -> Result<Vec<VerifiedComponent>> {
    let mut verified = Vec::new();
    for region in layout.regions() {
        let Some(target) = &region.describes else {
            continue;
        };
        let metadata = decode_metadata(region_bytes(image, region)?, &region.name)?;
        let firmware_region = layout.require(target)?;
        let firmware = region_bytes(image, firmware_region)?;

        let size = metadata.firmware_size.get() as usize;
        let Some(firmware) = firmware.get(..size) else {
            return Err(BuildError::InvalidMetadata {
                source_name: region.name.clone(),
                reason: format!(
                    "firmware_size {size} exceeds region {} of {} bytes",
                    firmware_region.name, firmware_region.size
                ),
            });
        };
        verify_metadata(&metadata, firmware, crc, &region.name)?;
        debug!("{} matches {}", region.name, firmware_region.name);
        verified.push(VerifiedComponent {
            metadata_region: region.name.clone(),
            firmware_region: firmware_region.name.clone(),
            metadata,
        });
    }
    Ok(verified)
}
