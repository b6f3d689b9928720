// Licensed under the Apache-2.0 license

//! Flash layouts and the strategies that produce them.
//!
//! A [`FlashLayout`] is an ordered list of regions addressed relative to the
//! start of the output image. Layouts are always validated on construction:
//! regions are ascending, never overlap, have unique names and, when the end
//! of flash is known, fit inside it.

mod config;
mod elf_section;
mod symbols;
mod table;

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::debug;
use mcu_config::FlashLayoutSpec;

use crate::error::{BuildError, Result};

pub use config::{load_layout_file, load_symbol_map, SymbolMap, SymbolMapRegion};
pub use elf_section::{read_section, ObjectSection, ObjectSectionLayout, DEFAULT_SECTION};
pub use symbols::{scan_symbols, SymbolLayout};
pub use table::StaticLayout;

/// Value written to bytes no payload covers; matches erased NOR flash.
pub const DEFAULT_FILL_BYTE: u8 = 0xFF;

/// Payload bytes keyed by region name.
pub type PayloadMap = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRegion {
    pub name: String,
    /// Offset from the start of the image file.
    pub start_offset: u64,
    pub size: u64,
    pub fill_byte: u8,
    pub reserved: bool,
    pub describes: Option<String>,
}

impl FlashRegion {
    pub fn new(name: impl Into<String>, start_offset: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            start_offset,
            size,
            fill_byte: DEFAULT_FILL_BYTE,
            reserved: false,
            describes: None,
        }
    }

    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    pub fn describes(mut self, firmware: impl Into<String>) -> Self {
        self.describes = Some(firmware.into());
        self
    }

    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    pub name: String,
    /// Absolute address of image offset 0.
    pub flash_base_address: u64,
    /// Exclusive absolute end of the flash window, when known.
    pub flash_end_address: Option<u64>,
    regions: Vec<FlashRegion>,
}

impl FlashLayout {
    pub fn new(
        name: impl Into<String>,
        flash_base_address: u64,
        flash_end_address: Option<u64>,
        regions: Vec<FlashRegion>,
    ) -> Result<Self> {
        let layout = Self {
            name: name.into(),
            flash_base_address,
            flash_end_address,
            regions,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Converts a compiled-in layout table. Region addresses are absolute
    /// and must not precede the layout origin.
    pub fn from_spec(spec: &FlashLayoutSpec) -> Result<Self> {
        let regions = spec
            .regions
            .iter()
            .map(|r| {
                if r.address < spec.origin {
                    return Err(BuildError::AddressOutOfRange {
                        region: r.name.to_string(),
                        address: r.address,
                        start: spec.origin,
                        end: spec.flash_end.unwrap_or(u64::MAX),
                    });
                }
                let mut region = FlashRegion::new(r.name, r.address - spec.origin, r.size);
                region.reserved = r.reserved;
                region.describes = r.describes.map(str::to_string);
                Ok(region)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(spec.name, spec.origin, spec.flash_end, regions)
    }

    fn validate(&self) -> Result<()> {
        let mut end = 0u64;
        for (i, region) in self.regions.iter().enumerate() {
            if self.regions[..i].iter().any(|r| r.name == region.name) {
                return Err(BuildError::InvalidConfig {
                    path: PathBuf::from(&self.name),
                    reason: format!("region {} is defined more than once", region.name),
                });
            }
            // An empty region may share its offset with the next one.
            if i > 0 && region.start_offset < end {
                return Err(BuildError::OffsetOverlap {
                    region: region.name.clone(),
                    offset: region.start_offset,
                    end,
                });
            }
            let region_end = region
                .start_offset
                .checked_add(region.size)
                .and_then(|e| e.checked_add(self.flash_base_address));
            let out_of_range = match (region_end, self.flash_end_address) {
                (None, _) => true,
                (Some(e), Some(flash_end)) => e > flash_end,
                (Some(_), None) => false,
            };
            if out_of_range {
                return Err(BuildError::AddressOutOfRange {
                    region: region.name.clone(),
                    address: self.flash_base_address.saturating_add(region.start_offset),
                    start: self.flash_base_address,
                    end: self.flash_end_address.unwrap_or(u64::MAX),
                });
            }
            if let Some(target) = &region.describes {
                if !self.regions.iter().any(|r| &r.name == target) {
                    return Err(BuildError::RegionNotFound(target.clone()));
                }
            }
            end = region.end_offset();
        }
        debug!(
            "layout {}: {} regions, {:#x} bytes from {:#010x}",
            self.name,
            self.regions.len(),
            self.image_size(),
            self.flash_base_address
        );
        Ok(())
    }

    pub fn regions(&self) -> &[FlashRegion] {
        &self.regions
    }

    pub fn region(&self, name: &str) -> Option<&FlashRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Like [`FlashLayout::region`] but missing regions are an error.
    pub fn require(&self, name: &str) -> Result<&FlashRegion> {
        self.region(name)
            .ok_or_else(|| BuildError::RegionNotFound(name.to_string()))
    }

    pub fn absolute_address(&self, region: &FlashRegion) -> u64 {
        self.flash_base_address + region.start_offset
    }

    /// Length of a composed image: the end of the last region.
    pub fn image_size(&self) -> u64 {
        self.regions.last().map_or(0, FlashRegion::end_offset)
    }
}

/// Output of a [`LayoutResolver`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub layout: FlashLayout,
    /// Payloads the strategy itself produced, such as an extracted object
    /// section. Usually empty.
    pub payloads: PayloadMap,
}

impl Resolution {
    pub fn new(layout: FlashLayout) -> Self {
        Self {
            layout,
            payloads: PayloadMap::new(),
        }
    }
}

/// A way of working out where each component goes in flash.
pub trait LayoutResolver {
    fn resolve(&self) -> Result<Resolution>;
}

impl<T: LayoutResolver + ?Sized> LayoutResolver for Box<T> {
    fn resolve(&self) -> Result<Resolution> {
        (**self).resolve()
    }
}
