// Licensed under the Apache-2.0 license

//! TOML layout and symbol map files.
//!
//! Both formats carry a `format_version` so that older tools refuse files
//! they do not understand instead of misreading them.

use std::path::Path;

use mcu_config::SymbolMapSpec;
use serde::Deserialize;

use super::{FlashLayout, FlashRegion, DEFAULT_FILL_BYTE};
use crate::error::{read_input_text, BuildError, Result};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutFile {
    format_version: u32,
    name: String,
    flash_base_address: u64,
    #[serde(default)]
    flash_end_address: Option<u64>,
    #[serde(rename = "region", default)]
    regions: Vec<LayoutFileRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutFileRegion {
    name: String,
    /// Absolute address.
    address: u64,
    size: u64,
    #[serde(default)]
    reserved: bool,
    #[serde(default)]
    describes: Option<String>,
    #[serde(default)]
    fill_byte: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SymbolMapFile {
    format_version: u32,
    name: String,
    flash_base_symbol: String,
    #[serde(default)]
    origin_symbol: Option<String>,
    #[serde(default)]
    flash_end_address: Option<u64>,
    #[serde(rename = "region", default)]
    regions: Vec<SymbolMapRegion>,
}

/// Which header symbols make up a layout. See [`super::SymbolLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMap {
    pub name: String,
    pub flash_base_symbol: String,
    pub origin_symbol: Option<String>,
    pub flash_end_address: Option<u64>,
    pub regions: Vec<SymbolMapRegion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolMapRegion {
    pub name: String,
    pub start_symbol: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub describes: Option<String>,
}

impl From<&SymbolMapSpec> for SymbolMap {
    fn from(spec: &SymbolMapSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            flash_base_symbol: spec.flash_base_symbol.to_string(),
            origin_symbol: spec.origin_symbol.map(str::to_string),
            flash_end_address: spec.flash_end,
            regions: spec
                .regions
                .iter()
                .map(|r| SymbolMapRegion {
                    name: r.name.to_string(),
                    start_symbol: r.start_symbol.to_string(),
                    size: r.size,
                    reserved: r.reserved,
                    describes: r.describes.map(str::to_string),
                })
                .collect(),
        }
    }
}

fn parse_toml<T: for<'de> Deserialize<'de>>(text: &str, path: &Path) -> Result<T> {
    toml::de::from_str(text).map_err(|e| BuildError::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.message().to_string(),
    })
}

fn check_format_version(version: u32, path: &Path) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(BuildError::InvalidConfig {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported format_version {version}, this tool reads version {FORMAT_VERSION}"
            ),
        });
    }
    Ok(())
}

/// Loads and validates a TOML layout file.
pub fn load_layout_file(path: &Path) -> Result<FlashLayout> {
    parse_layout(&read_input_text(path)?, path)
}

fn parse_layout(text: &str, path: &Path) -> Result<FlashLayout> {
    let file: LayoutFile = parse_toml(text, path)?;
    check_format_version(file.format_version, path)?;

    let base = file.flash_base_address;
    let regions = file
        .regions
        .into_iter()
        .map(|r| {
            if r.address < base {
                return Err(BuildError::AddressOutOfRange {
                    region: r.name,
                    address: r.address,
                    start: base,
                    end: file.flash_end_address.unwrap_or(u64::MAX),
                });
            }
            let mut region = FlashRegion::new(r.name, r.address - base, r.size);
            region.reserved = r.reserved;
            region.describes = r.describes;
            region.fill_byte = r.fill_byte.unwrap_or(DEFAULT_FILL_BYTE);
            Ok(region)
        })
        .collect::<Result<Vec<_>>>()?;
    FlashLayout::new(file.name, base, file.flash_end_address, regions)
}

/// Loads a TOML symbol map for the header strategy.
pub fn load_symbol_map(path: &Path) -> Result<SymbolMap> {
    parse_symbol_map(&read_input_text(path)?, path)
}

fn parse_symbol_map(text: &str, path: &Path) -> Result<SymbolMap> {
    let file: SymbolMapFile = parse_toml(text, path)?;
    check_format_version(file.format_version, path)?;
    if file.regions.is_empty() {
        return Err(BuildError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "no regions defined".into(),
        });
    }
    Ok(SymbolMap {
        name: file.name,
        flash_base_symbol: file.flash_base_symbol,
        origin_symbol: file.origin_symbol,
        flash_end_address: file.flash_end_address,
        regions: file.regions,
    })
}
