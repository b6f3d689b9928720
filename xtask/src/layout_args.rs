// Licensed under the Apache-2.0 license

use anyhow::{anyhow, Result};
use clap::Args;
use mcu_builder::layout::{
    load_symbol_map, ObjectSectionLayout, StaticLayout, SymbolLayout, SymbolMap,
};
use mcu_builder::LayoutResolver;
use mcu_config_stm32f4::flash::{self, UPDATE_IMAGE_SYMBOLS};
use std::path::PathBuf;

/// Where the flash layout comes from. Exactly one source must be named.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct LayoutSource {
    /// Compiled-in layout: stm32f407-update or stm32f407-factory
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// TOML layout file
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Generated header to read region addresses from
    #[arg(long, value_name = "FILE")]
    header: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct LayoutArgs {
    #[command(flatten)]
    source: LayoutSource,

    /// TOML symbol map for --header (default: the STM32F407 update image)
    #[arg(long, value_name = "FILE", requires = "header")]
    symbols: Option<PathBuf>,

    /// ELF object whose section supplies a region's contents
    #[arg(long, value_name = "FILE", requires = "section_region")]
    elf: Option<PathBuf>,

    /// Section to take from --elf
    #[arg(long, value_name = "NAME", requires = "elf")]
    section: Option<String>,

    /// Region that receives the --elf section
    #[arg(long, value_name = "REGION", requires = "elf")]
    section_region: Option<String>,
}

impl LayoutArgs {
    /// Builds the resolver for these arguments. `required` lists regions the
    /// command is going to fill.
    pub(crate) fn resolver(&self, required: &[&str]) -> Result<Box<dyn LayoutResolver>> {
        let base: Box<dyn LayoutResolver> = match &self.source {
            LayoutSource {
                preset: Some(name), ..
            } => {
                let spec = flash::preset(name).ok_or_else(|| {
                    let known: Vec<&str> = flash::PRESETS.iter().map(|p| p.name).collect();
                    anyhow!("unknown preset {name}, expected one of {}", known.join(", "))
                })?;
                Box::new(StaticLayout::preset(spec).require(required))
            }
            LayoutSource {
                layout: Some(path), ..
            } => Box::new(StaticLayout::file(path).require(required)),
            LayoutSource {
                header: Some(path), ..
            } => {
                let map = match &self.symbols {
                    Some(symbols) => load_symbol_map(symbols)?,
                    None => SymbolMap::from(&UPDATE_IMAGE_SYMBOLS),
                };
                Box::new(SymbolLayout::new(path, map))
            }
            _ => return Err(anyhow!("no layout source given")),
        };

        match (&self.elf, &self.section_region) {
            (Some(elf), Some(region)) => {
                let mut layout = ObjectSectionLayout::new(base, elf, region);
                if let Some(section) = &self.section {
                    layout = layout.section(section);
                }
                Ok(Box::new(layout))
            }
            _ => Ok(base),
        }
    }
}
