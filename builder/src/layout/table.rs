// Licensed under the Apache-2.0 license

use std::path::PathBuf;

use log::debug;
use mcu_config::FlashLayoutSpec;

use super::{load_layout_file, FlashLayout, LayoutResolver, Resolution};
use crate::error::Result;

enum Source {
    Preset(&'static FlashLayoutSpec),
    File(PathBuf),
}

/// Layout taken from a fixed table, either compiled in or loaded from a
/// TOML layout file.
pub struct StaticLayout {
    source: Source,
    required: Vec<String>,
}

impl StaticLayout {
    pub fn preset(spec: &'static FlashLayoutSpec) -> Self {
        Self {
            source: Source::Preset(spec),
            required: Vec::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
            required: Vec::new(),
        }
    }

    /// Region names that must be present in the table.
    pub fn require<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.required
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }
}

impl LayoutResolver for StaticLayout {
    fn resolve(&self) -> Result<Resolution> {
        let layout = match &self.source {
            Source::Preset(spec) => {
                debug!("using compiled-in layout {}", spec.name);
                FlashLayout::from_spec(spec)?
            }
            Source::File(path) => {
                debug!("loading layout from {}", path.display());
                load_layout_file(path)?
            }
        };
        for name in &self.required {
            layout.require(name)?;
        }
        Ok(Resolution::new(layout))
    }
}
