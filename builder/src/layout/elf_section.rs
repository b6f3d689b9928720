// Licensed under the Apache-2.0 license

use std::path::{Path, PathBuf};

use elf::endian::AnyEndian;
use elf::ElfBytes;
use log::{debug, info};

use super::{LayoutResolver, Resolution};
use crate::error::{read_input, BuildError, Result};

/// Section the firmware build reserves for its pre-built metadata block.
pub const DEFAULT_SECTION: &str = ".firmware_version";

/// Raw contents of one ELF section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSection {
    pub name: String,
    /// Link address, zero for sections that are not allocated.
    pub address: u64,
    pub data: Vec<u8>,
}

/// Extracts the bytes of section `name` from the ELF object at `path`. The
/// contents are returned as stored; nothing is decoded.
pub fn read_section(path: &Path, name: &str) -> Result<ObjectSection> {
    let bytes = read_input(path)?;
    let invalid = |reason: String| BuildError::InvalidObject {
        path: path.to_path_buf(),
        reason,
    };

    let elf_file = ElfBytes::<AnyEndian>::minimal_parse(&bytes)
        .map_err(|e| invalid(format!("failed to parse ELF file: {e}")))?;
    let shdr = elf_file
        .section_header_by_name(name)
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| BuildError::SectionNotFound {
            section: name.to_string(),
            path: path.to_path_buf(),
        })?;
    let (data, compression) = elf_file
        .section_data(&shdr)
        .map_err(|e| invalid(e.to_string()))?;
    if compression.is_some() {
        return Err(invalid(format!("section {name} is compressed")));
    }

    debug!(
        "{}: section {name} at {:#010x}, {} bytes",
        path.display(),
        shdr.sh_addr,
        data.len()
    );
    Ok(ObjectSection {
        name: name.to_string(),
        address: shdr.sh_addr,
        data: data.to_vec(),
    })
}

/// Wraps another resolver and binds the contents of an object file section
/// to one of its regions. This is how a metadata block compiled into the
/// firmware itself reaches the image without being regenerated.
pub struct ObjectSectionLayout {
    base: Box<dyn LayoutResolver>,
    object: PathBuf,
    section: String,
    region: String,
}

impl ObjectSectionLayout {
    pub fn new(
        base: Box<dyn LayoutResolver>,
        object: impl Into<PathBuf>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            base,
            object: object.into(),
            section: DEFAULT_SECTION.to_string(),
            region: region.into(),
        }
    }

    pub fn section(mut self, name: impl Into<String>) -> Self {
        self.section = name.into();
        self
    }
}

impl LayoutResolver for ObjectSectionLayout {
    fn resolve(&self) -> Result<Resolution> {
        let mut resolution = self.base.resolve()?;
        let region = resolution.layout.require(&self.region)?;
        let region_address = resolution.layout.absolute_address(region);

        let section = read_section(&self.object, &self.section)?;
        if section.address != 0 && section.address != region_address {
            return Err(BuildError::SectionAddressMismatch {
                section: self.section.clone(),
                path: self.object.clone(),
                region: self.region.clone(),
                section_address: section.address,
                region_address,
            });
        }

        info!(
            "Using {} from {} for region {}",
            self.section,
            self.object.display(),
            self.region
        );
        resolution.payloads.insert(self.region.clone(), section.data);
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StaticLayout;
    use mcu_config_stm32f4::flash::UPDATE_IMAGE;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const EHSIZE: usize = 52;
    const SHENTSIZE: usize = 40;
    const SHT_PROGBITS: u32 = 1;
    const SHT_STRTAB: u32 = 3;
    const SHF_ALLOC: u32 = 2;

    fn section_header(out: &mut Vec<u8>, fields: [u32; 10]) {
        for field in fields {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }

    /// Minimal little-endian ELF32 object with one data section.
    fn build_elf(section: &str, data: &[u8], address: u32) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let section_name = strtab.len() as u32;
        strtab.extend_from_slice(section.as_bytes());
        strtab.push(0);
        let strtab_name = strtab.len() as u32;
        strtab.extend_from_slice(b".shstrtab\0");

        let data_offset = EHSIZE;
        let strtab_offset = data_offset + data.len();
        let shoff = (strtab_offset + strtab.len()).next_multiple_of(4);

        let mut elf = Vec::new();
        elf.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
        elf.extend_from_slice(&[0; 8]);
        elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        elf.extend_from_slice(&40u16.to_le_bytes()); // EM_ARM
        elf.extend_from_slice(&1u32.to_le_bytes());
        elf.extend_from_slice(&0u32.to_le_bytes()); // entry
        elf.extend_from_slice(&0u32.to_le_bytes()); // phoff
        elf.extend_from_slice(&(shoff as u32).to_le_bytes());
        elf.extend_from_slice(&0u32.to_le_bytes()); // flags
        elf.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
        elf.extend_from_slice(&32u16.to_le_bytes()); // phentsize
        elf.extend_from_slice(&0u16.to_le_bytes()); // phnum
        elf.extend_from_slice(&(SHENTSIZE as u16).to_le_bytes());
        elf.extend_from_slice(&3u16.to_le_bytes()); // shnum
        elf.extend_from_slice(&2u16.to_le_bytes()); // shstrndx
        assert_eq!(elf.len(), EHSIZE);

        elf.extend_from_slice(data);
        elf.extend_from_slice(&strtab);
        elf.resize(shoff, 0);

        section_header(&mut elf, [0; 10]);
        section_header(
            &mut elf,
            [
                section_name,
                SHT_PROGBITS,
                SHF_ALLOC,
                address,
                data_offset as u32,
                data.len() as u32,
                0,
                0,
                4,
                0,
            ],
        );
        section_header(
            &mut elf,
            [
                strtab_name,
                SHT_STRTAB,
                0,
                0,
                strtab_offset as u32,
                strtab.len() as u32,
                0,
                0,
                1,
                0,
            ],
        );
        elf
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_section() {
        let payload: Vec<u8> = (0..64).collect();
        let file = write_temp(&build_elf(DEFAULT_SECTION, &payload, 0x080F_FC00));
        let section = read_section(file.path(), DEFAULT_SECTION).unwrap();
        assert_eq!(section.address, 0x080F_FC00);
        assert_eq!(section.data, payload);
    }

    #[test]
    fn test_section_not_found() {
        let file = write_temp(&build_elf(".text", &[0; 4], 0));
        assert!(matches!(
            read_section(file.path(), DEFAULT_SECTION),
            Err(BuildError::SectionNotFound { section, .. }) if section == DEFAULT_SECTION
        ));
    }

    #[test]
    fn test_not_an_object() {
        let file = write_temp(b"definitely not an ELF file, just some text");
        assert!(matches!(
            read_section(file.path(), DEFAULT_SECTION),
            Err(BuildError::InvalidObject { .. })
        ));
    }

    #[test]
    fn test_binds_section_to_region() {
        let payload = vec![0xA5; 64];
        let file = write_temp(&build_elf(DEFAULT_SECTION, &payload, 0x080F_FC00));
        let resolver = ObjectSectionLayout::new(
            Box::new(StaticLayout::preset(&UPDATE_IMAGE)),
            file.path(),
            "app_metadata",
        );
        let resolution = resolver.resolve().unwrap();
        assert_eq!(resolution.payloads.get("app_metadata"), Some(&payload));
    }

    #[test]
    fn test_section_bytes_reach_image() {
        let block: Vec<u8> = (0..64u8).rev().collect();
        let file = write_temp(&build_elf(DEFAULT_SECTION, &block, 0));
        let resolver = ObjectSectionLayout::new(
            Box::new(StaticLayout::preset(&UPDATE_IMAGE)),
            file.path(),
            "boot_sec_metadata",
        );
        let mut resolution = resolver.resolve().unwrap();
        for name in ["boot_sec", "app", "app_metadata"] {
            resolution.payloads.insert(name.to_string(), vec![0x11; 16]);
        }

        let image = crate::compose::compose(&resolution.layout, &resolution.payloads).unwrap();
        let offset = resolution
            .layout
            .require("boot_sec_metadata")
            .unwrap()
            .start_offset as usize;
        assert_eq!(&image[offset..offset + block.len()], &block[..]);
        assert_eq!(image[offset + block.len()], 0xFF);
    }

    #[test]
    fn test_unlinked_section_is_accepted() {
        let file = write_temp(&build_elf(".meta", &[1, 2, 3, 4], 0));
        let resolver = ObjectSectionLayout::new(
            Box::new(StaticLayout::preset(&UPDATE_IMAGE)),
            file.path(),
            "boot_sec_metadata",
        )
        .section(".meta");
        let resolution = resolver.resolve().unwrap();
        assert_eq!(resolution.payloads["boot_sec_metadata"], vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_address_mismatch() {
        let file = write_temp(&build_elf(DEFAULT_SECTION, &[0; 64], 0x0807_FC00));
        let resolver = ObjectSectionLayout::new(
            Box::new(StaticLayout::preset(&UPDATE_IMAGE)),
            file.path(),
            "app_metadata",
        );
        assert!(matches!(
            resolver.resolve(),
            Err(BuildError::SectionAddressMismatch {
                section_address: 0x0807_FC00,
                region_address: 0x080F_FC00,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_region() {
        let file = write_temp(&build_elf(DEFAULT_SECTION, &[0; 64], 0));
        let resolver = ObjectSectionLayout::new(
            Box::new(StaticLayout::preset(&UPDATE_IMAGE)),
            file.path(),
            "app_cert",
        );
        assert!(matches!(
            resolver.resolve(),
            Err(BuildError::RegionNotFound(name)) if name == "app_cert"
        ));
    }
}
