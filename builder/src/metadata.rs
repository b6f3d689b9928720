// Licensed under the Apache-2.0 license

//! Firmware metadata generation.
//!
//! A metadata block is built once per component from its version string and
//! binary. The binary record goes into flash; a JSON mirror with the same
//! values is written next to it for humans and release tooling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use flash_image::{
    pack_mcu_id, FirmwareMetadata, FirmwareVersion, METADATA_MAGIC, METADATA_SIZE,
};
use log::{debug, info};
use mcu_config::CrcParams;
use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, IntoBytes};

use crate::checksum;
use crate::error::{read_input, read_input_text, BuildError, Result};
use crate::output::write_atomic_all;

/// Builds [`FirmwareMetadata`] blocks with a fixed CRC configuration.
pub struct MetadataBuilder<'a> {
    crc: &'a CrcParams,
    timestamp: Option<u32>,
}

/// A metadata block together with the mirror produced from the same inputs.
#[derive(Debug, Clone)]
pub struct EncodedMetadata {
    pub block: FirmwareMetadata,
    pub mirror: MetadataMirror,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMirror {
    pub memory: MemoryFields,
    pub info: InfoFields,
}

/// Raw field values, hex encoded exactly as stored in the binary block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFields {
    pub magic: String,
    pub version: String,
    pub build_timestamp: String,
    pub firmware_size: String,
    pub firmware_crc32: String,
    pub reserved_a: String,
    pub reserved_b: String,
    pub mcu_id: String,
    pub sha256: String,
}

/// Decoded, human readable values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoFields {
    pub version: String,
    pub build_time: String,
    pub build_timestamp: u32,
    pub firmware_size: u32,
    pub firmware_crc32: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc: Option<String>,
    pub mcu_name: String,
    pub sha256: String,
}

impl<'a> MetadataBuilder<'a> {
    pub fn new(crc: &'a CrcParams) -> Self {
        Self {
            crc,
            timestamp: None,
        }
    }

    /// Uses a fixed build time instead of the wall clock, for reproducible
    /// output.
    pub fn timestamp(mut self, unix_seconds: u32) -> Self {
        self.timestamp = Some(unix_seconds);
        self
    }

    pub fn build(&self, version_text: &str, mcu_id: &str, firmware: &[u8]) -> Result<EncodedMetadata> {
        let version = parse_version(version_text)?;
        let mcu_id = parse_mcu_id(mcu_id)?;
        let firmware_size = u32::try_from(firmware.len()).map_err(|_| BuildError::SizeOverflow {
            region: "firmware".into(),
            len: firmware.len() as u64,
            size: u32::MAX as u64,
        })?;
        let build_timestamp = match self.timestamp {
            Some(ts) => ts,
            None => current_timestamp()?,
        };

        let crc = checksum::crc32(firmware, self.crc);
        let hash = checksum::sha256(firmware);
        debug!(
            "metadata: version {version}, {firmware_size} bytes, crc {crc:#010x} ({})",
            self.crc.name
        );

        let block = FirmwareMetadata::new(
            version,
            build_timestamp,
            firmware_size,
            crc,
            pack_mcu_id(mcu_id),
            hash,
        );
        let mirror = MetadataMirror::describe(&block, Some(self.crc));
        Ok(EncodedMetadata { block, mirror })
    }
}

impl EncodedMetadata {
    pub fn as_bytes(&self) -> &[u8] {
        self.block.as_bytes()
    }
}

impl MetadataMirror {
    pub fn describe(block: &FirmwareMetadata, crc: Option<&CrcParams>) -> Self {
        let version = block
            .firmware_version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "invalid".into());
        let timestamp = block.build_timestamp.get();
        let build_time = DateTime::<Utc>::from_timestamp(i64::from(timestamp), 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let sha256 = hex::encode(block.firmware_hash);

        Self {
            memory: MemoryFields {
                magic: hex32(block.magic.get()),
                version: hex32(block.version.get()),
                build_timestamp: hex32(timestamp),
                firmware_size: hex32(block.firmware_size.get()),
                firmware_crc32: hex32(block.firmware_crc32.get()),
                reserved_a: hex32(block.reserved[0].get()),
                reserved_b: hex32(block.reserved[1].get()),
                mcu_id: hex32(block.mcu_id.get()),
                sha256: sha256.clone(),
            },
            info: InfoFields {
                version,
                build_time,
                build_timestamp: timestamp,
                firmware_size: block.firmware_size.get(),
                firmware_crc32: hex32(block.firmware_crc32.get()),
                crc: crc.map(checksum::describe),
                mcu_name: String::from_utf8_lossy(&block.mcu_tag()).into_owned(),
                sha256,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BuildError::InvalidMetadata {
            source_name: format!("JSON mirror of version {}", self.info.version),
            reason: e.to_string(),
        })
    }
}

fn hex32(value: u32) -> String {
    format!("0x{value:08X}")
}

fn parse_version(text: &str) -> Result<FirmwareVersion> {
    FirmwareVersion::parse(text.trim()).map_err(|e| BuildError::InvalidVersionFormat {
        text: text.trim().to_string(),
        reason: e.to_string(),
    })
}

fn parse_mcu_id(text: &str) -> Result<[u8; 4]> {
    let bytes = text.as_bytes();
    match <[u8; 4]>::try_from(bytes) {
        Ok(tag) if tag.iter().all(|b| b.is_ascii_graphic()) => Ok(tag),
        _ => Err(BuildError::InvalidMcuId(text.to_string())),
    }
}

fn current_timestamp() -> Result<u32> {
    let now = Utc::now().timestamp();
    u32::try_from(now).map_err(|_| BuildError::InvalidMetadata {
        source_name: "build timestamp".into(),
        reason: format!("{now} does not fit in 32 bits"),
    })
}

/// Inputs of [`generate_metadata`].
pub struct MetadataArgs<'a> {
    pub version_file: &'a Path,
    pub firmware: &'a Path,
    pub mcu_id: &'a str,
    pub output: &'a Path,
    pub crc: &'a CrcParams,
    pub timestamp: Option<u32>,
}

/// What [`generate_metadata`] wrote.
pub struct MetadataReport {
    pub metadata: EncodedMetadata,
    pub binary_path: PathBuf,
    pub json_path: PathBuf,
}

/// Reads a version file and a firmware binary and writes the metadata
/// block plus its JSON mirror (same base name, `.json` extension).
pub fn generate_metadata(args: &MetadataArgs) -> Result<MetadataReport> {
    let json_path = args.output.with_extension("json");
    if json_path.as_path() == args.output {
        return Err(BuildError::InvalidConfig {
            path: args.output.to_path_buf(),
            reason: "metadata output needs an extension other than .json, the JSON mirror is written next to it".into(),
        });
    }

    let version_text = read_input_text(args.version_file)?;
    let firmware = read_input(args.firmware)?;
    info!(
        "Read firmware version {:?} from {}",
        version_text.trim(),
        args.version_file.display()
    );

    let mut builder = MetadataBuilder::new(args.crc);
    if let Some(ts) = args.timestamp {
        builder = builder.timestamp(ts);
    }
    let metadata = builder.build(&version_text, args.mcu_id, &firmware)?;

    let json = metadata.mirror.to_json()?;
    write_atomic_all(&[
        (args.output, metadata.as_bytes()),
        (json_path.as_path(), json.as_bytes()),
    ])?;
    info!(
        "Metadata written to {} ({} bytes)",
        args.output.display(),
        METADATA_SIZE
    );

    Ok(MetadataReport {
        metadata,
        binary_path: args.output.to_path_buf(),
        json_path,
    })
}

/// Decodes a metadata block from the start of `bytes`.
pub fn decode_metadata(bytes: &[u8], source_name: &str) -> Result<FirmwareMetadata> {
    let invalid = |reason: String| BuildError::InvalidMetadata {
        source_name: source_name.to_string(),
        reason,
    };
    let (block, _) = FirmwareMetadata::read_from_prefix(bytes).map_err(|_| {
        invalid(format!(
            "{} bytes available, a metadata block needs {METADATA_SIZE}",
            bytes.len()
        ))
    })?;
    if block.is_erased() {
        return Err(invalid("block is erased".into()));
    }
    if !block.has_valid_magic() {
        return Err(invalid(format!(
            "magic is {:#010x}, expected {METADATA_MAGIC:#010x}",
            block.magic.get()
        )));
    }
    if block.firmware_version().is_none() {
        return Err(invalid(format!(
            "version field {:#010x} is not a 24-bit version",
            block.version.get()
        )));
    }
    Ok(block)
}

/// Checks a metadata block against the firmware it describes, the same way
/// the bootloader does before accepting a staged image.
pub fn verify_metadata(
    block: &FirmwareMetadata,
    firmware: &[u8],
    crc: &CrcParams,
    source_name: &str,
) -> Result<()> {
    let mismatch = |field, expected: String, found: String| BuildError::MetadataMismatch {
        source_name: source_name.to_string(),
        field,
        expected,
        found,
    };

    let size = block.firmware_size.get();
    if size as usize != firmware.len() {
        return Err(mismatch(
            "firmware_size",
            firmware.len().to_string(),
            size.to_string(),
        ));
    }
    let actual_crc = checksum::crc32(firmware, crc);
    if actual_crc != block.firmware_crc32.get() {
        return Err(mismatch(
            "firmware_crc32",
            hex32(actual_crc),
            hex32(block.firmware_crc32.get()),
        ));
    }
    let actual_hash = checksum::sha256(firmware);
    if actual_hash != block.firmware_hash {
        return Err(mismatch(
            "sha256",
            hex::encode(actual_hash),
            hex::encode(block.firmware_hash),
        ));
    }
    Ok(())
}
