// Licensed under the Apache-2.0 license
#![no_std]

//! Binary records shared between the image tooling and the bootloaders.
//!
//! Everything in this crate describes bytes that the firmware reads straight
//! out of flash, so layouts are fixed and little-endian regardless of host.

mod version;

pub use version::{FirmwareVersion, VersionError};

use core::mem::size_of;

use zerocopy::{
    byteorder::{LittleEndian, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

/// Marks a well-formed metadata block.
pub const METADATA_MAGIC: u32 = 0xDEAD_BEEF;

/// Magic word as read back from erased flash.
pub const METADATA_ERASED: u32 = 0xFFFF_FFFF;

/// Size of the encoded metadata record. The flash region holding it is
/// usually larger; the rest belongs to the certificate block.
pub const METADATA_SIZE: usize = 64;

pub const SHA256_SIZE: usize = 32;

/// Metadata placed at the end of every firmware component.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FirmwareMetadata {
    pub magic: U32<LittleEndian>,
    /// Semantic version encoded as 0x00MMmmpp.
    pub version: U32<LittleEndian>,
    /// Unix timestamp of the build.
    pub build_timestamp: U32<LittleEndian>,
    /// Size of the firmware in bytes, excluding metadata and certificate.
    pub firmware_size: U32<LittleEndian>,
    pub firmware_crc32: U32<LittleEndian>,
    pub reserved: [U32<LittleEndian>; 2],
    /// Four ASCII characters packed big-endian, e.g. `F407`.
    pub mcu_id: U32<LittleEndian>,
    pub firmware_hash: [u8; SHA256_SIZE],
}

const _: () = assert!(size_of::<FirmwareMetadata>() == METADATA_SIZE);

impl FirmwareMetadata {
    pub fn new(
        version: FirmwareVersion,
        build_timestamp: u32,
        firmware_size: u32,
        firmware_crc32: u32,
        mcu_id: u32,
        firmware_hash: [u8; SHA256_SIZE],
    ) -> Self {
        Self {
            magic: METADATA_MAGIC.into(),
            version: version.encode().into(),
            build_timestamp: build_timestamp.into(),
            firmware_size: firmware_size.into(),
            firmware_crc32: firmware_crc32.into(),
            reserved: [U32::new(0); 2],
            mcu_id: mcu_id.into(),
            firmware_hash,
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic.get() == METADATA_MAGIC
    }

    pub fn is_erased(&self) -> bool {
        self.magic.get() == METADATA_ERASED
    }

    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        FirmwareVersion::decode(self.version.get())
    }

    pub fn mcu_tag(&self) -> [u8; 4] {
        unpack_mcu_id(self.mcu_id.get())
    }
}

/// Packs a four character MCU tag into its integer form (`"F407"` becomes
/// `0x46343037`).
pub fn pack_mcu_id(tag: [u8; 4]) -> u32 {
    u32::from_be_bytes(tag)
}

pub fn unpack_mcu_id(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}
