// Licensed under the Apache-2.0 license

//! Host-side tooling for building flashable firmware images: metadata
//! generation, flash layout resolution and image composition.

pub mod checksum;
mod compose;
mod error;
pub mod layout;
mod metadata;
mod output;

pub use compose::{
    compose, compose_to_file, read_payloads, verify_image, ImageSummary, RegionSummary,
    VerifiedComponent,
};
pub use error::{BuildError, Result};
pub use layout::{FlashLayout, FlashRegion, LayoutResolver, PayloadMap, Resolution};
pub use metadata::{
    decode_metadata, generate_metadata, verify_metadata, EncodedMetadata, InfoFields,
    MemoryFields, MetadataArgs, MetadataBuilder, MetadataMirror, MetadataReport,
};
pub use output::{write_atomic, write_atomic_all};
