// Licensed under the Apache-2.0 license

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Every way an image build can fail. All of them abort the build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("invalid version format {text:?}: {reason}")]
    InvalidVersionFormat { text: String, reason: String },
    #[error("invalid MCU id {0:?}: expected exactly 4 printable ASCII characters")]
    InvalidMcuId(String),
    #[error("symbol {symbol} not found in {}", path.display())]
    SymbolNotFound { symbol: String, path: PathBuf },
    #[error("{}:{line}: symbol {symbol} is not assigned a value of the form `{symbol} = 0x<hex>`", path.display())]
    MalformedSymbol {
        symbol: String,
        path: PathBuf,
        line: usize,
    },
    #[error("{}:{line}: symbol {symbol} redefined as {second:#x} (previously {first:#x})", path.display())]
    DuplicateSymbol {
        symbol: String,
        path: PathBuf,
        line: usize,
        first: u64,
        second: u64,
    },
    #[error("section {section} not found in {}", path.display())]
    SectionNotFound { section: String, path: PathBuf },
    #[error("section {section} in {} is linked at {section_address:#010x} but region {region} starts at {region_address:#010x}", path.display())]
    SectionAddressMismatch {
        section: String,
        path: PathBuf,
        region: String,
        section_address: u64,
        region_address: u64,
    },
    #[error("invalid object file {}: {reason}", path.display())]
    InvalidObject { path: PathBuf, reason: String },
    #[error("payload for region {region} is {len} bytes, larger than the region size of {size} bytes")]
    SizeOverflow { region: String, len: u64, size: u64 },
    #[error("region {region} at offset {offset:#x} overlaps data ending at offset {end:#x}")]
    OffsetOverlap { region: String, offset: u64, end: u64 },
    #[error("region {region} at {address:#010x} lies outside flash [{start:#010x}, {end:#010x})")]
    AddressOutOfRange {
        region: String,
        address: u64,
        start: u64,
        end: u64,
    },
    #[error("region {0} not found in layout")]
    RegionNotFound(String),
    #[error("no payload supplied for region {0}")]
    MissingPayload(String),
    #[error("invalid metadata in {source_name}: {reason}")]
    InvalidMetadata { source_name: String, reason: String },
    #[error("metadata for {source_name} does not match firmware: {field} is {found}, expected {expected}")]
    MetadataMismatch {
        source_name: String,
        field: &'static str,
        expected: String,
        found: String,
    },
    #[error("invalid configuration {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },
    #[error("I/O failure on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        BuildError::IoFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads an input file, reporting a missing file as [`BuildError::InputNotFound`].
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BuildError::InputNotFound(path.to_path_buf()),
        _ => BuildError::io(path, e),
    })
}

pub(crate) fn read_input_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BuildError::InputNotFound(path.to_path_buf()),
        _ => BuildError::io(path, e),
    })
}
