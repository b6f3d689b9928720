// Licensed under the Apache-2.0 license

use core::fmt;
use core::str::FromStr;

/// `major.minor.patch`, each component one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionError {
    Empty,
    /// Number of dot separated parts, which must be 2 or 3.
    PartCount(usize),
    NotNumeric,
    OutOfRange,
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Empty => write!(f, "version string is empty"),
            VersionError::PartCount(n) => {
                write!(f, "expected major.minor[.patch], found {n} parts")
            }
            VersionError::NotNumeric => write!(f, "version components must be decimal digits"),
            VersionError::OutOfRange => write!(f, "version components must be at most 255"),
        }
    }
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(text: &str) -> Result<Self, VersionError> {
        if text.is_empty() {
            return Err(VersionError::Empty);
        }
        let count = text.split('.').count();
        if !(2..=3).contains(&count) {
            return Err(VersionError::PartCount(count));
        }
        let mut parts = [0u8; 3];
        for (slot, part) in parts.iter_mut().zip(text.split('.')) {
            *slot = parse_component(part)?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    pub const fn encode(&self) -> u32 {
        ((self.major as u32) << 16) | ((self.minor as u32) << 8) | self.patch as u32
    }

    /// Inverse of [`encode`](Self::encode); `None` if bits 24..32 are set.
    pub const fn decode(value: u32) -> Option<Self> {
        if value >> 24 != 0 {
            return None;
        }
        Some(Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8))
    }
}

// u8::from_str would also accept a leading '+'.
fn parse_component(part: &str) -> Result<u8, VersionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::NotNumeric);
    }
    part.parse::<u8>().map_err(|_| VersionError::OutOfRange)
}

impl FromStr for FirmwareVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
