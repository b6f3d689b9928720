// Licensed under the Apache-2.0 license

use crc_any::CRCu32;
use mcu_config::CrcParams;
use sha2::{Digest, Sha256};

use flash_image::SHA256_SIZE;

/// Computes a 32-bit CRC with the given parameters.
///
/// With `pad_to_word` the input is treated as if zero-filled to a multiple
/// of four bytes, which is what a word-fed CRC peripheral sees when the
/// firmware hands it a trailing partial word.
pub fn crc32(data: &[u8], params: &CrcParams) -> u32 {
    // crc-any takes the reversed polynomial for reflected algorithms
    let polynomial = if params.reflect {
        params.polynomial.reverse_bits()
    } else {
        params.polynomial
    };
    let mut crc = CRCu32::create_crc(
        polynomial,
        32,
        params.init,
        params.xor_out,
        params.reflect,
    );
    crc.digest(data);
    if params.pad_to_word {
        let padding = data.len().next_multiple_of(4) - data.len();
        crc.digest(&[0u8; 3][..padding]);
    }
    crc.get_crc()
}

pub fn sha256(data: &[u8]) -> [u8; SHA256_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Human readable description of a CRC configuration.
pub fn describe(params: &CrcParams) -> String {
    format!(
        "{} (poly {:#010x}, init {:#010x}, reflect {}, xorout {:#010x}{})",
        params.name,
        params.polynomial,
        params.init,
        params.reflect,
        params.xor_out,
        if params.pad_to_word {
            ", word padded"
        } else {
            ""
        }
    )
}
