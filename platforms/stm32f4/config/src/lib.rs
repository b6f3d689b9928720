// Licensed under the Apache-2.0 license

pub mod flash;

use mcu_config::CrcParams;

/// Tag stored in the `mcu_id` field of firmware metadata.
pub const MCU_ID: [u8; 4] = *b"F407";

/// The CRC calculation unit: CRC-32/MPEG-2 fed one big-endian word at a
/// time, with a trailing partial word zero-filled in its low bytes.
pub const HW_CRC: CrcParams = CrcParams {
    name: "stm32f4-hw",
    polynomial: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
    reflect: false,
    xor_out: 0x0000_0000,
    pad_to_word: true,
};
