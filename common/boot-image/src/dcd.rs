// Licensed under the Apache-2.0 license

//! Device Configuration Data: the register-init micro-program executed by
//! the boot ROM before it transfers control to application code.
//!
//! A program is a sequence of 32-bit words. Words serialize little-endian,
//! so a record header built by [`command_header`] lands on the media as
//! `tag:u8, length:u16 (big-endian), params:u8`. Address, value/mask and
//! count words are big-endian on the media and must be converted with
//! [`be_word`] before being appended.

pub const DCD_TAG: u8 = 0xd2;
pub const DCD_VERSION: u8 = 0x60;

/// Program magic: tag 0xd2, a zero 16-bit length (patched after assembly)
/// and version 0x60, packed in serialized word form.
pub const DCD_MAGIC_WORD: u32 = 0x6000_00d2;

/// Byte offset of the big-endian length field inside the magic header.
pub const DCD_HEADER_LENGTH_OFFSET: usize = 1;

/// Hardware ceiling on the serialized program, magic header included.
pub const DCD_MAXIMUM_SIZE: usize = 8192;

pub const DCD_WRITE_TAG: u8 = 0xcc;
pub const DCD_CHECK_TAG: u8 = 0xcf;
pub const DCD_NOP_TAG: u8 = 0xc0;

/// Record lengths in bytes: header word + address + value, plus an extra
/// count word for polled checks.
pub const DCD_WRITE_RECORD_LEN: u16 = 12;
pub const DCD_CHECK_RECORD_LEN: u16 = 16;
pub const DCD_CHECK_RECORD_NO_COUNT_LEN: u16 = 12;

const DCD_PARAMS_SET: u8 = 1 << 4;
const DCD_PARAMS_MASK: u8 = 1 << 3;
const DCD_PARAMS_WIDTH: u8 = 0x7;

/// Packs a record parameter byte.
///
/// Bit layout: bit 4 = SET, bit 3 = MASK, bits 0..=2 = access width in
/// bytes (1, 2 or 4).
pub const fn command_params(set: bool, mask: bool, width: u8) -> u8 {
    let mut params = width & DCD_PARAMS_WIDTH;
    if set {
        params |= DCD_PARAMS_SET;
    }
    if mask {
        params |= DCD_PARAMS_MASK;
    }
    params
}

/// Packs a record header word in serialized (little-endian) form:
/// `tag` at byte 0, big-endian `length` at bytes 1..=2, `params` at byte 3.
pub const fn command_header(tag: u8, length: u16, params: u8) -> u32 {
    u32::from_le_bytes([tag, (length >> 8) as u8, (length & 0xff) as u8, params])
}

/// Unpacks a record header word; the inverse of [`command_header`].
pub const fn command_header_fields(word: u32) -> (u8, u16, u8) {
    let bytes = word.to_le_bytes();
    (bytes[0], ((bytes[1] as u16) << 8) | bytes[2] as u16, bytes[3])
}

/// Converts an address, value/mask or count to serialized word form, such
/// that it lands big-endian on the media.
pub const fn be_word(value: u32) -> u32 {
    u32::from_le_bytes(value.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_word_serializes_as_tag_length_version() {
        assert_eq!(DCD_MAGIC_WORD.to_le_bytes(), [0xd2, 0x00, 0x00, 0x60]);
    }

    #[test]
    fn header_word_packs_big_endian_length() {
        let word = command_header(DCD_WRITE_TAG, DCD_WRITE_RECORD_LEN, 0x04);
        assert_eq!(word.to_le_bytes(), [0xcc, 0x00, 0x0c, 0x04]);
        assert_eq!(
            command_header_fields(word),
            (DCD_WRITE_TAG, DCD_WRITE_RECORD_LEN, 0x04)
        );
    }

    #[test]
    fn params_byte_bit_positions() {
        assert_eq!(command_params(false, false, 4), 0b0000_0100);
        assert_eq!(command_params(false, true, 4), 0b0000_1100);
        assert_eq!(command_params(true, false, 2), 0b0001_0010);
        assert_eq!(command_params(true, true, 1), 0b0001_1001);
    }

    #[test]
    fn be_word_lands_big_endian() {
        assert_eq!(be_word(0x4008_0000).to_le_bytes(), [0x40, 0x08, 0x00, 0x00]);
    }
}
