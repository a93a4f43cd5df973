// Licensed under the Apache-2.0 license

//! On-media layout of the S32 boot image, as parsed by the boot ROM.
//!
//! Everything in this crate is a hardware contract: structure sizes, field
//! offsets and byte order must match the reference manual exactly. Multi-byte
//! header fields are big-endian except image-relative pointers, which are
//! little-endian.

#![no_std]

pub mod dcd;
pub mod qspi;

use zerocopy::byteorder::{BigEndian, LittleEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IVT_TAG: u8 = 0xd1;
pub const IVT_VERSION: u8 = 0x60;

pub const APPLICATION_BOOT_CODE_TAG: u8 = 0xd5;
pub const APPLICATION_BOOT_CODE_VERSION: u8 = 0x60;

/// Boot configuration word selecting the A53 core 0 as the boot target.
pub const BCW_BOOT_TARGET_A53_0: u32 = 1;

/// IVT location probed by the boot ROM for each boot source.
pub const QSPI_IVT_OFFSET: u64 = 0x0;
pub const SD_IVT_OFFSET: u64 = 0x1000;

/// First sector of block media, reserved so the image never clobbers a
/// partition table.
pub const MBR_OFFSET: u64 = 0x0;
pub const MBR_SIZE: u64 = 0x200;

pub const HSE_FW_MAX_SIZE: u64 = 0x80000;
pub const HSE_SYS_IMG_MAX_SIZE: u64 = 0xc000;

/// Minimum offset alignment accepted by the boot ROM for each boot source.
pub const BOOTROM_QSPI_ALIGNMENT: u64 = 0x8;
pub const BOOTROM_SD_ALIGNMENT: u64 = 0x200;

/// The application code length field must be a multiple of this.
pub const CODE_LENGTH_ALIGNMENT: u32 = 512;

/// Image Vector Table. The boot ROM reads it at [`QSPI_IVT_OFFSET`] or
/// [`SD_IVT_OFFSET`] and follows the pointers to every other section.
/// Pointers hold image-relative byte offsets; zero means "section absent".
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Ivt {
    pub tag: u8,
    pub length: U16<BigEndian>,
    pub version: u8,
    pub reserved1: [u8; 4],
    pub self_test_dcd_pointer: U32<LittleEndian>,
    pub self_test_dcd_pointer_backup: U32<LittleEndian>,
    pub dcd_pointer: U32<LittleEndian>,
    pub dcd_pointer_backup: U32<LittleEndian>,
    pub hse_firmware_pointer: U32<LittleEndian>,
    pub hse_firmware_pointer_backup: U32<LittleEndian>,
    pub application_boot_code_pointer: U32<LittleEndian>,
    pub application_boot_code_pointer_backup: U32<LittleEndian>,
    pub boot_configuration_word: U32<LittleEndian>,
    pub lifecycle_configuration_word: U32<LittleEndian>,
    pub reserved2: [u8; 4],
    pub hse_sys_img_pointer: U32<LittleEndian>,
    pub reserved_for_hse_fw: [u8; 28],
    pub reserved3: [u8; 156],
    pub gmac: [u8; 16],
}

pub const IVT_SIZE: usize = core::mem::size_of::<Ivt>();

impl Ivt {
    /// Soft validity check used when probing arbitrary data for an IVT.
    pub fn verify(&self) -> bool {
        self.tag == IVT_TAG
            && self.version == IVT_VERSION
            && self.length.get() as usize == IVT_SIZE
    }
}

/// Header glued in front of the application payload. `code` follows
/// immediately after `reserved2`.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct ApplicationBootCode {
    pub tag: u8,
    pub reserved1: [u8; 2],
    pub version: u8,
    pub ram_start_pointer: U32<LittleEndian>,
    pub ram_entry_pointer: U32<LittleEndian>,
    pub code_length: U32<LittleEndian>,
    pub auth_mode: U32<LittleEndian>,
    pub reserved2: [u8; 44],
}

pub const APPLICATION_BOOT_CODE_SIZE: usize = core::mem::size_of::<ApplicationBootCode>();

/// SRAM window reserved by the boot ROM while it executes.
#[derive(Clone, Copy, Debug)]
pub struct ReservedRange {
    pub start: u64,
    pub end: u64,
}

/// Areas of SRAM the boot ROM keeps for itself during RAM boot, per the
/// Reset and Boot chapter of the reference manual. SRAM is mirrored at
/// 0x3800_0000, hence the duplicated windows.
pub const RESERVED_SRAM: [ReservedRange; 4] = [
    ReservedRange {
        start: 0x3400_8000,
        end: 0x3407_8000,
    },
    ReservedRange {
        start: 0x3800_8000,
        end: 0x3807_8000,
    },
    ReservedRange {
        start: 0x343f_f000,
        end: 0x3440_0000,
    },
    ReservedRange {
        start: 0x383f_f000,
        end: 0x3840_0000,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    #[test]
    fn struct_sizes_match_the_reference_manual() {
        assert_eq!(IVT_SIZE, 256);
        assert_eq!(APPLICATION_BOOT_CODE_SIZE, 64);
    }

    #[test]
    fn ivt_field_offsets() {
        assert_eq!(core::mem::offset_of!(Ivt, dcd_pointer), 16);
        assert_eq!(core::mem::offset_of!(Ivt, hse_firmware_pointer), 24);
        assert_eq!(
            core::mem::offset_of!(Ivt, application_boot_code_pointer),
            32
        );
        assert_eq!(core::mem::offset_of!(Ivt, boot_configuration_word), 40);
        assert_eq!(core::mem::offset_of!(Ivt, hse_sys_img_pointer), 52);
        assert_eq!(core::mem::offset_of!(Ivt, gmac), 240);
    }

    #[test]
    fn ivt_verify_accepts_a_well_formed_table() {
        let mut ivt = Ivt::new_zeroed();
        assert!(!ivt.verify());

        ivt.tag = IVT_TAG;
        ivt.version = IVT_VERSION;
        ivt.length.set(IVT_SIZE as u16);
        assert!(ivt.verify());

        ivt.length.set(128);
        assert!(!ivt.verify());
    }

    #[test]
    fn ivt_serializes_length_big_endian() {
        let mut ivt = Ivt::new_zeroed();
        ivt.tag = IVT_TAG;
        ivt.length.set(IVT_SIZE as u16);
        ivt.version = IVT_VERSION;

        let bytes = ivt.as_bytes();
        assert_eq!(bytes[0], 0xd1);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x00);
        assert_eq!(bytes[3], 0x60);
    }
}
