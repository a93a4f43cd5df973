// Licensed under the Apache-2.0 license

//! Serial-flash (QSPI) controller parameter block.
//!
//! The boot ROM copies this block into the controller registers before it
//! fetches the rest of the image, so the tool treats it as opaque bytes:
//! either the compiled-in default below or a caller-supplied file, copied
//! verbatim into the 512-byte region at [`QSPI_PARAMS_OFFSET`].

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Fixed location and size of the parameter region under serial-flash boot.
pub const QSPI_PARAMS_OFFSET: u64 = 0x200;
pub const QSPI_PARAMS_SIZE: u64 = 0x200;

/// One pre-boot flash command issued by the controller (e.g. a mode switch
/// into octal DTR).
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FlashWrite {
    pub config: U32<LittleEndian>,
    pub addr: U32<LittleEndian>,
    pub data: U32<LittleEndian>,
}

/// Packs a [`FlashWrite`] config word.
///
/// Bit layout: opcode bits 0..=7, reserved bits 8..=15, pad bits 16..=17,
/// addr_size bits 18..=23, cdata_size bits 24..=30, valid_addr bit 31.
pub const fn flash_write_config(
    opcode: u8,
    pad: u8,
    addr_size: u8,
    cdata_size: u8,
    valid_addr: bool,
) -> u32 {
    (opcode as u32)
        | ((pad as u32 & 0x3) << 16)
        | ((addr_size as u32 & 0x3f) << 18)
        | ((cdata_size as u32 & 0x7f) << 24)
        | ((valid_addr as u32) << 31)
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct QspiParams {
    pub header: U32<LittleEndian>,
    pub mcr: U32<LittleEndian>,
    pub flshcr: U32<LittleEndian>,
    pub bufgencr: U32<LittleEndian>,
    pub dllcr: U32<LittleEndian>,
    pub paritycr: U32<LittleEndian>,
    pub sfacr: U32<LittleEndian>,
    pub smpr: U32<LittleEndian>,
    pub dlcr: U32<LittleEndian>,
    pub sflash_1_size: U32<LittleEndian>,
    pub sflash_2_size: U32<LittleEndian>,
    pub dlpr: U32<LittleEndian>,
    pub sfar: U32<LittleEndian>,
    pub ipcr: U32<LittleEndian>,
    pub tbdr: U32<LittleEndian>,
    pub dll_bypass_en: u8,
    pub dll_slv_upd_en: u8,
    pub dll_auto_upd_en: u8,
    pub ipcr_trigger_en: u8,
    pub sflash_clk_freq: u8,
    pub reserved: [u8; 3],
    pub command_seq: [U32<LittleEndian>; 80],
    pub writes: [FlashWrite; 10],
}

pub const QSPI_PARAMS_STRUCT_SIZE: usize = core::mem::size_of::<QspiParams>();

/// Default parameters for Macronix octal flash: 8DTRD read at 200 MHz,
/// preceded by a write-enable and a WRCR2 switch into DTR OPI mode.
pub fn macronix_default() -> QspiParams {
    let mut params = QspiParams::new_zeroed();

    params.header = 0x5a5a5a5a.into();
    params.mcr = 0x030f00cc.into();
    params.flshcr = 0x00010303.into();
    params.dllcr = 0xc280000c.into();
    params.sfacr = 0x00020000.into();
    params.smpr = 0x44000000.into();
    params.dlcr = 0x40ff40ff.into();
    params.sflash_1_size = 0x20000000.into();
    params.sflash_2_size = 0x20000000.into();
    params.dlpr = 0xaa553443.into();
    params.dll_auto_upd_en = 0x01;
    params.sflash_clk_freq = 200;

    // Macronix read - 8DTRD
    params.command_seq[0] = 0x471147ee.into();
    params.command_seq[1] = 0x0f142b20.into();
    params.command_seq[2] = 0x00003b10.into();

    // Write enable
    params.writes[0].config = flash_write_config(0x06, 0, 0, 0, false).into();

    // WRCR2 - DTR OPI
    params.writes[1].config = flash_write_config(0x72, 0, 32, 1, true).into();
    params.writes[1].addr = 0x0.into();
    params.writes[1].data = 0x2.into();

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_block_fits_the_reserved_region() {
        assert_eq!(QSPI_PARAMS_STRUCT_SIZE, 508);
        assert!(QSPI_PARAMS_STRUCT_SIZE as u64 <= QSPI_PARAMS_SIZE);
    }

    #[test]
    fn flash_write_config_bit_positions() {
        assert_eq!(flash_write_config(0x06, 0, 0, 0, false), 0x0000_0006);
        assert_eq!(
            flash_write_config(0x72, 0, 32, 1, true),
            (1 << 31) | (1 << 24) | (32 << 18) | 0x72
        );
    }

    #[test]
    fn macronix_default_is_marked_valid() {
        let params = macronix_default();
        assert_eq!(params.header.get(), 0x5a5a5a5a);
        let bytes = params.as_bytes();
        // Little-endian marker at the start of the block.
        assert_eq!(&bytes[..4], &[0x5a, 0x5a, 0x5a, 0x5a]);
    }
}
