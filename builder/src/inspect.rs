// Licensed under the Apache-2.0 license

//! Read-side counterpart of the builder: probes a binary for a boot image
//! header and recovers the section map from it. Parsing is fail-soft; a
//! file that does not carry a well-formed vector table yields `None`, and
//! individually malformed sections are dropped rather than failing the
//! whole probe.

use boot_image::qspi::{QSPI_PARAMS_OFFSET, QSPI_PARAMS_SIZE};
use boot_image::{
    dcd::{DCD_MAXIMUM_SIZE, DCD_TAG},
    ApplicationBootCode, Ivt, APPLICATION_BOOT_CODE_SIZE, APPLICATION_BOOT_CODE_TAG,
    HSE_SYS_IMG_MAX_SIZE, IVT_SIZE, QSPI_IVT_OFFSET, SD_IVT_OFFSET,
};
use std::fmt;
use zerocopy::FromBytes;

/// One recovered section of the image.
#[derive(Clone, Copy, Debug)]
pub struct SectionInfo {
    pub name: &'static str,
    pub offset: u64,
    /// `None` when the on-media format does not record the size.
    pub size: Option<u64>,
}

/// Everything that can be recovered from an image header alone.
#[derive(Debug)]
pub struct ImageInfo {
    pub flash_boot: bool,
    pub load_address: Option<u32>,
    pub entry_point: Option<u32>,
    pub sections: Vec<SectionInfo>,
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.flash_boot {
            "serial flash"
        } else {
            "sd/emmc"
        };
        writeln!(f, "boot source:  {source}")?;
        if let Some(load) = self.load_address {
            writeln!(f, "load address: {load:#x}")?;
        }
        if let Some(entry) = self.entry_point {
            writeln!(f, "entry point:  {entry:#x}")?;
        }
        writeln!(f, "{:<24} {:>10} {:>10}", "section", "offset", "size")?;
        for section in &self.sections {
            write!(f, "{:<24} {:>#10x} ", section.name, section.offset)?;
            match section.size {
                Some(size) => writeln!(f, "{size:>#10x}")?,
                None => writeln!(f, "{:>10}", "-")?,
            }
        }
        Ok(())
    }
}

/// Probes `image` for a boot header at each location the boot ROM would
/// try, and maps out its sections. Returns `None` when no valid vector
/// table is found.
pub fn identify(image: &[u8]) -> Option<ImageInfo> {
    let (ivt, ivt_offset) = probe_ivt(image)?;
    let flash_boot = ivt_offset == QSPI_IVT_OFFSET;

    let mut sections = vec![SectionInfo {
        name: "image vector table",
        offset: ivt_offset,
        size: Some(IVT_SIZE as u64),
    }];

    if flash_boot {
        sections.push(SectionInfo {
            name: "qspi parameters",
            offset: QSPI_PARAMS_OFFSET,
            size: Some(QSPI_PARAMS_SIZE),
        });
    }

    if let Some(section) = dcd_section(image, ivt.dcd_pointer.get()) {
        sections.push(section);
    }

    if ivt.hse_firmware_pointer.get() != 0 {
        sections.push(SectionInfo {
            name: "hse firmware",
            offset: ivt.hse_firmware_pointer.get() as u64,
            size: None,
        });
    }
    if ivt.hse_sys_img_pointer.get() != 0 {
        sections.push(SectionInfo {
            name: "hse system image",
            offset: ivt.hse_sys_img_pointer.get() as u64,
            size: Some(HSE_SYS_IMG_MAX_SIZE),
        });
    }

    let mut load_address = None;
    let mut entry_point = None;
    if let Some(app) = app_header(image, ivt.application_boot_code_pointer.get()) {
        let offset = ivt.application_boot_code_pointer.get() as u64;
        load_address = Some(app.ram_start_pointer.get());
        entry_point = Some(app.ram_entry_pointer.get());
        sections.push(SectionInfo {
            name: "application header",
            offset,
            size: Some(APPLICATION_BOOT_CODE_SIZE as u64),
        });
        sections.push(SectionInfo {
            name: "application",
            offset: offset + APPLICATION_BOOT_CODE_SIZE as u64,
            size: Some(app.code_length.get() as u64),
        });
    }

    sections.sort_by_key(|s| s.offset);

    Some(ImageInfo {
        flash_boot,
        load_address,
        entry_point,
        sections,
    })
}

fn probe_ivt(image: &[u8]) -> Option<(Ivt, u64)> {
    for offset in [QSPI_IVT_OFFSET, SD_IVT_OFFSET] {
        let start = offset as usize;
        let Some(bytes) = image.get(start..start + IVT_SIZE) else {
            continue;
        };
        if let Ok(ivt) = Ivt::read_from_bytes(bytes) {
            if ivt.verify() {
                return Some((ivt, offset));
            }
        }
    }
    None
}

/// The register program records its own big-endian byte length in its
/// header word.
fn dcd_section(image: &[u8], pointer: u32) -> Option<SectionInfo> {
    if pointer == 0 {
        return None;
    }
    let start = pointer as usize;
    let header = image.get(start..start + 4)?;
    if header[0] != DCD_TAG {
        return None;
    }
    let length = u16::from_be_bytes([header[1], header[2]]) as usize;
    if length < 4 || length > DCD_MAXIMUM_SIZE || start + length > image.len() {
        return None;
    }
    Some(SectionInfo {
        name: "register program",
        offset: pointer as u64,
        size: Some(length as u64),
    })
}

fn app_header(image: &[u8], pointer: u32) -> Option<ApplicationBootCode> {
    if pointer == 0 {
        return None;
    }
    let start = pointer as usize;
    let bytes = image.get(start..start + APPLICATION_BOOT_CODE_SIZE)?;
    let app = ApplicationBootCode::read_from_bytes(bytes).ok()?;
    if app.tag != APPLICATION_BOOT_CODE_TAG {
        return None;
    }
    Some(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildContext, BuildParams};
    use crate::config::BuildConfig;
    use std::io::Cursor;

    fn build_image(recipe: &str, payload: &[u8]) -> Vec<u8> {
        let config = BuildConfig::from_reader(Cursor::new(recipe.to_string())).unwrap();
        let built = BuildContext::new(config)
            .build_header(&BuildParams {
                load_address: 0x3410_0000,
                entry_point: 0x3410_0004,
                payload_file_size: payload.len() as u64,
            })
            .unwrap();
        let mut image = built.data;
        image.extend_from_slice(payload);
        image
    }

    fn find<'a>(info: &'a ImageInfo, name: &str) -> &'a SectionInfo {
        info.sections
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing section {name}"))
    }

    #[test]
    fn identify_recovers_a_flash_image() {
        let image = build_image(
            "BOOT_FROM serial-flash\nWRITE 4 0x40080000 0x1\n",
            &[0xab; 0x600],
        );
        let info = identify(&image).unwrap();

        assert!(info.flash_boot);
        assert_eq!(info.load_address, Some(0x3410_0000));
        assert_eq!(info.entry_point, Some(0x3410_0004));

        assert_eq!(find(&info, "image vector table").offset, 0);
        assert_eq!(find(&info, "qspi parameters").offset, 0x200);
        let dcd = find(&info, "register program");
        assert_eq!(dcd.offset, 0x100);
        assert_eq!(dcd.size, Some(16));
        assert_eq!(find(&info, "application header").offset, 0x400);
        let app = find(&info, "application");
        assert_eq!(app.offset, 0x440);
        assert_eq!(app.size, Some(0x600));

        // Sorted by offset.
        let offsets: Vec<_> = info.sections.iter().map(|s| s.offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(offsets, sorted);
    }

    #[test]
    fn identify_recovers_a_block_media_image() {
        let image = build_image("BOOT_FROM sd\nWRITE 4 0x40080000 0x1\n", &[0xcd; 0x200]);
        let info = identify(&image).unwrap();

        assert!(!info.flash_boot);
        assert_eq!(find(&info, "image vector table").offset, 0x1000);
        assert_eq!(find(&info, "register program").offset, 0x200);
        assert!(info.sections.iter().all(|s| s.name != "qspi parameters"));
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert!(identify(&[0xff; 0x2000]).is_none());
        assert!(identify(&[]).is_none());
    }

    #[test]
    fn truncated_header_is_not_an_image() {
        let image = build_image("BOOT_FROM serial-flash\n", &[0; 0x200]);
        assert!(identify(&image[..0x80]).is_none());
    }

    #[test]
    fn display_lists_every_section() {
        let image = build_image("BOOT_FROM serial-flash\n", &[0; 0x200]);
        let info = identify(&image).unwrap();
        let text = info.to_string();
        assert!(text.contains("serial flash"));
        assert!(text.contains("application header"));
        assert!(text.contains("0x34100000"));
    }
}
