// Licensed under the Apache-2.0 license

//! Turns a parsed recipe into the binary image header: instantiates the
//! per-boot-source component template, resolves the layout, synthesizes the
//! fixed-format structures and copies every section into one buffer. The
//! caller glues the payload bytes directly after the returned header.

use crate::config::BuildConfig;
use crate::error::{BuildError, Result, SizeError};
use crate::layout::{ComponentId, ImageComponent, LayoutPlan};
use boot_image::dcd::DCD_MAXIMUM_SIZE;
use boot_image::qspi::{macronix_default, QSPI_PARAMS_OFFSET, QSPI_PARAMS_SIZE};
use boot_image::{
    ApplicationBootCode, Ivt, APPLICATION_BOOT_CODE_SIZE, APPLICATION_BOOT_CODE_TAG,
    APPLICATION_BOOT_CODE_VERSION, BCW_BOOT_TARGET_A53_0, BOOTROM_QSPI_ALIGNMENT,
    BOOTROM_SD_ALIGNMENT, CODE_LENGTH_ALIGNMENT, HSE_FW_MAX_SIZE, HSE_SYS_IMG_MAX_SIZE, IVT_SIZE,
    IVT_TAG, IVT_VERSION, MBR_OFFSET, MBR_SIZE, QSPI_IVT_OFFSET, RESERVED_SRAM, SD_IVT_OFFSET,
};
use log::info;
use zerocopy::{FromZeros, IntoBytes};

/// Per-build inputs owned by the surrounding framework.
#[derive(Clone, Copy, Debug)]
pub struct BuildParams {
    pub load_address: u32,
    pub entry_point: u32,
    /// Size of the payload file on disk. `PAYLOAD_SIZE` in the recipe
    /// overrides it for the code length field.
    pub payload_file_size: u64,
}

/// A finished image header plus the resolved layout it was built from.
#[derive(Debug)]
pub struct BuiltHeader {
    pub data: Vec<u8>,
    pub plan: LayoutPlan,
}

impl BuiltHeader {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The one-shot build state threaded through parse, solve and synthesis.
/// Self-contained, so tests can run many independent builds in-process.
pub struct BuildContext {
    config: BuildConfig,
}

impl BuildContext {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Builds the complete image header. Nothing is allocated until every
    /// input validates, so a failed build never produces output bytes.
    pub fn build_header(&self, params: &BuildParams) -> Result<BuiltHeader> {
        let config = &self.config;

        if params.entry_point < params.load_address {
            return Err(SizeError::EntryBelowLoad {
                entry: params.entry_point,
                load: params.load_address,
            }
            .into());
        }

        let code_length = self.code_length(params)?;
        if !config.boot_source.is_flash() {
            enforce_reserved_ranges(params.load_address as u64, code_length as u64)?;
        }

        let dcd_bytes = config.dcd.serialize();
        self.check_section_ceilings(&dcd_bytes)?;

        let mut plan = self.layout_template(&dcd_bytes);
        plan.resolve()?;

        let flash_alignment = self.bootrom_alignment();
        let app_offset = plan.append(ImageComponent::auto(
            ComponentId::AppHeader,
            APPLICATION_BOOT_CODE_SIZE as u64,
            flash_alignment,
        ));
        let header_size = plan.append(ImageComponent::auto(
            ComponentId::Code,
            code_length as u64,
            0x8,
        ));

        let mut data = vec![0u8; header_size as usize];

        self.fill_ivt(&plan, &mut data);
        if let Some(offset) = plan.offset_of(ComponentId::Dcd) {
            data[offset as usize..offset as usize + dcd_bytes.len()].copy_from_slice(&dcd_bytes);
        }
        if config.boot_source.is_flash() {
            self.fill_qspi_params(&mut data);
        }
        if let Some(fw) = &config.hse_firmware {
            let offset = plan
                .offset_of(ComponentId::HseFirmware)
                .unwrap_or_default() as usize;
            data[offset..offset + fw.len()].copy_from_slice(fw);
        }
        self.fill_app_header(params, code_length, app_offset as usize, &mut data);

        info!("image header: {header_size:#x} bytes, application header at {app_offset:#x}");

        Ok(BuiltHeader { data, plan })
    }

    fn bootrom_alignment(&self) -> u64 {
        if self.config.boot_source.is_flash() {
            BOOTROM_QSPI_ALIGNMENT
        } else {
            BOOTROM_SD_ALIGNMENT
        }
    }

    /// Rounded in u64: the code length field is 32 bits, but a recipe can
    /// name a payload size whose rounded value no longer fits it.
    fn code_length(&self, params: &BuildParams) -> Result<u32> {
        let length = self
            .config
            .payload_size_override
            .map(u64::from)
            .unwrap_or(params.payload_file_size);
        let alignment = CODE_LENGTH_ALIGNMENT as u64;
        let rounded = length.div_ceil(alignment) * alignment;
        u32::try_from(rounded).map_err(|_| SizeError::PayloadTooLarge { size: length }.into())
    }

    /// The parser already bounds every blob; these checks guard against a
    /// config assembled programmatically rather than through the parser.
    fn check_section_ceilings(&self, dcd_bytes: &[u8]) -> Result<()> {
        if dcd_bytes.len() > DCD_MAXIMUM_SIZE {
            return Err(SizeError::DcdTooLarge {
                size: dcd_bytes.len(),
            }
            .into());
        }
        if let Some(fw) = &self.config.hse_firmware {
            if fw.len() as u64 > HSE_FW_MAX_SIZE {
                return Err(SizeError::HseFwTooLarge {
                    size: fw.len() as u64,
                }
                .into());
            }
        }
        if let Some(params) = &self.config.qspi_params {
            if params.len() as u64 > QSPI_PARAMS_SIZE {
                return Err(SizeError::QspiParamsTooLarge {
                    size: params.len() as u64,
                    limit: QSPI_PARAMS_SIZE,
                }
                .into());
            }
        }
        Ok(())
    }

    /// The per-boot-source component template from the boot ROM contract.
    fn layout_template(&self, dcd_bytes: &[u8]) -> LayoutPlan {
        let config = &self.config;
        let alignment = self.bootrom_alignment();
        let mut plan = LayoutPlan::new();

        if config.boot_source.is_flash() {
            plan.push(ImageComponent::fixed(
                ComponentId::Ivt,
                QSPI_IVT_OFFSET,
                IVT_SIZE as u64,
            ));
            plan.push(ImageComponent::fixed(
                ComponentId::QspiParams,
                QSPI_PARAMS_OFFSET,
                QSPI_PARAMS_SIZE,
            ));
        } else {
            plan.push(ImageComponent::fixed(
                ComponentId::MbrReserved,
                MBR_OFFSET,
                MBR_SIZE,
            ));
            plan.push(ImageComponent::fixed(
                ComponentId::Ivt,
                SD_IVT_OFFSET,
                IVT_SIZE as u64,
            ));
        }

        if !dcd_bytes.is_empty() {
            plan.push(ImageComponent::auto(
                ComponentId::Dcd,
                dcd_bytes.len() as u64,
                alignment,
            ));
        }

        if let Some(fw) = &config.hse_firmware {
            plan.push(ImageComponent::auto(
                ComponentId::HseFirmware,
                fw.len() as u64,
                alignment,
            ));
            plan.push(ImageComponent::auto(
                ComponentId::HseSysImg,
                HSE_SYS_IMG_MAX_SIZE,
                alignment,
            ));
        }

        let padding = config.component_padding();
        for component in plan.components_mut() {
            component.padding = padding;
        }

        plan
    }

    fn fill_ivt(&self, plan: &LayoutPlan, data: &mut [u8]) {
        let mut ivt = Ivt::new_zeroed();
        ivt.tag = IVT_TAG;
        ivt.length.set(IVT_SIZE as u16);
        ivt.version = IVT_VERSION;
        ivt.boot_configuration_word.set(BCW_BOOT_TARGET_A53_0);

        if let Some(offset) = plan.offset_of(ComponentId::Dcd) {
            ivt.dcd_pointer.set(offset as u32);
        }
        if let Some(offset) = plan.offset_of(ComponentId::AppHeader) {
            ivt.application_boot_code_pointer.set(offset as u32);
        }
        if self.config.hse_firmware.is_some() {
            if let Some(offset) = plan.offset_of(ComponentId::HseFirmware) {
                ivt.hse_firmware_pointer.set(offset as u32);
            }
            if let Some(offset) = plan.offset_of(ComponentId::HseSysImg) {
                ivt.hse_sys_img_pointer.set(offset as u32);
            }
        }

        let offset = plan.offset_of(ComponentId::Ivt).unwrap_or_default() as usize;
        data[offset..offset + IVT_SIZE].copy_from_slice(ivt.as_bytes());
    }

    fn fill_qspi_params(&self, data: &mut [u8]) {
        let offset = QSPI_PARAMS_OFFSET as usize;
        match &self.config.qspi_params {
            Some(blob) => data[offset..offset + blob.len()].copy_from_slice(blob),
            None => {
                let params = macronix_default();
                let bytes = params.as_bytes();
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
    }

    fn fill_app_header(
        &self,
        params: &BuildParams,
        code_length: u32,
        offset: usize,
        data: &mut [u8],
    ) {
        let mut app = ApplicationBootCode::new_zeroed();
        app.tag = APPLICATION_BOOT_CODE_TAG;
        app.version = APPLICATION_BOOT_CODE_VERSION;
        app.ram_start_pointer.set(params.load_address);
        app.ram_entry_pointer.set(params.entry_point);
        app.code_length.set(code_length);

        data[offset..offset + APPLICATION_BOOT_CODE_SIZE].copy_from_slice(app.as_bytes());
    }
}

/// RAM boot loads the payload into SRAM while the boot ROM still runs out
/// of it; the load window must avoid every ROM-reserved range.
fn enforce_reserved_ranges(start: u64, length: u64) -> Result<()> {
    let end = start + length;
    for range in RESERVED_SRAM {
        if start < range.end && end > range.start {
            return Err(BuildError::ReservedRange {
                start,
                length,
                reserved_start: range.start,
                reserved_end: range.end,
            });
        }
    }
    Ok(())
}
