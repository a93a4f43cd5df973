// Licensed under the Apache-2.0 license

//! Parser for the line-oriented boot recipe.
//!
//! One command per line; blank lines and `#` comments are skipped. The
//! whole file must parse before layout resolution starts, so a bad recipe
//! never produces a partial image.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::dcd::{DcdProgram, RegisterCommand, RegisterCommandKind};
use crate::error::{BuildError, ConfigError, Result, SizeError};
use boot_image::qspi::QSPI_PARAMS_SIZE;
use boot_image::HSE_FW_MAX_SIZE;
use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootSource {
    SerialFlash,
    Sd,
    Emmc,
}

impl BootSource {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "serial-flash" => Some(Self::SerialFlash),
            "sd" => Some(Self::Sd),
            "emmc" => Some(Self::Emmc),
            _ => None,
        }
    }

    /// Serial-flash boot fetches the image directly; block media boot
    /// goes through a partition table and coarser sector alignment.
    pub fn is_flash(self) -> bool {
        self == Self::SerialFlash
    }
}

/// Everything a recipe can configure. Blob files are read eagerly at parse
/// time and owned here until their bytes are copied into the output buffer.
#[derive(Debug)]
pub struct BuildConfig {
    pub boot_source: BootSource,
    pub dcd: DcdProgram,
    /// External QSPI parameter block; `None` selects the compiled-in default.
    pub qspi_params: Option<Vec<u8>>,
    /// HSE firmware blob; present iff secure boot is enabled.
    pub hse_firmware: Option<Vec<u8>>,
    /// Overrides the payload's on-disk size, e.g. when a signature is
    /// appended to the file but must not count as code.
    pub payload_size_override: Option<u32>,
    /// ERR051257: pad every placed component to keep sections from
    /// straddling a flash page boundary.
    errata_padding: bool,
}

/// Parse state: the boot source is unknown until the first command.
struct ConfigParser {
    boot_source: Option<BootSource>,
    dcd: DcdProgram,
    qspi_params: Option<Vec<u8>>,
    hse_firmware: Option<Vec<u8>>,
    payload_size_override: Option<u32>,
    errata_padding: bool,
}

impl BuildConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file), path)
    }

    /// Parses a recipe from an arbitrary stream; read errors are reported
    /// against a placeholder path.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        Self::parse(reader, Path::new("<recipe>"))
    }

    fn parse(reader: impl BufRead, path: &Path) -> Result<Self> {
        let mut parser = ConfigParser {
            boot_source: None,
            dcd: DcdProgram::new(),
            qspi_params: None,
            hse_firmware: None,
            payload_size_override: None,
            errata_padding: false,
        };

        for line in reader.lines() {
            let line = line.map_err(|source| BuildError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            parser.parse_line(line)?;
        }

        let boot_source = parser.boot_source.unwrap_or(BootSource::Sd);
        debug!("parsed recipe: boot source {boot_source:?}");

        Ok(BuildConfig {
            boot_source,
            dcd: parser.dcd,
            qspi_params: parser.qspi_params,
            hse_firmware: parser.hse_firmware,
            payload_size_override: parser.payload_size_override,
            errata_padding: parser.errata_padding,
        })
    }

    /// Trailing padding applied to every placed component. The ERR051257
    /// page-crossing defect only affects serial-flash boot.
    pub fn component_padding(&self) -> u64 {
        if self.errata_padding && self.boot_source.is_flash() {
            0x400
        } else {
            0
        }
    }
}

impl ConfigParser {
    fn parse_line(&mut self, line: &str) -> Result<()> {
        let (keyword, args) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        if keyword == "BOOT_FROM" {
            return self.parse_boot_from(line, args);
        }

        // Every other command depends on the selected boot source for
        // component sizing, so an unordered recipe is rejected outright.
        if self.boot_source.is_none() {
            return Err(ConfigError::BootSourceNotSelected {
                line: line.to_string(),
            }
            .into());
        }

        if let Some(kind) = RegisterCommandKind::from_keyword(keyword) {
            return self.parse_register_command(line, kind, args);
        }

        match keyword {
            "SECBOOT" => self.parse_secboot(line, args),
            "PARAMETER_FILE" => self.parse_parameter_file(line, args),
            "PAYLOAD_SIZE" => self.parse_payload_size(line, args),
            "ERRATA_PADDING_WORKAROUND" => {
                self.errata_padding = true;
                Ok(())
            }
            _ => Err(ConfigError::UnknownCommand {
                line: line.to_string(),
            }
            .into()),
        }
    }

    fn parse_boot_from(&mut self, line: &str, args: &str) -> Result<()> {
        if self.boot_source.is_some() {
            return Err(ConfigError::DuplicateBootSource {
                line: line.to_string(),
            }
            .into());
        }

        match BootSource::from_keyword(args) {
            Some(source) => {
                self.boot_source = Some(source);
                Ok(())
            }
            None => Err(ConfigError::Syntax {
                line: line.to_string(),
            }
            .into()),
        }
    }

    fn parse_register_command(
        &mut self,
        line: &str,
        kind: RegisterCommandKind,
        args: &str,
    ) -> Result<()> {
        let syntax = || ConfigError::Syntax {
            line: line.to_string(),
        };

        let mut fields = args.split_whitespace();
        let width = fields
            .next()
            .and_then(parse_number)
            .filter(|w| matches!(w, 1 | 2 | 4))
            .ok_or_else(syntax)?;
        let addr = fields.next().and_then(parse_number).ok_or_else(syntax)?;
        let value = fields.next().and_then(parse_number).ok_or_else(syntax)?;
        let count = match fields.next() {
            Some(field) => Some(parse_number(field).ok_or_else(syntax)?),
            None => None,
        };
        if fields.next().is_some() {
            return Err(syntax().into());
        }

        let command = RegisterCommand {
            kind,
            width: width as u8,
            addr,
            value_or_mask: value,
            count,
        };
        self.dcd.push(&command)?;
        Ok(())
    }

    fn parse_secboot(&mut self, line: &str, args: &str) -> Result<()> {
        let path = args
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ConfigError::Syntax {
                line: line.to_string(),
            })?;

        let data = load_file(Path::new(path))?;
        if data.len() as u64 > HSE_FW_MAX_SIZE {
            return Err(SizeError::HseFwTooLarge {
                size: data.len() as u64,
            }
            .into());
        }
        self.hse_firmware = Some(data);
        Ok(())
    }

    fn parse_parameter_file(&mut self, line: &str, args: &str) -> Result<()> {
        if self.boot_source != Some(BootSource::SerialFlash) {
            return Err(ConfigError::ParameterFileNotAllowed {
                line: line.to_string(),
            }
            .into());
        }
        if args.is_empty() {
            return Err(ConfigError::Syntax {
                line: line.to_string(),
            }
            .into());
        }

        let data = load_file(Path::new(args))?;
        if data.len() as u64 > QSPI_PARAMS_SIZE {
            return Err(SizeError::QspiParamsTooLarge {
                size: data.len() as u64,
                limit: QSPI_PARAMS_SIZE,
            }
            .into());
        }
        self.qspi_params = Some(data);
        Ok(())
    }

    fn parse_payload_size(&mut self, line: &str, args: &str) -> Result<()> {
        match parse_number(args) {
            Some(size) => {
                self.payload_size_override = Some(size);
                Ok(())
            }
            None => Err(ConfigError::Syntax {
                line: line.to_string(),
            }
            .into()),
        }
    }
}

fn parse_number(field: &str) -> Option<u32> {
    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        field.parse().ok()
    }
}

fn load_file(path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut file = File::open(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    file.read_to_end(&mut buffer)
        .map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(buffer)
}
