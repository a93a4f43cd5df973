// Licensed under the Apache-2.0 license

use std::path::PathBuf;
use thiserror::Error;

use boot_image::dcd::DCD_MAXIMUM_SIZE;
use boot_image::HSE_FW_MAX_SIZE;

/// A configuration line the parser rejected. Every variant carries the
/// offending line verbatim.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized command: {line:?}")]
    UnknownCommand { line: String },
    #[error("malformed command arguments: {line:?}")]
    Syntax { line: String },
    #[error("BOOT_FROM must be the first command, found: {line:?}")]
    BootSourceNotSelected { line: String },
    #[error("boot source is already selected: {line:?}")]
    DuplicateBootSource { line: String },
    #[error("PARAMETER_FILE is only valid under serial-flash boot: {line:?}")]
    ParameterFileNotAllowed { line: String },
}

/// An input exceeded a hardware ceiling, or the load/entry pair is invalid.
#[derive(Debug, Error)]
pub enum SizeError {
    #[error("register program is {size} bytes, over the {DCD_MAXIMUM_SIZE}-byte limit")]
    DcdTooLarge { size: usize },
    #[error("secure firmware is {size:#x} bytes, over the {HSE_FW_MAX_SIZE:#x}-byte limit")]
    HseFwTooLarge { size: u64 },
    #[error("payload of {size:#x} bytes does not fit the 32-bit code length field")]
    PayloadTooLarge { size: u64 },
    #[error("parameter block is {size:#x} bytes, over the {limit:#x}-byte region")]
    QspiParamsTooLarge { size: u64, limit: u64 },
    #[error("entry point {entry:#x} is below the load address {load:#x}")]
    EntryBelowLoad { entry: u32, load: u32 },
}

/// The layout solver could not produce a collision-free placement.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(
        "components overlap: {a_size:#x} bytes at {a_offset:#x} and {b_size:#x} bytes at {b_offset:#x}"
    )]
    Overlap {
        a_offset: u64,
        a_size: u64,
        b_offset: u64,
        b_size: u64,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Size(#[from] SizeError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(
        "loading {length:#x} bytes at {start:#x} overlaps the reserved range {reserved_start:#x}..{reserved_end:#x}"
    )]
    ReservedRange {
        start: u64,
        length: u64,
        reserved_start: u64,
        reserved_end: u64,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;
