// Licensed under the Apache-2.0 license

//! Boot image builder for the S32 family: parses a line-oriented recipe,
//! assembles the register-init program, solves the component layout and
//! synthesizes the image header the boot ROM expects. The [`inspect`]
//! module is the read-side counterpart used to print existing images.

pub mod build;
pub mod config;
pub mod dcd;
pub mod error;
pub mod inspect;
pub mod layout;

pub use build::{BuildContext, BuildParams, BuiltHeader};
pub use config::{BootSource, BuildConfig};
pub use error::{BuildError, ConfigError, LayoutError, Result, SizeError};
pub use inspect::{identify, ImageInfo, SectionInfo};
