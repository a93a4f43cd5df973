// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use image_builder::{identify, BuildConfig, BuildContext, BuildParams};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Boot image tool for the S32 family", long_about = None)]
struct Mkimage {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a boot image from a recipe and a payload
    Build {
        /// Path to the recipe file
        #[arg(long, value_name = "CONFIG")]
        config: PathBuf,

        /// Path to the application payload
        #[arg(long, value_name = "PAYLOAD")]
        payload: PathBuf,

        /// RAM address the payload is loaded to
        #[arg(long, value_parser = maybe_hex::<u32>)]
        load_address: u32,

        /// RAM address execution starts at
        #[arg(long, value_parser = maybe_hex::<u32>)]
        entry_point: u32,

        /// Path of the output image
        #[arg(long, value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Print the section map of an existing boot image
    Print {
        /// Path to the image file
        #[arg(value_name = "FILE")]
        image: PathBuf,
    },
}

fn build(
    config: &PathBuf,
    payload: &PathBuf,
    load_address: u32,
    entry_point: u32,
    output: &PathBuf,
) -> Result<()> {
    let config = BuildConfig::from_file(config)?;
    let payload = fs::read(payload).with_context(|| format!("failed to read {payload:?}"))?;

    let ctx = BuildContext::new(config);
    let header = ctx.build_header(&BuildParams {
        load_address,
        entry_point,
        payload_file_size: payload.len() as u64,
    })?;

    // Assemble the whole image in memory and write it in one shot, so a
    // failed build never leaves a partial file behind.
    let mut image = header.data;
    image.extend_from_slice(&payload);
    fs::write(output, &image).with_context(|| format!("failed to write {output:?}"))?;

    log::info!("wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

fn print(path: &PathBuf) -> Result<()> {
    let image = fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
    match identify(&image) {
        Some(info) => {
            print!("{info}");
            Ok(())
        }
        None => bail!("{} is not a recognized boot image", path.display()),
    }
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let cli = Mkimage::parse();
    let result = match &cli.command {
        Commands::Build {
            config,
            payload,
            load_address,
            entry_point,
            output,
        } => build(config, payload, *load_address, *entry_point, output),
        Commands::Print { image } => print(image),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    });
}
