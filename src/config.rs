//! Configuration module.
//!
//! This module defines the command-line interface (CLI) using `clap`.
//! It handles the subcommands, their input/output paths and the image
//! parameters used when linking objects into a new image.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::image::ImageOptions;
use crate::records::Machine;

/// Inspect COFF objects and PE images, and lay out new PE images.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the decoded contents of an object or image
    Dump {
        /// Object (.obj) or image (.exe/.dll) file
        input: PathBuf,
    },

    /// Recompute the layout of an existing 32-bit image
    Relayout {
        /// Input image
        input: PathBuf,

        /// Output file (defaults to `<input>.out`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge the sections of several objects into a new image
    Link {
        /// Input objects, in link order
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long, default_value = "a.exe", help = "Path to the output image")]
        output: PathBuf,

        /// Target machine (defaults to the machine of the inputs)
        #[arg(long, value_enum)]
        machine: Option<MachineArg>,

        /// File alignment of the output image
        #[arg(long, default_value = "0x200", value_parser = parse_u32)]
        file_alignment: u32,

        /// Section alignment of the output image
        #[arg(long, default_value = "0x1000", value_parser = parse_u32)]
        section_alignment: u32,

        /// Preferred load address of the output image
        #[arg(long, default_value = "0x400000", value_parser = parse_u32)]
        image_base: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineArg {
    I386,
    Amd64,
}

impl From<MachineArg> for Machine {
    fn from(arg: MachineArg) -> Self {
        match arg {
            MachineArg::I386 => Machine::I386,
            MachineArg::Amd64 => Machine::Amd64,
        }
    }
}

/// Builds image options from the `link` arguments.
pub fn image_options(
    machine: Machine,
    file_alignment: u32,
    section_alignment: u32,
    image_base: u32,
) -> ImageOptions {
    ImageOptions {
        machine,
        file_alignment,
        section_alignment,
        image_base,
        ..ImageOptions::default()
    }
}

/// Parses decimal or `0x`-prefixed hexadecimal numbers.
fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number `{s}`: {e}"))
}
