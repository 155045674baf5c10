//! Entry point for the coffld tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Set up `tracing` output at the requested level.
//! 3. Map the input files into memory and identify them with `object`.
//! 4. Run the requested command: dump, relayout or link.
//!
//! Error handling is done via `anyhow`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use memmap2::Mmap;
use object::FileKind;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use coffld::config::{self, Command, Config};
use coffld::records::Machine;
use coffld::{Linker, ObjectFile, PeImage};

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match config.command {
        Command::Dump { input } => dump(&input),
        Command::Relayout { input, output } => {
            let output = output.unwrap_or_else(|| {
                let mut name = input.clone().into_os_string();
                name.push(".out");
                PathBuf::from(name)
            });
            relayout(&input, &output)
        }
        Command::Link {
            inputs,
            output,
            machine,
            file_alignment,
            section_alignment,
            image_base,
        } => link(
            &inputs,
            &output,
            machine.map(Machine::from),
            file_alignment,
            section_alignment,
            image_base,
        ),
    }
}

fn map(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn dump(input: &Path) -> Result<()> {
    let mmap = map(input)?;
    match FileKind::parse(&*mmap) {
        Ok(FileKind::Coff) => {
            let obj = ObjectFile::parse(&mmap, 0)
                .with_context(|| format!("failed to parse object {}", input.display()))?
                .with_source(file_name(input));
            println!("{obj}");
        }
        Ok(FileKind::Pe32) | Ok(FileKind::Pe64) => {
            let image = PeImage::read(&mmap)
                .with_context(|| format!("failed to parse image {}", input.display()))?;
            println!("{image}");
        }
        Ok(kind) => bail!("{}: unsupported file kind {:?}", input.display(), kind),
        Err(e) => bail!("{}: unrecognized file: {}", input.display(), e),
    }
    Ok(())
}

fn relayout(input: &Path, output: &Path) -> Result<()> {
    let mmap = map(input)?;
    let mut image = PeImage::read(&mmap)
        .with_context(|| format!("failed to parse image {}", input.display()))?;
    let summary = image.layout().context("layout failed")?;
    let bytes = image.write_image()?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        "wrote {} ({} bytes, image size 0x{:x})",
        output.display(),
        bytes.len(),
        summary.size_of_image
    );
    Ok(())
}

fn link(
    inputs: &[PathBuf],
    output: &Path,
    machine: Option<Machine>,
    file_alignment: u32,
    section_alignment: u32,
    image_base: u32,
) -> Result<()> {
    let mut linker = Linker::new();
    for path in inputs {
        let mmap = map(path)?;
        if !matches!(FileKind::parse(&*mmap), Ok(FileKind::Coff)) {
            bail!("{} is not a COFF object", path.display());
        }
        linker
            .add_named_object(&file_name(path), &mmap)
            .with_context(|| format!("failed to parse object {}", path.display()))?;
    }

    let machine = machine.or_else(|| linker.machine()).unwrap_or(Machine::I386);
    let options = config::image_options(machine, file_alignment, section_alignment, image_base);
    let (image, summary) = linker.link(&options)?;
    let bytes = image.write_image()?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Linked {} object(s) into {} ({} sections, image size 0x{:x})",
        inputs.len(),
        output.display(),
        image.sections().len(),
        summary.size_of_image
    );
    Ok(())
}
