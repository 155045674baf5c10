//! COFF object and PE image toolkit.
//!
//! This library decodes COFF objects and PE images, folds same-named section
//! fragments into linker-style groups and lays out a new PE image.
//! It is organized into several modules:
//! - `records`: fixed-layout on-disk records.
//! - `symbol`: symbol table and string-table name resolution.
//! - `section`: decoded sections and their characteristics.
//! - `layout`: section grouping and merging.
//! - `coff`: relocatable object reader.
//! - `image`: PE image decoding and layout.
//! - `writer`: PE image serialization.
//! - `linker`: linking session over several objects.
//! - `config`: CLI configuration.

pub mod coff;
pub mod config;
pub mod error;
pub mod image;
pub mod layout;
pub mod linker;
pub mod records;
pub mod section;
pub mod symbol;
pub mod utils;
pub mod writer;

pub use coff::ObjectFile;
pub use error::{Error, Result};
pub use image::{ImageOptions, LayoutSummary, PeImage};
pub use layout::{SectionGroup, SectionList};
pub use linker::Linker;
pub use section::{Provenance, Section};
pub use symbol::{Symbol, SymbolTable};
