//! Binary structure model.
//!
//! Every on-disk COFF/PE record has a fixed size and a fixed little-endian
//! field order. Each record type spells out its own field sequence through
//! the [`Record`] trait; nothing relies on in-memory struct layout.

use crate::error::{Error, Result};

pub mod coff;
pub mod image;

pub use coff::{RelocationRecord, SectionHeader, SymbolRecord};
pub use image::{
    DataDirectories, DataDirectory, DosHeader, FileHeader, Machine, NtSignature, OptionalHeader,
    OptionalHeader32, OptionalHeader64,
};

/// A fixed-size on-disk record.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;
    /// Record name used in error messages.
    const NAME: &'static str;

    /// Reads the fields in declared order. `fields` always holds exactly `SIZE` bytes.
    fn read(fields: &mut FieldReader<'_>) -> Self;

    /// Appends exactly `SIZE` bytes to `out`.
    fn write(&self, out: &mut Vec<u8>);

    /// Decodes a record starting at `offset`.
    fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        let bytes = slice(buf, offset, Self::SIZE, Self::NAME)?;
        Ok(Self::read(&mut FieldReader::new(bytes)))
    }

    /// Encodes the record into a fresh buffer.
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write(&mut out);
        debug_assert_eq!(out.len(), Self::SIZE);
        out
    }
}

/// Decodes `count` records laid out contiguously from `offset`.
///
/// The whole run is bounds-checked up front, so a count that cannot fit in
/// the buffer fails before anything is decoded.
pub fn decode_array<R: Record>(buf: &[u8], offset: usize, count: usize) -> Result<Vec<R>> {
    let len = count.checked_mul(R::SIZE).ok_or_else(|| Error::Truncated {
        what: R::NAME,
        offset,
        needed: usize::MAX,
        available: buf.len().saturating_sub(offset),
    })?;
    let bytes = slice(buf, offset, len, R::NAME)?;
    Ok(bytes
        .chunks_exact(R::SIZE)
        .map(|chunk| R::read(&mut FieldReader::new(chunk)))
        .collect())
}

/// Returns `buf[offset..offset + len]`, or a truncation error.
pub fn slice<'a>(buf: &'a [u8], offset: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or(Error::Truncated {
            what,
            offset,
            needed: len,
            available: buf.len().saturating_sub(offset),
        })
}

/// Sequential little-endian field reader over one record's bytes.
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        u8::from_le_bytes(self.array())
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.array())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Decodes bytes as ASCII; bytes outside the ASCII range become `?`.
pub fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Reads a NUL-terminated string starting at `offset`, stopping at the
/// terminator or at the end of `buf`, whichever comes first.
pub fn read_cstr(buf: &[u8], offset: usize) -> String {
    let tail = buf.get(offset..).unwrap_or_default();
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    ascii_lossy(&tail[..end])
}

/// Reads a NUL-terminated string that must be terminated inside `buf`.
///
/// Returns the string bytes without the terminator.
pub fn read_cstr_terminated<'a>(buf: &'a [u8], offset: usize, what: &str) -> Result<&'a [u8]> {
    let tail = buf.get(offset..).unwrap_or_default();
    match tail.iter().position(|&b| b == 0) {
        Some(end) => Ok(&tail[..end]),
        None => Err(Error::Malformed(format!(
            "unterminated {what} at offset 0x{offset:x}"
        ))),
    }
}

/// Decodes an 8-byte section name: truncated at the first NUL, or all eight
/// bytes when no NUL is present.
pub fn decode_short_name(raw: &[u8; 8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    ascii_lossy(&raw[..end])
}

/// Encodes a section name into the 8-byte field, NUL-padded on the right.
pub fn encode_short_name(name: &str) -> Result<[u8; 8]> {
    let bytes = name.as_bytes();
    if bytes.len() > 8 {
        return Err(Error::NameTooLong(name.to_string()));
    }
    let mut raw = [0u8; 8];
    raw[..bytes.len()].copy_from_slice(bytes);
    Ok(raw)
}
