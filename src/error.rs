//! Error types.
//!
//! Every fallible decode or layout operation returns [`Result`]. Lookups by
//! name never fail with an error; they return `Option`/`bool` instead.

use thiserror::Error;

/// Errors produced while decoding, laying out or serializing COFF/PE data.
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer bytes remain in the buffer than the structure requires.
    #[error("truncated {what} at offset 0x{offset:x}: need {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The input violates the structure of the format.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A section name does not fit the 8-byte header field.
    #[error("section name `{0}` exceeds 8 bytes")]
    NameTooLong(String),

    /// The operation is outside what this crate implements.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Serialization was requested before the image was laid out.
    #[error("image has not been laid out")]
    NotLaidOut,
}

impl Error {
    /// True for structural violations of the input (the format error class).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Truncated { .. } | Error::Malformed(_) | Error::NameTooLong(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! malformed {
    ($($arg:tt)*) => {
        $crate::error::Error::Malformed(format!($($arg)*))
    };
}

pub(crate) use malformed;
