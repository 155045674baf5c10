//! Utility functions.

use crate::error::{malformed, Result};

/// Aligns an address or size up to the next multiple of `align`.
/// `align` must be a power of two.
pub fn align_up(addr: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    addr.wrapping_add(align - 1) & !(align - 1)
}

/// Like [`align_up`], but `None` when the rounded value does not fit in 32 bits.
pub fn checked_align_up(addr: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    Some(addr.checked_add(align - 1)? & !(align - 1))
}

/// Checks that a header alignment field is usable as an alignment mask.
pub fn check_alignment(what: &str, align: u32) -> Result<u32> {
    if align.is_power_of_two() {
        Ok(align)
    } else {
        Err(malformed!("{what} 0x{align:x} is not a power of two"))
    }
}
