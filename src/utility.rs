//! Utility functions useful throughout the codebase.

use ethnum::U256;

use crate::constant::ADDRESS_WIDTH_BYTES;

/// Formats the low [`ADDRESS_WIDTH_BYTES`] bytes of `value` as a `0x`-prefixed,
/// zero-padded address.
#[must_use]
pub fn format_address(value: U256) -> String {
    let bytes = value.to_be_bytes();
    let start = bytes.len() - ADDRESS_WIDTH_BYTES as usize;
    format!("0x{}", hex::encode(&bytes[start..]))
}

/// Formats `value` as `0x`-prefixed upper-case hex, or as `unknown` if it is
/// absent.
#[must_use]
pub fn format_word(value: Option<U256>) -> String {
    match value {
        Some(value) => format!("0x{value:X}"),
        None => "unknown".to_string(),
    }
}
