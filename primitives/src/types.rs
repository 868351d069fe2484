//! Core type aliases and constants for the Cinder execution host.
//!
//! These types cross every boundary in the system: the node hands them in
//! with each request, the contexts key their caches on them, and the output
//! summary hands them back.

use alloc::vec::Vec;

/// 32-byte account or contract address.
pub type Address = [u8; 32];

/// 32-byte hash used for code hashes and block hashes.
pub type Hash = [u8; 32];

/// Length of the VM type tag embedded in synthesized contract addresses.
pub const VM_TYPE_LEN: usize = 2;

/// A zero-valued address (32 zero bytes).
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// A zero-valued hash (32 zero bytes).
pub const ZERO_HASH: Hash = [0u8; 32];

/// Convert an address or hash to a hex string for log messages.
pub fn bytes_to_hex(bytes: &[u8]) -> alloc::string::String {
    let mut s = alloc::string::String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for byte in bytes {
        use core::fmt::Write;
        let _ = write!(s, "{:02x}", byte);
    }
    s
}

/// Decode a u64 from big-endian bytes, accepting any length up to 8.
///
/// Short inputs are zero-extended on the left; longer inputs return `None`.
pub fn u64_from_be_bytes(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// Encode a u64 as big-endian bytes with leading zeros stripped.
///
/// Zero encodes as an empty sequence, matching the value encoding used for
/// storage and arguments throughout the host.
pub fn u64_to_trimmed_be_bytes(v: u64) -> Vec<u8> {
    let full = v.to_be_bytes();
    let first = full.iter().position(|b| *b != 0).unwrap_or(full.len());
    full[first..].to_vec()
}
