//! Client-network derivation.
//!
//! The claimed source address is masked to the configured prefix length
//! so that one account covers a whole client network. Unparseable input
//! masks to the empty string, which is itself a valid key: all malformed
//! sources pool under a single account rather than failing the call.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Masks a textual address-with-port (`a.b.c.d:p` or `[x::y]:p`) to the
/// configured prefix length, returning the canonical textual form of the
/// masked address, or `""` if the input does not parse.
pub(crate) fn mask_addr(addr: &str, v4_bits: u8, v6_bits: u8) -> String {
    // Shortest parseable address-with-port is "[::]:1", whose last colon
    // sits at index 4.
    let Some(colon) = addr.rfind(':') else {
        return String::new();
    };
    if colon < 4 {
        return String::new();
    }

    let host = &addr[..colon];
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return mask_v4(v4, v4_bits).to_string();
    }

    let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) else {
        return String::new();
    };
    match inner.parse::<Ipv6Addr>() {
        Ok(v6) => mask_v6(v6, v6_bits).to_string(),
        Err(_) => String::new(),
    }
}

fn mask_v4(addr: Ipv4Addr, bits: u8) -> Ipv4Addr {
    let mask = if bits >= 32 {
        u32::MAX
    } else {
        u32::MAX << (32 - bits)
    };
    Ipv4Addr::from(u32::from(addr) & mask)
}

fn mask_v6(addr: Ipv6Addr, bits: u8) -> Ipv6Addr {
    let mask = if bits >= 128 {
        u128::MAX
    } else {
        u128::MAX << (128 - bits)
    };
    Ipv6Addr::from(u128::from(addr) & mask)
}
