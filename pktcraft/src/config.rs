// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Packet construction settings and platform-derived field defaults.

use once_cell::sync::Lazy;

const FALLBACK_HOP_LIMIT: u8 = 64;

/// How a [`Packet`](crate::packet::Packet) treats protocols included out of layer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketConfig {
    /// Reject any protocol whose layer is not exactly one above the previous protocol's.
    pub strict: bool,
    /// When not strict, emit a warning for each out-of-order inclusion.
    pub warn_on_reorder: bool,
}

impl PacketConfig {
    /// A configuration that accepts any layering without complaint.
    #[inline]
    pub const fn permissive() -> Self {
        PacketConfig {
            strict: false,
            warn_on_reorder: false,
        }
    }

    /// A configuration that accepts any layering but warns when layers are skipped or
    /// reordered.
    #[inline]
    pub const fn lenient() -> Self {
        PacketConfig {
            strict: false,
            warn_on_reorder: true,
        }
    }
}

impl Default for PacketConfig {
    #[inline]
    fn default() -> Self {
        PacketConfig {
            strict: true,
            warn_on_reorder: true,
        }
    }
}

/// The IPv4 time-to-live used when a caller leaves `ttl` unset.
pub static DEFAULT_TTL: Lazy<u8> =
    Lazy::new(|| read_sysctl_u8("/proc/sys/net/ipv4/ip_default_ttl"));

/// The IPv6 hop limit used when a caller leaves `hop_limit` unset.
pub static DEFAULT_HOP_LIMIT: Lazy<u8> =
    Lazy::new(|| read_sysctl_u8("/proc/sys/net/ipv6/conf/default/hop_limit"));

#[cfg(target_os = "linux")]
fn read_sysctl_u8(path: &str) -> u8 {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_sysctl_u8(&contents),
        Err(e) => {
            tracing::debug!(path, error = %e, "sysctl unreadable, using fallback of 64");
            FALLBACK_HOP_LIMIT
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_sysctl_u8(_path: &str) -> u8 {
    FALLBACK_HOP_LIMIT
}

fn parse_sysctl_u8(contents: &str) -> u8 {
    match contents.trim().parse::<u8>() {
        Ok(0) | Err(_) => FALLBACK_HOP_LIMIT,
        Ok(value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("64\n", 64; "linux default")]
    #[test_case("128", 128; "windows style")]
    #[test_case(" 255 \n", 255; "padded")]
    #[test_case("0", 64; "zero is not a usable ttl")]
    #[test_case("300", 64; "out of range")]
    #[test_case("", 64; "empty")]
    fn sysctl_parsing(contents: &str, expected: u8) {
        assert_eq!(parse_sysctl_u8(contents), expected);
    }

    #[test]
    fn default_config_is_strict() {
        let config = PacketConfig::default();
        assert!(config.strict);
        assert!(config.warn_on_reorder);
        assert!(!PacketConfig::permissive().warn_on_reorder);
    }

    #[test]
    fn platform_defaults_are_nonzero() {
        assert_ne!(*DEFAULT_TTL, 0);
        assert_ne!(*DEFAULT_HOP_LIMIT, 0);
    }
}
