// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Delimited address notation (dotted-decimal, colon-hex and friends).

use core::fmt::Write;

/// The shape of an address written as delimiter-separated numeric pieces.
///
/// An address is `pieces` numbers, each `piece_bits` wide, written in `base` and separated by
/// `delimiter`. Its raw value is the big-endian concatenation of the pieces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressLayout {
    pub pieces: usize,
    pub piece_bits: usize,
    pub base: u32,
    pub delimiter: char,
    /// Whether one run of zero pieces may be elided as a doubled delimiter (`::`).
    pub compressible: bool,
}

impl AddressLayout {
    /// Dotted-decimal IPv4 (`192.168.1.1`).
    pub const IPV4: AddressLayout = AddressLayout {
        pieces: 4,
        piece_bits: 8,
        base: 10,
        delimiter: '.',
        compressible: false,
    };

    /// Colon-hex IPv6 (`fe80::1`, `2001:db8:0:0:0:0:0:1`).
    pub const IPV6: AddressLayout = AddressLayout {
        pieces: 8,
        piece_bits: 16,
        base: 16,
        delimiter: ':',
        compressible: true,
    };

    /// Colon-hex 48-bit MAC (`aa:bb:cc:dd:ee:ff`).
    pub const MAC: AddressLayout = AddressLayout {
        pieces: 6,
        piece_bits: 8,
        base: 16,
        delimiter: ':',
        compressible: false,
    };

    /// The width of the whole address in bits.
    #[inline]
    pub const fn bit_width(&self) -> usize {
        self.pieces * self.piece_bits
    }

    /// Whether `pieces` has the right count and every piece fits in `piece_bits`.
    pub fn validate(&self, pieces: &[u64]) -> bool {
        pieces.len() == self.pieces
            && pieces
                .iter()
                .all(|&p| self.piece_bits >= 64 || p >> self.piece_bits == 0)
    }

    /// Parses the textual form of an address into its pieces.
    pub fn parse(&self, text: &str) -> Option<Vec<u64>> {
        let groups = self.groups(text)?;
        if groups.len() != self.pieces {
            return None;
        }

        let pieces = groups
            .iter()
            .map(|group| self.parse_piece(group))
            .collect::<Option<Vec<u64>>>()?;

        if self.validate(&pieces) {
            Some(pieces)
        } else {
            None
        }
    }

    /// Writes `pieces` in the layout's notation. Elided runs are always written out in full.
    pub fn format(&self, pieces: &[u64]) -> String {
        let mut out = String::new();
        for (idx, &piece) in pieces.iter().enumerate() {
            if idx > 0 {
                out.push(self.delimiter);
            }
            let _ = match (self.base, self.piece_bits) {
                (16, 8) => write!(out, "{:02x}", piece),
                (16, _) => write!(out, "{:x}", piece),
                (8, _) => write!(out, "{:o}", piece),
                _ => write!(out, "{}", piece),
            };
        }
        out
    }

    fn groups<'a>(&self, text: &'a str) -> Option<Vec<&'a str>> {
        let mut doubled = String::with_capacity(2);
        doubled.push(self.delimiter);
        doubled.push(self.delimiter);

        if !self.compressible || !text.contains(doubled.as_str()) {
            return Some(text.split(self.delimiter).collect());
        }

        if text.matches(doubled.as_str()).count() > 1 {
            return None;
        }

        let (head, tail) = text.split_once(doubled.as_str())?;
        let head: Vec<&str> = if head.is_empty() {
            Vec::new()
        } else {
            head.split(self.delimiter).collect()
        };
        let tail: Vec<&str> = if tail.is_empty() {
            Vec::new()
        } else {
            tail.split(self.delimiter).collect()
        };

        // The elided run must stand for at least one piece
        let elided = self.pieces.checked_sub(head.len() + tail.len())?;
        if elided == 0 {
            return None;
        }

        let mut groups = head;
        groups.extend(core::iter::repeat("0").take(elided));
        groups.extend(tail);
        Some(groups)
    }

    fn parse_piece(&self, group: &str) -> Option<u64> {
        if group.is_empty() || !group.chars().all(|c| c.is_digit(self.base)) {
            return None;
        }
        u64::from_str_radix(group, self.base).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("255.255.255.255", Some(vec![255, 255, 255, 255]); "broadcast")]
    #[test_case("127.0.0.1", Some(vec![127, 0, 0, 1]); "loopback")]
    #[test_case("256.0.0.1", None; "piece out of range")]
    #[test_case("127.0.0.1.1", None; "too many pieces")]
    #[test_case("127.0.1", None; "too few pieces")]
    #[test_case("abc.0.0.1", None; "not decimal")]
    #[test_case("+1.0.0.1", None; "signed piece")]
    #[test_case("1..0.1", None; "empty piece")]
    fn ipv4_parsing(text: &str, expected: Option<Vec<u64>>) {
        assert_eq!(AddressLayout::IPV4.parse(text), expected);
    }

    #[test_case("::", Some(vec![0; 8]); "unspecified")]
    #[test_case("::1", Some(vec![0, 0, 0, 0, 0, 0, 0, 1]); "loopback")]
    #[test_case("fe80::211:22ff:fe33:4455", Some(vec![0xfe80, 0, 0, 0, 0x211, 0x22ff, 0xfe33, 0x4455]); "link local")]
    #[test_case("2001:db8::", Some(vec![0x2001, 0xdb8, 0, 0, 0, 0, 0, 0]); "trailing elision")]
    #[test_case("1:2:3:4:5:6:7:8", Some(vec![1, 2, 3, 4, 5, 6, 7, 8]); "full form")]
    #[test_case("1:2:3:4::5:6:7:8", None; "elision of nothing")]
    #[test_case("1::2::3", None; "double elision")]
    #[test_case("12345::", None; "piece out of range")]
    #[test_case("g::1", None; "not hex")]
    fn ipv6_parsing(text: &str, expected: Option<Vec<u64>>) {
        assert_eq!(AddressLayout::IPV6.parse(text), expected);
    }

    #[test]
    fn mac_parsing_and_formatting() {
        let pieces = AddressLayout::MAC.parse("AA:bb:0c:dd:ee:ff").unwrap();
        assert_eq!(pieces, vec![0xaa, 0xbb, 0x0c, 0xdd, 0xee, 0xff]);
        assert_eq!(AddressLayout::MAC.format(&pieces), "aa:bb:0c:dd:ee:ff");
        assert!(AddressLayout::MAC.parse("aa:bb:cc:dd:ee").is_none());
        assert!(AddressLayout::MAC.parse("aa::ff").is_none());
    }

    #[test]
    fn formatting_is_uncompressed() {
        let pieces = AddressLayout::IPV6.parse("fe80::1").unwrap();
        assert_eq!(AddressLayout::IPV6.format(&pieces), "fe80:0:0:0:0:0:0:1");
        assert_eq!(AddressLayout::IPV4.format(&[10, 0, 0, 254]), "10.0.0.254");
    }

    #[test]
    fn piece_validation() {
        assert!(AddressLayout::IPV4.validate(&[1, 2, 3, 4]));
        assert!(!AddressLayout::IPV4.validate(&[1, 2, 3, 256]));
        assert!(!AddressLayout::IPV4.validate(&[1, 2, 3]));
    }
}
