// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The Internet checksum (RFC 1071).

/// One's complement sum of `bytes` taken as big-endian 16-bit words.
///
/// An odd trailing byte is padded with a zero low byte.
pub fn ones_complement_16bit(bytes: &[u8]) -> u16 {
    let mut res: u16 = 0;
    let mut words = bytes.chunks_exact(2);
    for word in &mut words {
        res = ones_complement_add(res, u16::from_be_bytes([word[0], word[1]]));
    }

    if let Some(&last) = words.remainder().first() {
        res = ones_complement_add(res, (last as u16) << 8);
    }

    res
}

/// One's complement addition of two 16-bit words (end-around carry).
#[inline]
pub fn ones_complement_add(a: u16, b: u16) -> u16 {
    let (sum, carry) = a.overflowing_add(b);
    if carry {
        sum.wrapping_add(1)
    } else {
        sum
    }
}

/// Calculates the Internet checksum of `bytes`: the one's complement of their one's complement
/// sum.
///
/// Summing a buffer that already embeds its correct checksum yields `0`.
#[inline]
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    !ones_complement_16bit(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn rfc1071_example() {
        let data = hex!("0001 f203 f4f5 f6f7");
        assert_eq!(ones_complement_16bit(&data), 0xddf2);
        assert_eq!(internet_checksum(&data), 0x220d);
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn odd_length_pads_low_byte() {
        assert_eq!(ones_complement_16bit(&hex!("0102 03")), 0x0402);
    }

    #[test]
    fn embedded_checksum_sums_to_zero() {
        let mut data = hex!("4500 0014 03e8 0000 4000 0000 7f00 0001 7f00 0001").to_vec();
        let sum = internet_checksum(&data);
        data[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&data), 0);
    }
}
