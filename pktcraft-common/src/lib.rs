// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bit-level building blocks shared by the `pktcraft` crates.
//!
//! Protocol headers are composed field by field into one unsigned integer of arbitrary width
//! (the last field of a header occupying the least significant bits) before being cut into
//! bytes. [`Bits`] is that integer: a fixed-length, big-endian-ordered bit string that can be
//! grown on its most significant end, patched in place, sliced and chunked.

#![forbid(unsafe_code)]

pub mod checksum;

pub use checksum::{internet_checksum, ones_complement_16bit, ones_complement_add};

use core::fmt;

const LIMB_BITS: usize = u64::BITS as usize;

#[inline]
fn limbs_for(len: usize) -> usize {
    (len + LIMB_BITS - 1) / LIMB_BITS
}

#[inline]
fn mask(width: usize) -> u64 {
    if width >= LIMB_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// An unsigned integer of exactly `len()` bits.
///
/// Offsets passed to the methods of `Bits` are always counted from the least significant
/// (rightmost) bit, matching how fields are folded into a header: the running offset of a field
/// is the total width of everything that follows it.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    // Little-endian limbs; no bit at or above `len` is ever set.
    limbs: Vec<u64>,
    len: usize,
}

impl Bits {
    /// An empty (zero-width) bit string.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A `len`-bit string with every bit cleared.
    #[inline]
    pub fn zeros(len: usize) -> Self {
        Bits {
            limbs: vec![0; limbs_for(len)],
            len,
        }
    }

    /// Creates a `len`-bit value from the low bits of `value`.
    ///
    /// Bits of `value` at or above `len` are discarded.
    #[inline]
    pub fn from_u64(value: u64, len: usize) -> Self {
        let mut bits = Self::zeros(len);
        if let Some(first) = bits.limbs.first_mut() {
            *first = value & mask(len);
        }
        bits
    }

    /// Interprets `bytes` as one big-endian integer `8 * bytes.len()` bits wide.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut bits = Self::zeros(bytes.len() * 8);
        for (idx, &byte) in bytes.iter().rev().enumerate() {
            bits.or_limb(byte as u64, idx * 8);
        }
        bits
    }

    /// The width of the bit string.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every bit is cleared.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|&l| l == 0)
    }

    /// The value as a `u64`, if it is no wider than 64 bits.
    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        if self.len > LIMB_BITS {
            None
        } else {
            Some(self.limbs.first().copied().unwrap_or(0))
        }
    }

    /// Places `high` above the current most significant bit.
    ///
    /// Equivalent to `self = (high << self.len()) | self`, with the width growing by
    /// `high.len()`.
    pub fn prepend(&mut self, high: &Bits) {
        let shift = self.len;
        self.len += high.len;
        self.limbs.resize(limbs_for(self.len), 0);
        for (idx, &limb) in high.limbs.iter().enumerate() {
            self.or_limb(limb, shift + idx * LIMB_BITS);
        }
    }

    /// Places `low` below the current least significant bit.
    ///
    /// Equivalent to `self = (self << low.len()) | low`.
    pub fn append(&mut self, low: &Bits) {
        let mut combined = low.clone();
        combined.prepend(self);
        *self = combined;
    }

    /// ORs `value` into the bit string, its least significant bit landing `offset` bits from
    /// the right. Bits that would fall at or above `len()` are discarded.
    #[inline]
    pub fn or_at(&mut self, value: u64, offset: usize) {
        self.or_limb(value, offset);
        self.clear_excess();
    }

    /// Reads `width` bits (at most 64) whose least significant bit sits `offset` bits from the
    /// right. Bits beyond the end of the string read as zero.
    ///
    /// # Panics
    ///
    /// Panics if `width` exceeds 64.
    pub fn extract(&self, offset: usize, width: usize) -> u64 {
        assert!(width <= LIMB_BITS, "Bits::extract() width exceeds 64 bits");
        if width == 0 {
            return 0;
        }

        let idx = offset / LIMB_BITS;
        let shift = offset % LIMB_BITS;
        let mut value = self.limbs.get(idx).copied().unwrap_or(0) >> shift;
        if shift != 0 {
            value |= self.limbs.get(idx + 1).copied().unwrap_or(0) << (LIMB_BITS - shift);
        }
        value & mask(width)
    }

    /// Copies out the `width` bits starting `offset` bits from the right as a new bit string.
    pub fn slice(&self, offset: usize, width: usize) -> Bits {
        let mut out = Bits::zeros(width);
        for (idx, limb) in out.limbs.iter_mut().enumerate() {
            let start = idx * LIMB_BITS;
            *limb = self.extract(offset + start, (width - start).min(LIMB_BITS));
        }
        out
    }

    /// Splits the bit string into `width`-bit chunks, most significant chunk first.
    ///
    /// Returns `None` if `width` is zero, exceeds 64, or does not evenly divide `len()`.
    pub fn chunks(&self, width: usize) -> Option<Vec<u64>> {
        if width == 0 || width > LIMB_BITS || self.len % width != 0 {
            return None;
        }

        let count = self.len / width;
        Some(
            (0..count)
                .rev()
                .map(|idx| self.extract(idx * width, width))
                .collect(),
        )
    }

    /// Cuts the bit string into bytes, most significant byte first.
    ///
    /// Returns `None` if the width is not a multiple of 8.
    #[inline]
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        Some(self.chunks(8)?.into_iter().map(|b| b as u8).collect())
    }

    #[inline]
    fn or_limb(&mut self, value: u64, offset: usize) {
        let idx = offset / LIMB_BITS;
        let shift = offset % LIMB_BITS;
        if let Some(limb) = self.limbs.get_mut(idx) {
            *limb |= value << shift;
        }
        if shift != 0 {
            if let Some(limb) = self.limbs.get_mut(idx + 1) {
                *limb |= value >> (LIMB_BITS - shift);
            }
        }
    }

    #[inline]
    fn clear_excess(&mut self) {
        let rem = self.len % LIMB_BITS;
        if rem != 0 {
            if let Some(last) = self.limbs.last_mut() {
                *last &= mask(rem);
            }
        }
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bits({}; 0x", self.len)?;
        if self.limbs.is_empty() {
            write!(f, "0")?;
        }
        for limb in self.limbs.iter().rev() {
            write!(f, "{:016x}", limb)?;
        }
        write!(f, ")")
    }
}

impl From<&[u8]> for Bits {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Bits::from_bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn prepend_places_high_bits_first() {
        let mut bits = Bits::from_u64(0b01, 2);
        bits.prepend(&Bits::from_u64(0b1, 1));
        bits.prepend(&Bits::from_u64(0xA, 4));
        assert_eq!(bits.len(), 7);
        assert_eq!(bits.as_u64(), Some(0b1010_1_01));
    }

    #[test]
    fn prepend_across_limb_boundary() {
        let mut bits = Bits::from_u64(0xFFFF_FFFF, 60);
        bits.prepend(&Bits::from_u64(0xABCD, 16));
        assert_eq!(bits.len(), 76);
        assert_eq!(bits.extract(60, 16), 0xABCD);
        assert_eq!(bits.extract(0, 32), 0xFFFF_FFFF);
        assert_eq!(bits.extract(32, 28), 0);
    }

    #[test]
    fn append_matches_prepend() {
        let mut a = Bits::from_bytes(&hex!("4500"));
        a.append(&Bits::from_bytes(&hex!("0014")));
        assert_eq!(a.to_bytes().unwrap(), hex!("45000014"));
    }

    #[test]
    fn bytes_round_trip_wide() {
        let bytes = hex!("fe80 0000 0000 0000 0211 22ff fe33 4455 aa");
        let bits = Bits::from_bytes(&bytes);
        assert_eq!(bits.len(), 136);
        assert_eq!(bits.to_bytes().unwrap(), bytes.to_vec());
    }

    #[test]
    fn or_at_discards_overflow() {
        let mut bits = Bits::zeros(12);
        bits.or_at(0xFFFF, 4);
        assert_eq!(bits.as_u64(), Some(0xFF0));
    }

    #[test]
    fn slice_and_chunks() {
        let bits = Bits::from_bytes(&hex!("0102030405060708090a"));
        assert_eq!(bits.slice(8, 16).as_u64(), Some(0x0809));
        let wide = bits.slice(0, 72);
        assert_eq!(wide.to_bytes().unwrap(), hex!("02030405060708090a"));
        assert_eq!(
            Bits::from_bytes(&hex!("c0a8 0001")).chunks(8).unwrap(),
            vec![192, 168, 0, 1]
        );
        assert!(bits.chunks(3).is_none());
    }

    #[test]
    fn unaligned_width_has_no_bytes() {
        assert!(Bits::zeros(12).to_bytes().is_none());
        assert_eq!(Bits::new().to_bytes(), Some(Vec::new()));
    }
}
