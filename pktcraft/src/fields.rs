// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fields: the named, bit-width-bounded value slots that protocol headers are built from.
//!
//! A [`Field`] holds an optional value. A field whose value is absent may still be serialized if
//! it is *auto*: it then generates a value at fold time, either from a fixed default or from a
//! scratch value computed by the owning protocol (lengths, next-protocol identifiers, padding
//! widths). Generated values are never written back, so a field the caller never set keeps
//! reporting itself as unset after any number of serializations.

mod address;

pub use address::AddressLayout;

use core::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use pktcraft_common::Bits;

use crate::error::{Error, Result};

/// A name-to-number alias table for enumerated fields.
pub type Aliases = &'static [(&'static str, u64)];

/// A value assigned to or read from a [`Field`].
///
/// Fields interpret values according to their kind: an enumerated field accepts either an
/// [`Int`](Value::Int) or the [`Text`](Value::Text) of one of its aliases, an address field
/// accepts its textual notation or its [`Pieces`](Value::Pieces), and so on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Text(String),
    Pieces(Vec<u64>),
    Bytes(Vec<u8>),
    Names(Vec<String>),
}

impl Value {
    #[inline]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_names(&self) -> Option<&[String]> {
        match self {
            Value::Names(n) => Some(n.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(t) => write!(f, "{}", t),
            Value::Pieces(p) => write!(f, "{:?}", p),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Names(n) => write!(f, "[{}]", n.join(", ")),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                #[inline]
                fn from(value: $t) -> Self {
                    Value::Int(value as u64)
                }
            }
        )*
    };
}

value_from_int!(u8, u16, u32, u64, bool);

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    #[inline]
    fn from(value: &[u8; N]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<u64>> for Value {
    #[inline]
    fn from(value: Vec<u64>) -> Self {
        Value::Pieces(value)
    }
}

impl From<&[&str]> for Value {
    #[inline]
    fn from(value: &[&str]) -> Self {
        Value::Names(value.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Value {
    #[inline]
    fn from(value: [&str; N]) -> Self {
        Value::Names(value.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Ipv4Addr> for Value {
    #[inline]
    fn from(value: Ipv4Addr) -> Self {
        Value::Pieces(value.octets().iter().map(|&o| o as u64).collect())
    }
}

impl From<Ipv6Addr> for Value {
    #[inline]
    fn from(value: Ipv6Addr) -> Self {
        Value::Pieces(value.segments().iter().map(|&s| s as u64).collect())
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
fn parse_int(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse::<u64>().ok(),
    }
}

#[inline]
fn fits(value: u64, bits: usize) -> bool {
    bits >= 64 || value >> bits == 0
}

/// An unsigned integer of fixed width.
#[derive(Clone, Debug)]
pub struct IntField {
    bits: usize,
    value: Option<u64>,
    default: Option<u64>,
}

impl IntField {
    #[inline]
    fn new(bits: usize) -> Self {
        IntField {
            bits,
            value: None,
            default: None,
        }
    }

    #[inline]
    pub fn bits(&self) -> usize {
        self.bits
    }

    #[inline]
    fn check(&self, field: &'static str, value: u64) -> Result<u64> {
        if fits(value, self.bits) {
            Ok(value)
        } else {
            Err(Error::validation(field, value))
        }
    }

    fn parse(&self, field: &'static str, value: Value, aliases: Aliases) -> Result<u64> {
        let raw = match &value {
            Value::Int(v) => Some(*v),
            Value::Text(t) => aliases
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(t.trim()))
                .map(|&(_, v)| v)
                .or_else(|| parse_int(t)),
            _ => None,
        };

        match raw {
            Some(v) => self.check(field, v),
            None => Err(Error::validation(field, value)),
        }
    }
}

/// An integer field whose values may also be given as human-readable aliases.
#[derive(Clone, Debug)]
pub struct EnumField {
    int: IntField,
    aliases: Aliases,
}

impl EnumField {
    /// The alias registered for `value`, if any.
    #[inline]
    pub fn alias(&self, value: u64) -> Option<&'static str> {
        self.aliases
            .iter()
            .find(|&&(_, v)| v == value)
            .map(|&(name, _)| name)
    }

    #[inline]
    pub fn aliases(&self) -> Aliases {
        self.aliases
    }
}

/// An integer field generated from a scratch value computed by its protocol just before the
/// header is folded (header lengths, total lengths, next-protocol identifiers).
#[derive(Clone, Debug)]
pub struct SpecialIntField {
    int: IntField,
    aliases: Aliases,
}

/// A transport-layer checksum slot.
///
/// It always generates zero; the owning protocol computes the real checksum over the folded
/// bits and injects it afterwards, unless the caller stored a nonzero value.
#[derive(Clone, Debug)]
pub struct ChecksumField {
    int: IntField,
}

/// A network or hardware address.
#[derive(Clone, Debug)]
pub struct AddressField {
    layout: AddressLayout,
    value: Option<Vec<u64>>,
    default: Option<Vec<u64>>,
}

impl AddressField {
    #[inline]
    pub fn layout(&self) -> AddressLayout {
        self.layout
    }

    fn parse(&self, field: &'static str, value: Value) -> Result<Vec<u64>> {
        let layout = self.layout;
        let pieces = match &value {
            Value::Text(t) => layout.parse(t.trim()),
            Value::Pieces(p) if layout.validate(p) => Some(p.clone()),
            Value::Bytes(b) if layout.piece_bits == 8 && b.len() == layout.pieces => {
                Some(b.iter().map(|&b| b as u64).collect())
            }
            Value::Int(v) if layout.bit_width() <= 64 && fits(*v, layout.bit_width()) => {
                Bits::from_u64(*v, layout.bit_width()).chunks(layout.piece_bits)
            }
            _ => None,
        };

        pieces.ok_or_else(|| Error::validation(field, value))
    }

    fn to_bits(&self, pieces: &[u64]) -> Bits {
        let mut bits = Bits::new();
        for &piece in pieces.iter().rev() {
            bits.prepend(&Bits::from_u64(piece, self.layout.piece_bits));
        }
        bits
    }
}

/// Zero bits whose width rounds the preceding variable-length part of a header up to a whole
/// number of `word`-bit words.
#[derive(Clone, Debug)]
pub struct PaddingField {
    word: usize,
}

impl PaddingField {
    /// The padding needed after `unpadded` bits.
    #[inline]
    pub fn width_after(&self, unpadded: usize) -> usize {
        if self.word == 0 {
            0
        } else {
            (self.word - unpadded % self.word) % self.word
        }
    }
}

/// An opaque run of bytes, as wide as its contents.
#[derive(Clone, Debug)]
pub struct DataField {
    value: Option<Vec<u8>>,
    default: Option<Vec<u8>>,
}

impl DataField {
    /// The stored bytes, if any.
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

/// An ordered cluster of named one-bit flags; the first name is the most significant bit.
#[derive(Clone, Debug)]
pub struct FlagsField {
    names: &'static [&'static str],
    value: Option<u64>,
    default: u64,
}

impl FlagsField {
    #[inline]
    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    fn bit(&self, name: &str) -> Option<u64> {
        let idx = self
            .names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name.trim()))?;
        Some(1 << (self.names.len() - 1 - idx))
    }

    #[inline]
    fn current(&self) -> u64 {
        self.value.unwrap_or(self.default)
    }

    fn set_names(&self) -> Vec<String> {
        let mask = self.current();
        self.names
            .iter()
            .enumerate()
            .filter(|(idx, _)| mask & (1 << (self.names.len() - 1 - idx)) != 0)
            .map(|(_, n)| n.to_string())
            .collect()
    }

    fn parse(&self, field: &'static str, value: Value) -> Result<u64> {
        let mask = match &value {
            Value::Int(v) if fits(*v, self.names.len()) => Some(*v),
            Value::Text(t) => self.bit(t),
            Value::Names(names) => names
                .iter()
                .map(|n| self.bit(n))
                .try_fold(0, |acc, b| Some(acc | b?)),
            _ => None,
        };

        mask.ok_or_else(|| Error::validation(field, value))
    }
}

/// The kind-specific part of a [`Field`].
#[derive(Clone, Debug)]
pub enum FieldKind {
    Int(IntField),
    Enum(EnumField),
    Special(SpecialIntField),
    Address(AddressField),
    Padding(PaddingField),
    Data(DataField),
    Flags(FlagsField),
    Checksum(ChecksumField),
}

/// One named value slot inside a protocol header.
#[derive(Clone, Debug)]
pub struct Field {
    name: &'static str,
    active: bool,
    kind: FieldKind,
}

impl Field {
    #[inline]
    fn with_kind(name: &'static str, kind: FieldKind) -> Self {
        Field {
            name,
            active: true,
            kind,
        }
    }

    /// A plain `bits`-wide unsigned integer with no default.
    #[inline]
    pub fn int(name: &'static str, bits: usize) -> Self {
        Self::with_kind(name, FieldKind::Int(IntField::new(bits)))
    }

    /// A `bits`-wide integer that also accepts the names in `aliases`.
    #[inline]
    pub fn enumerated(name: &'static str, bits: usize, aliases: Aliases) -> Self {
        Self::with_kind(
            name,
            FieldKind::Enum(EnumField {
                int: IntField::new(bits),
                aliases,
            }),
        )
    }

    /// A `bits`-wide integer generated from its protocol's scratch value.
    #[inline]
    pub fn special(name: &'static str, bits: usize) -> Self {
        Self::with_kind(
            name,
            FieldKind::Special(SpecialIntField {
                int: IntField::new(bits),
                aliases: &[],
            }),
        )
    }

    /// A `bits`-wide checksum slot, filled in after the header is folded.
    #[inline]
    pub fn checksum(name: &'static str, bits: usize) -> Self {
        Self::with_kind(
            name,
            FieldKind::Checksum(ChecksumField {
                int: IntField {
                    bits,
                    value: None,
                    default: Some(0),
                },
            }),
        )
    }

    #[inline]
    pub fn address(name: &'static str, layout: AddressLayout) -> Self {
        Self::with_kind(
            name,
            FieldKind::Address(AddressField {
                layout,
                value: None,
                default: None,
            }),
        )
    }

    /// Padding up to a multiple of `word` bits.
    #[inline]
    pub fn padding(name: &'static str, word: usize) -> Self {
        Self::with_kind(name, FieldKind::Padding(PaddingField { word }))
    }

    /// Opaque data; generates an empty value when left unset.
    #[inline]
    pub fn data(name: &'static str) -> Self {
        Self::with_kind(
            name,
            FieldKind::Data(DataField {
                value: None,
                default: Some(Vec::new()),
            }),
        )
    }

    /// Opaque data already holding `bytes`.
    #[inline]
    pub fn data_with(name: &'static str, bytes: Vec<u8>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Data(DataField {
                value: Some(bytes),
                default: Some(Vec::new()),
            }),
        )
    }

    /// A cluster of one-bit flags, all clear unless set.
    #[inline]
    pub fn flags(name: &'static str, names: &'static [&'static str]) -> Self {
        Self::with_kind(
            name,
            FieldKind::Flags(FlagsField {
                names,
                value: None,
                default: 0,
            }),
        )
    }

    /// Makes the field auto, generating `value` when left unset.
    ///
    /// Applies to integer-like and flag fields; for scratch-driven fields the default is only
    /// used when the protocol supplies no scratch value.
    pub fn auto(mut self, value: u64) -> Self {
        match &mut self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.default = Some(value)
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.default = Some(value),
            FieldKind::Flags(f) => f.default = value,
            _ => debug_assert!(false, "auto() used on a non-integer field"),
        }
        self
    }

    /// Makes an address field auto, generating `pieces` when left unset.
    pub fn auto_pieces(mut self, pieces: &[u64]) -> Self {
        if let FieldKind::Address(f) = &mut self.kind {
            debug_assert!(f.layout.validate(pieces));
            f.default = Some(pieces.to_vec());
        }
        self
    }

    /// Attaches human-readable aliases to a scratch-driven field.
    pub fn aliases(mut self, table: Aliases) -> Self {
        match &mut self.kind {
            FieldKind::Special(f) => f.aliases = table,
            FieldKind::Enum(f) => f.aliases = table,
            _ => debug_assert!(false, "aliases() used on a field without alias support"),
        }
        self
    }

    /// The documentation label of the field.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether the field currently contributes to its protocol's layout.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether the field can produce a value of its own when left unset.
    pub fn is_auto(&self) -> bool {
        match &self.kind {
            FieldKind::Int(f) => f.default.is_some(),
            FieldKind::Enum(f) => f.int.default.is_some(),
            FieldKind::Address(f) => f.default.is_some(),
            FieldKind::Data(f) => f.default.is_some(),
            FieldKind::Special(_)
            | FieldKind::Checksum(_)
            | FieldKind::Padding(_)
            | FieldKind::Flags(_) => true,
        }
    }

    /// Whether a value has been explicitly stored.
    pub fn is_set(&self) -> bool {
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.value.is_some()
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.value.is_some(),
            FieldKind::Address(f) => f.value.is_some(),
            FieldKind::Data(f) => f.value.is_some(),
            FieldKind::Flags(f) => f.value.is_some(),
            FieldKind::Padding(_) => false,
        }
    }

    /// The width of the field given the protocol's scratch value (only padding depends on it).
    pub fn bit_width(&self, scratch: Option<u64>) -> usize {
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => f.bits,
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.bits,
            FieldKind::Address(f) => f.layout.bit_width(),
            FieldKind::Padding(f) => f.width_after(scratch.unwrap_or(0) as usize),
            FieldKind::Data(f) => {
                f.value.as_ref().or(f.default.as_ref()).map_or(0, |v| v.len() * 8)
            }
            FieldKind::Flags(f) => f.names.len(),
        }
    }

    /// The width of the field outside of serialization.
    #[inline]
    pub fn width(&self) -> usize {
        self.bit_width(None)
    }

    /// Validates and stores `value`.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let name = self.name;
        match &mut self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.value = Some(f.parse(name, value, &[])?);
            }
            FieldKind::Enum(EnumField { int: f, aliases })
            | FieldKind::Special(SpecialIntField { int: f, aliases }) => {
                f.value = Some(f.parse(name, value, *aliases)?);
            }
            FieldKind::Address(f) => f.value = Some(f.parse(name, value)?),
            FieldKind::Padding(_) => match value {
                Value::Int(0) => (),
                other => return Err(Error::validation(name, other)),
            },
            FieldKind::Data(f) => {
                f.value = Some(match value {
                    Value::Bytes(b) => b,
                    Value::Text(t) => t.into_bytes(),
                    other => return Err(Error::validation(name, other)),
                })
            }
            FieldKind::Flags(f) => f.value = Some(f.parse(name, value)?),
        }
        Ok(())
    }

    /// The stored value in its raw form, or `None` if unset. Never triggers generation.
    pub fn get(&self) -> Option<Value> {
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.value.map(Value::Int)
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.value.map(Value::Int),
            FieldKind::Address(f) => f
                .value
                .as_ref()
                .map(|p| Value::Text(f.layout.format(p))),
            FieldKind::Data(f) => f.value.clone().map(Value::Bytes),
            FieldKind::Flags(f) => f.value.map(Value::Int),
            FieldKind::Padding(_) => None,
        }
    }

    /// The stored value in human-readable form: enumerated integers become their alias (when
    /// one matches) and flag clusters become the list of set flag names.
    pub fn get_human(&self) -> Option<Value> {
        match &self.kind {
            FieldKind::Enum(EnumField { int, aliases })
            | FieldKind::Special(SpecialIntField { int, aliases }) => {
                let value = int.value?;
                Some(
                    aliases
                        .iter()
                        .find(|&&(_, v)| v == value)
                        .map_or(Value::Int(value), |&(name, _)| Value::Text(name.to_string())),
                )
            }
            FieldKind::Flags(f) if f.value.is_some() => Some(Value::Names(f.set_names())),
            _ => self.get(),
        }
    }

    /// The stored integer value of an integer-like or flags field.
    pub fn int_value(&self) -> Option<u64> {
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => f.value,
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.value,
            FieldKind::Flags(f) => f.value,
            _ => None,
        }
    }

    /// The stored integer value, falling back to the field's fixed default.
    pub fn current_int(&self) -> Option<u64> {
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.value.or(f.default)
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.value.or(f.default),
            FieldKind::Flags(f) => Some(f.current()),
            _ => None,
        }
    }

    /// Resets the field to unset.
    pub fn clear(&mut self) {
        match &mut self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => f.value = None,
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => f.value = None,
            FieldKind::Address(f) => f.value = None,
            FieldKind::Data(f) => f.value = None,
            FieldKind::Flags(f) => f.value = None,
            FieldKind::Padding(_) => (),
        }
    }

    /// Produces the raw bits of the field for serialization.
    ///
    /// A stored value is converted directly; otherwise a value is generated (from `scratch` for
    /// scratch-driven fields) without being stored.
    #[inline]
    pub fn fillout(&self, scratch: Option<u64>) -> Result<Bits> {
        if self.is_set() {
            self.raw_value()
        } else {
            self.generate_value(scratch)
        }
    }

    /// Converts the stored value into exactly `width()` big-endian bits.
    pub fn raw_value(&self) -> Result<Bits> {
        let undefined = Error::UndefinedValue { field: self.name };
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                Ok(Bits::from_u64(f.value.ok_or(undefined)?, f.bits))
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => {
                Ok(Bits::from_u64(f.value.ok_or(undefined)?, f.bits))
            }
            FieldKind::Address(f) => Ok(f.to_bits(f.value.as_ref().ok_or(undefined)?)),
            FieldKind::Data(f) => Ok(Bits::from_bytes(f.value.as_ref().ok_or(undefined)?)),
            FieldKind::Flags(f) => Ok(Bits::from_u64(f.value.ok_or(undefined)?, f.names.len())),
            FieldKind::Padding(_) => Ok(Bits::zeros(self.width())),
        }
    }

    /// Generates a value for an unset field.
    pub fn generate_value(&self, scratch: Option<u64>) -> Result<Bits> {
        let undefined = Error::UndefinedValue { field: self.name };
        match &self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                Ok(Bits::from_u64(f.default.ok_or(undefined)?, f.bits))
            }
            FieldKind::Enum(EnumField { int: f, .. }) => {
                Ok(Bits::from_u64(f.default.ok_or(undefined)?, f.bits))
            }
            FieldKind::Special(SpecialIntField { int: f, .. }) => {
                let value = scratch.or(f.default).ok_or(undefined)?;
                if !fits(value, f.bits) {
                    tracing::warn!(
                        field = self.name,
                        value,
                        bits = f.bits,
                        "generated value truncated to field width"
                    );
                }
                Ok(Bits::from_u64(value, f.bits))
            }
            FieldKind::Address(f) => Ok(f.to_bits(f.default.as_ref().ok_or(undefined)?)),
            FieldKind::Data(f) => Ok(Bits::from_bytes(f.default.as_ref().ok_or(undefined)?)),
            FieldKind::Flags(f) => Ok(Bits::from_u64(f.default, f.names.len())),
            FieldKind::Padding(_) => Ok(Bits::zeros(self.bit_width(scratch))),
        }
    }

    /// Stores the value encoded by `raw`, the field's bits as sliced from a captured header.
    pub(crate) fn load_raw(&mut self, raw: &Bits) -> Result<()> {
        let name = self.name;
        let invalid = || Error::validation(name, format!("{:?}", raw));
        match &mut self.kind {
            FieldKind::Int(f) | FieldKind::Checksum(ChecksumField { int: f }) => {
                f.value = Some(raw.as_u64().ok_or_else(invalid)?)
            }
            FieldKind::Enum(EnumField { int: f, .. })
            | FieldKind::Special(SpecialIntField { int: f, .. }) => {
                f.value = Some(raw.as_u64().ok_or_else(invalid)?)
            }
            FieldKind::Address(f) => {
                f.value = Some(raw.chunks(f.layout.piece_bits).ok_or_else(invalid)?)
            }
            FieldKind::Data(f) => f.value = Some(raw.to_bytes().ok_or_else(invalid)?),
            FieldKind::Flags(f) => f.value = Some(raw.as_u64().ok_or_else(invalid)?),
            FieldKind::Padding(_) => (),
        }
        Ok(())
    }

    /// The stored bytes of a data field.
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            FieldKind::Data(f) => f.bytes(),
            _ => None,
        }
    }

    /// The names of the flags in a flags field.
    #[inline]
    pub fn flag_names(&self) -> Option<&'static [&'static str]> {
        match &self.kind {
            FieldKind::Flags(f) => Some(f.names),
            _ => None,
        }
    }

    /// Whether the named flag is set (unset clusters read as their default).
    pub fn flag(&self, flag: &str) -> Result<bool> {
        match &self.kind {
            FieldKind::Flags(f) => {
                let bit = f.bit(flag).ok_or_else(|| Error::lookup(self.name, flag))?;
                Ok(f.current() & bit != 0)
            }
            _ => Err(Error::FieldKind {
                field: self.name,
                expected: "flags",
            }),
        }
    }

    /// Sets or clears one named flag, leaving the others as they are.
    pub fn set_flag(&mut self, flag: &str, on: bool) -> Result<()> {
        let name = self.name;
        match &mut self.kind {
            FieldKind::Flags(f) => {
                let bit = f.bit(flag).ok_or_else(|| Error::validation(name, flag))?;
                let mask = f.current();
                f.value = Some(if on { mask | bit } else { mask & !bit });
                Ok(())
            }
            _ => Err(Error::FieldKind {
                field: name,
                expected: "flags",
            }),
        }
    }
}
