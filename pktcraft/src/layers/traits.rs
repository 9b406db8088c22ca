// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Traits used to provide [`Protocol`] functionality.
//!
//! Serializing a protocol happens in three phases, driven by [`Protocol::serialize()`]:
//!
//! 1. [`Protocol::before_fold()`] computes the [`Scratch`] values that scratch-driven fields
//!    (lengths, discriminators, padding widths) generate from.
//! 2. Every active field is converted to raw bits, the last declared field landing in the
//!    least significant bits, and the result is placed directly above the bits of everything
//!    that follows the protocol in its packet.
//! 3. [`Protocol::after_fold()`] may patch the accumulated bits, typically to inject a checksum
//!    into a slot that was folded as zero.

use core::any::Any;
use core::fmt;

use pktcraft_common::checksum::internet_checksum;
use pktcraft_common::Bits;

use crate::error::{Error, Result};
use crate::fields::{Field, FieldKind, Value};

// =============================================================================
//                     Traits Generated by `#[derive(Protocol)]`
// =============================================================================

/// Per-type constants of a protocol.
pub trait ProtocolMeta {
    /// The name of the protocol (e.g. `"IP"`).
    const NAME: &'static str;
    /// The OSI-style layer of the protocol, used for ordering checks and decoder dispatch.
    const LAYER: u8;
    /// The value a lower-layer protocol writes into its next-protocol field to point at this
    /// protocol.
    const PROTOCOL_ID: u32;
    /// The field holding the identifier of the protocol carried as payload.
    const PAYLOAD_FIELD: Option<&'static str>;
    /// The names of all fields, in wire order.
    const FIELD_NAMES: &'static [&'static str];
}

/// Object-safe access to the field table of a protocol.
pub trait ProtocolFields {
    fn name(&self) -> &'static str;

    fn layer(&self) -> u8;

    fn protocol_id(&self) -> u32;

    fn payload_field(&self) -> Option<&'static str>;

    /// The names of all fields, in wire order.
    fn field_names(&self) -> &'static [&'static str];

    fn field(&self, name: &str) -> Option<&Field>;

    fn field_mut(&mut self, name: &str) -> Option<&mut Field>;

    /// All fields, in wire order.
    fn fields(&self) -> Vec<&Field>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_boxed(&self) -> Box<dyn Protocol>;
}

// =============================================================================
//                              Build Context
// =============================================================================

/// Per-field scratch values computed by a protocol just before its fields are folded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Scratch {
    values: Vec<(&'static str, u64)>,
}

impl Scratch {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scratch value of `field`, replacing any earlier one.
    pub fn set(&mut self, field: &'static str, value: u64) {
        match self.values.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.values.push((field, value)),
        }
    }

    #[inline]
    pub fn with(mut self, field: &'static str, value: u64) -> Self {
        self.set(field, value);
        self
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .map(|&(_, value)| value)
    }
}

/// Where a protocol's own bits sit within the accumulator after folding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FoldSpan {
    /// The number of bits folded before this protocol (everything it carries).
    pub payload_bits: usize,
    /// The number of bits this protocol contributed.
    pub own_bits: usize,
}

impl FoldSpan {
    #[inline]
    pub fn total_bits(&self) -> usize {
        self.payload_bits + self.own_bits
    }
}

/// The state shared by all protocols of a packet while it is being serialized.
///
/// Protocols are serialized last to first, so when a protocol is folded the accumulator
/// already holds the bits of every protocol that follows it. The sibling list gives read
/// access to the whole packet: the payload of the protocol at `index` is the sibling at
/// `index + 1`.
pub struct BuildContext<'a> {
    siblings: &'a [&'a dyn Protocol],
    index: usize,
    raw: Bits,
}

impl<'a> BuildContext<'a> {
    #[inline]
    pub fn new(siblings: &'a [&'a dyn Protocol], index: usize, raw: Bits) -> Self {
        BuildContext {
            siblings,
            index,
            raw,
        }
    }

    /// The position of the protocol being serialized within its packet.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The protocol carried directly by the one being serialized.
    #[inline]
    pub fn payload(&self) -> Option<&'a dyn Protocol> {
        self.siblings.get(self.index + 1).copied()
    }

    /// The protocols preceding the one being serialized, nearest first.
    pub fn preceding(&self) -> impl Iterator<Item = &'a dyn Protocol> + 'a {
        let siblings = self.siblings;
        siblings[..self.index.min(siblings.len())].iter().rev().copied()
    }

    #[inline]
    pub fn raw(&self) -> &Bits {
        &self.raw
    }

    #[inline]
    pub fn raw_mut(&mut self) -> &mut Bits {
        &mut self.raw
    }

    #[inline]
    pub fn into_raw(self) -> Bits {
        self.raw
    }
}

/// A field identified either by name or by the field itself.
#[derive(Clone, Copy, Debug)]
pub enum FieldRef<'a> {
    Name(&'a str),
    Field(&'a Field),
}

impl<'a> From<&'a str> for FieldRef<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        FieldRef::Name(value)
    }
}

impl<'a> From<&'a Field> for FieldRef<'a> {
    #[inline]
    fn from(value: &'a Field) -> Self {
        FieldRef::Field(value)
    }
}

// =============================================================================
//                               Protocol Trait
// =============================================================================

/// One layer of a packet: an ordered set of fields plus the hooks that tie them to the rest of
/// the packet.
pub trait Protocol: ProtocolFields + fmt::Debug {
    /// Computes the scratch values of the protocol's scratch-driven fields.
    #[inline]
    fn before_fold(&self, _ctx: &BuildContext<'_>) -> Result<Scratch> {
        Ok(Scratch::new())
    }

    /// Patches the accumulated bits once the protocol's own bits have been placed.
    #[inline]
    fn after_fold(
        &self,
        _ctx: &mut BuildContext<'_>,
        _span: FoldSpan,
        _scratch: &Scratch,
    ) -> Result<()> {
        Ok(())
    }

    /// Fills the protocol's fields from the start of `bytes`, returning the bytes that follow
    /// its header.
    #[inline]
    fn load<'b>(&mut self, bytes: &'b [u8]) -> Result<&'b [u8]> {
        load_fields(self, bytes)
    }

    /// Called after a field has been assigned through the protocol (or loaded from bytes).
    #[inline]
    fn field_changed(&mut self, _name: &str) {}

    /// Looks up a field by name.
    fn get_field(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| Error::lookup(self.name(), name))
    }

    /// Looks up a field by name for modification.
    ///
    /// Values assigned directly through the returned field bypass [`field_changed()`], so
    /// activation-dependent protocols should be modified through [`set_field()`] instead.
    ///
    /// [`field_changed()`]: Protocol::field_changed
    /// [`set_field()`]: Protocol::set_field
    fn get_field_mut(&mut self, name: &str) -> Result<&mut Field> {
        let protocol = self.name();
        self.field_mut(name)
            .ok_or_else(|| Error::lookup(protocol, name))
    }

    /// The stored value of the named field.
    #[inline]
    fn get(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get_field(name)?.get())
    }

    /// The stored value of the named field in human-readable form.
    #[inline]
    fn get_human(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get_field(name)?.get_human())
    }

    /// Assigns a value to the named field.
    fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.get_field_mut(name)?.set(value)?;
        self.field_changed(name);
        Ok(())
    }

    /// Assigns several fields at once. Nothing is modified unless every name exists and every
    /// value is accepted.
    fn set_fields(&mut self, pairs: Vec<(&str, Value)>) -> Result<()> {
        for (name, _) in pairs.iter() {
            self.get_field(name)?;
        }

        for (name, value) in pairs.iter() {
            self.get_field(name)?.clone().set(value.clone())?;
        }

        // Live fields keep the activation set by earlier pairs.
        for (name, value) in pairs {
            self.get_field_mut(name)?.set(value)?;
            self.field_changed(name);
        }
        Ok(())
    }

    /// Assigns fields from an alternating `name, value, name, value, ...` sequence.
    fn set_fields_seq(&mut self, items: Vec<Value>) -> Result<()> {
        if items.len() % 2 != 0 {
            return Err(Error::UnpairedArgument(items.len()));
        }

        let mut names = Vec::with_capacity(items.len() / 2);
        let mut values = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(name), Some(value)) = (items.next(), items.next()) {
            match name {
                Value::Text(name) => names.push(name),
                other => return Err(Error::lookup(self.name(), &other.to_string())),
            }
            values.push(value);
        }

        let pairs = names
            .iter()
            .map(String::as_str)
            .zip(values)
            .collect::<Vec<_>>();
        self.set_fields(pairs)
    }

    /// Reads the named flags of a flags field.
    fn get_flags(&self, field: &str, flags: &[&str]) -> Result<Vec<bool>> {
        let field = self.get_field(field)?;
        flags.iter().map(|flag| field.flag(flag)).collect()
    }

    /// Sets or clears the named flags of a flags field. Nothing is modified if any flag name is
    /// unknown.
    fn set_flags(&mut self, field: &str, flags: &[(&str, bool)]) -> Result<()> {
        let mut staged = self.get_field(field)?.clone();
        if !matches!(staged.kind(), FieldKind::Flags(_)) {
            return Err(Error::FieldKind {
                field: staged.name(),
                expected: "flags",
            });
        }

        for &(flag, on) in flags {
            staged.set_flag(flag, on)?;
        }

        *self.get_field_mut(field)? = staged;
        self.field_changed(field);
        Ok(())
    }

    /// The bit offset of a field from the start of the protocol: the summed width of every
    /// active field declared before it.
    fn get_offset(&self, field: FieldRef<'_>) -> Result<usize> {
        self.offset_with(field, &Scratch::new())
    }

    /// Like [`get_offset()`](Protocol::get_offset), with padding widths taken from `scratch`.
    fn offset_with(&self, target: FieldRef<'_>, scratch: &Scratch) -> Result<usize> {
        let mut offset = 0;
        for field in self.fields() {
            let found = match target {
                FieldRef::Name(name) => field.name() == name,
                FieldRef::Field(f) => core::ptr::eq(field, f),
            };
            if found {
                return Ok(offset);
            }
            if field.is_active() {
                offset += field.bit_width(width_hint(field, scratch, offset));
            }
        }

        let name = match target {
            FieldRef::Name(name) => name.to_string(),
            FieldRef::Field(f) => f.name().to_string(),
        };
        Err(Error::AttributeLookup {
            target: self.name(),
            name,
        })
    }

    /// The width of the protocol header as it stands.
    #[inline]
    fn bit_width(&self) -> usize {
        self.bit_width_with(&Scratch::new())
    }

    /// The width of the protocol header, with padding widths taken from `scratch`.
    fn bit_width_with(&self, scratch: &Scratch) -> usize {
        let mut width = 0;
        for field in self.fields().into_iter().filter(|f| f.is_active()) {
            width += field.bit_width(width_hint(field, scratch, width));
        }
        width
    }

    /// Converts every active field into raw bits, the last declared field landing in the
    /// least significant bits.
    fn fold(&self, scratch: &Scratch) -> Result<Bits> {
        let mut preceding = 0;
        let mut pieces = Vec::new();
        for field in self.fields().into_iter().filter(|f| f.is_active()) {
            let bits = field.fillout(width_hint(field, scratch, preceding))?;
            preceding += bits.len();
            pieces.push(bits);
        }

        let mut folded = Bits::new();
        for bits in pieces.iter().rev() {
            folded.prepend(bits);
        }
        Ok(folded)
    }

    /// Runs all three serialization phases, placing the protocol's bits above those already in
    /// `ctx`.
    fn serialize(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let scratch = self.before_fold(ctx)?;
        let own = self.fold(&scratch)?;
        if own.len() % 8 != 0 {
            return Err(Error::Alignment {
                target: self.name(),
                bits: own.len(),
            });
        }

        let span = FoldSpan {
            payload_bits: ctx.raw().len(),
            own_bits: own.len(),
        };
        ctx.raw_mut().prepend(&own);
        self.after_fold(ctx, span, &scratch)
    }
}

impl Clone for Box<dyn Protocol> {
    #[inline]
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Conveniences available on every protocol.
pub trait ProtocolExt: Protocol {
    /// Assigns a value to the named field.
    #[inline]
    fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.set_field(name, value.into())
    }

    /// Assigns a value to the named field, builder style.
    #[inline]
    fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self>
    where
        Self: Sized,
    {
        self.set_field(name, value.into())?;
        Ok(self)
    }

    /// Serializes the protocol on its own, as though it were the only layer of a packet.
    fn to_bits(&self) -> Result<Bits>
    where
        Self: Sized,
    {
        let siblings: [&dyn Protocol; 1] = [self];
        let mut ctx = BuildContext::new(&siblings, 0, Bits::new());
        self.serialize(&mut ctx)?;
        Ok(ctx.into_raw())
    }

    /// Serializes the protocol on its own into bytes.
    fn to_bytes(&self) -> Result<Vec<u8>>
    where
        Self: Sized,
    {
        let bits = self.to_bits()?;
        bits.to_bytes().ok_or(Error::Alignment {
            target: self.name(),
            bits: bits.len(),
        })
    }
}

impl<P: Protocol + ?Sized> ProtocolExt for P {}

/// The scratch value a field folds with: its own entry in `scratch`, or for padding the width
/// of everything declared before it.
#[inline]
fn width_hint(field: &Field, scratch: &Scratch, preceding: usize) -> Option<u64> {
    scratch.get(field.name()).or(match field.kind() {
        FieldKind::Padding(_) => Some(preceding as u64),
        _ => None,
    })
}

// =============================================================================
//                              Shared Routines
// =============================================================================

/// Loads the active fields of `protocol` in wire order from the start of `bytes`.
///
/// Activation is re-evaluated after every field (through [`Protocol::field_changed()`]), so a
/// discriminator loaded early decides which of the later fields are read. Variable-width data
/// fields load as empty.
pub fn load_fields<'b, P: Protocol + ?Sized>(protocol: &mut P, bytes: &'b [u8]) -> Result<&'b [u8]> {
    let available = bytes.len() * 8;
    let raw = Bits::from_bytes(bytes);
    let mut offset = 0;

    for &name in protocol.field_names() {
        let (active, width) = match protocol.field(name) {
            Some(field) => (field.is_active(), field.bit_width(Some(offset as u64))),
            None => continue,
        };
        if !active {
            continue;
        }

        if offset + width > available {
            return Err(Error::InsufficientBytes {
                protocol: protocol.name(),
                needed: (offset + width + 7) / 8,
                available: bytes.len(),
            });
        }

        let slice = raw.slice(available - offset - width, width);
        protocol.get_field_mut(name)?.load_raw(&slice)?;
        protocol.field_changed(name);
        offset += width;
    }

    if offset % 8 != 0 {
        return Err(Error::Alignment {
            target: protocol.name(),
            bits: offset,
        });
    }

    Ok(&bytes[offset / 8..])
}

/// What a checksum injected by [`inject_checksum()`] covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumScope {
    /// The protocol's own bits only (IPv4 header checksum).
    Header,
    /// The protocol's own bits followed by everything it carries.
    HeaderAndPayload,
}

/// Computes the Internet checksum over `pseudo` (if any) followed by the covered bits, and ORs
/// it into the named 16-bit checksum slot of `protocol`.
///
/// The slot is left untouched if it is already nonzero, which happens exactly when the caller
/// stored a checksum of their own.
pub fn inject_checksum<P: Protocol + ?Sized>(
    protocol: &P,
    ctx: &mut BuildContext<'_>,
    span: FoldSpan,
    scratch: &Scratch,
    field: &str,
    scope: ChecksumScope,
    pseudo: Option<Bits>,
) -> Result<()> {
    let offset = protocol.offset_with(FieldRef::Name(field), scratch)?;
    let width = protocol.get_field(field)?.width();
    let slot = span.total_bits() - (offset + width);

    if ctx.raw().extract(slot, width) != 0 {
        tracing::trace!(
            protocol = protocol.name(),
            field,
            "checksum already present, skipping"
        );
        return Ok(());
    }

    let covered = match scope {
        ChecksumScope::Header => ctx.raw().slice(span.payload_bits, span.own_bits),
        ChecksumScope::HeaderAndPayload => ctx.raw().slice(0, span.total_bits()),
    };

    let mut data = pseudo.unwrap_or_default();
    data.append(&covered);
    let bytes = data.to_bytes().ok_or(Error::Alignment {
        target: protocol.name(),
        bits: data.len(),
    })?;

    let checksum = internet_checksum(&bytes);
    tracing::trace!(protocol = protocol.name(), field, checksum, "checksum injected");
    ctx.raw_mut().or_at(checksum as u64, slot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktcraft_macros::Protocol;

    const KINDS: crate::fields::Aliases = &[("hello", 1), ("goodbye", 2)];

    #[derive(Clone, Debug, Protocol)]
    #[protocol(name = "Sample", layer = 4, id = 0)]
    struct Sample {
        kind: Field,
        length: Field,
        cookie: Field,
    }

    impl Sample {
        fn new() -> Self {
            Sample {
                kind: Field::enumerated("kind", 8, KINDS).auto(1),
                length: Field::int("length", 8).auto(0),
                cookie: Field::int("cookie", 16).auto(0),
            }
        }
    }

    impl Protocol for Sample {}

    #[derive(Clone, Debug, Protocol)]
    #[protocol(name = "Nibble", layer = 4, id = 0)]
    struct Nibble {
        version: Field,
        flags: Field,
    }

    impl Protocol for Nibble {}

    #[test]
    fn set_fields_is_all_or_nothing() {
        let mut sample = Sample::new();

        assert!(matches!(
            sample.set_fields(vec![("length", Value::Int(4)), ("bogus", Value::Int(1))]),
            Err(Error::AttributeLookup { target: "Sample", .. })
        ));
        assert!(matches!(
            sample.set_fields(vec![("length", Value::Int(4)), ("kind", Value::from("nope"))]),
            Err(Error::Validation { field: "kind", .. })
        ));
        assert!(matches!(
            sample.set_fields(vec![("length", Value::Int(4)), ("cookie", Value::Int(0x1_0000))]),
            Err(Error::Validation { field: "cookie", .. })
        ));
        for name in ["kind", "length", "cookie"] {
            assert_eq!(sample.get(name).unwrap(), None, "{}", name);
        }

        sample
            .set_fields(vec![("kind", Value::from("goodbye")), ("cookie", Value::Int(0xbeef))])
            .unwrap();
        assert_eq!(sample.get("kind").unwrap(), Some(Value::Int(2)));
        assert_eq!(sample.to_bytes().unwrap(), vec![0x02, 0x00, 0xbe, 0xef]);
    }

    #[test]
    fn set_fields_seq_requires_pairs() {
        let mut sample = Sample::new();
        assert!(matches!(
            sample.set_fields_seq(vec!["length".into(), Value::Int(4), "cookie".into()]),
            Err(Error::UnpairedArgument(3))
        ));
        assert_eq!(sample.get("length").unwrap(), None);

        sample
            .set_fields_seq(vec!["length".into(), Value::Int(4), "kind".into(), "hello".into()])
            .unwrap();
        assert_eq!(sample.get("length").unwrap(), Some(Value::Int(4)));
        assert_eq!(sample.get_human("kind").unwrap(), Some(Value::Text("hello".into())));
    }

    #[test]
    fn offset_by_name_and_identity() {
        let sample = Sample::new();
        assert_eq!(sample.get_offset(FieldRef::Name("kind")).unwrap(), 0);
        assert_eq!(sample.get_offset("cookie".into()).unwrap(), 16);

        let length = sample.get_field("length").unwrap();
        assert_eq!(sample.get_offset(FieldRef::Field(length)).unwrap(), 8);

        let other = Sample::new();
        let foreign = other.get_field("length").unwrap();
        assert!(matches!(
            sample.get_offset(FieldRef::Field(foreign)),
            Err(Error::AttributeLookup { target: "Sample", .. })
        ));
        assert!(sample.get_offset(FieldRef::Name("bogus")).is_err());
    }

    #[test]
    fn unknown_names_are_lookup_errors() {
        let mut sample = Sample::new();
        assert!(matches!(
            sample.get("bogus"),
            Err(Error::AttributeLookup { target: "Sample", ref name }) if name == "bogus"
        ));
        assert!(matches!(
            sample.get_human("bogus"),
            Err(Error::AttributeLookup { .. })
        ));
        assert!(matches!(
            sample.set("bogus", 1u8),
            Err(Error::AttributeLookup { target: "Sample", .. })
        ));
        assert!(matches!(
            sample.get_flags("bogus", &["x"]),
            Err(Error::AttributeLookup { .. })
        ));
    }

    #[test]
    fn unaligned_protocol_is_rejected() {
        let nibble = Nibble {
            version: Field::int("version", 4).auto(4),
            flags: Field::int("flags", 8).auto(0),
        };
        assert_eq!(nibble.bit_width(), 12);
        assert!(matches!(
            nibble.to_bits(),
            Err(Error::Alignment { target: "Nibble", bits: 12 })
        ));
        assert!(matches!(
            nibble.to_bytes(),
            Err(Error::Alignment { target: "Nibble", .. })
        ));
    }

    #[test]
    fn scratch_replaces_entries() {
        let mut scratch = Scratch::new().with("length", 8);
        scratch.set("length", 28);
        scratch.set("type", 0x0800);
        assert_eq!(scratch.get("length"), Some(28));
        assert_eq!(scratch.get("type"), Some(0x0800));
        assert_eq!(scratch.get("padding"), None);
    }

    #[test]
    fn fold_span_total() {
        let span = FoldSpan {
            payload_bits: 32,
            own_bits: 160,
        };
        assert_eq!(span.total_bits(), 192);
    }
}
