// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

/// A packet crafting result.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while building, serializing or decoding packets.
///
/// Validation, lookup and ordering errors are raised at the point of mutation; alignment and
/// undefined-value errors abort the whole serialization that hit them.
#[derive(Error, Debug)]
pub enum Error {
    /// A field rejected a value assigned to it.
    #[error("invalid value `{value}` for field `{field}`")]
    Validation { field: &'static str, value: String },

    /// A field with no stored value and no way of generating one was serialized.
    #[error("field `{field}` has no value and cannot generate one")]
    UndefinedValue { field: &'static str },

    /// A protocol was included out of layer order in a strict packet.
    #[error("layer {new} protocol cannot directly follow a layer {prior} protocol in a strict packet")]
    StructuralOrdering { prior: u8, new: u8 },

    /// A field, flag or protocol was looked up by a name that does not exist on the target.
    #[error("{target} has no attribute `{name}`")]
    AttributeLookup { target: &'static str, name: String },

    /// A typed accessor was used on a field of another kind.
    #[error("field `{field}` is not a {expected} field")]
    FieldKind {
        field: &'static str,
        expected: &'static str,
    },

    /// A positional name/value sequence had an odd number of items.
    #[error("expected alternating name/value pairs, found {0} items")]
    UnpairedArgument(usize),

    /// A serialized protocol or packet was not a whole number of bytes.
    #[error("{target} serialized to {bits} bits, which is not a multiple of 8")]
    Alignment { target: &'static str, bits: usize },

    /// A buffer was too short for the fixed header of a protocol being decoded.
    #[error("insufficient bytes for {protocol} header: needed {needed}, found {available}")]
    InsufficientBytes {
        protocol: &'static str,
        needed: usize,
        available: usize,
    },

    /// An error reported by an external transmit or capture collaborator.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[inline]
    pub(crate) fn validation(field: &'static str, value: impl ToString) -> Self {
        Error::Validation {
            field,
            value: value.to_string(),
        }
    }

    #[inline]
    pub(crate) fn lookup(target: &'static str, name: &str) -> Self {
        Error::AttributeLookup {
            target,
            name: name.to_string(),
        }
    }
}
