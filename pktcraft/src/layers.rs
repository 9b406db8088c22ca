// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The collection of protocol layers implemented by this library.
//!
//! Most communication protocols make use of multiple encapsulated layers of data, where each
//! layer can be generalized into a header and a payload. Every header implemented here is a
//! [`Protocol`]: a fixed, ordered list of [`Field`]s plus the hooks that compute its lengths,
//! discriminators and checksums from the layers around it.
//!
//! Tightly related protocols share a module: [`Ethernet`], [`Sll`] and [`Arp`] live in [`l2`],
//! [`Ip`] and [`Ipv6`] in [`ip`], and so on. The [`traits`] module holds the traits and shared
//! routines every protocol is built from.
//!
//! [`Field`]: crate::fields::Field
//! [`Protocol`]: traits::Protocol
//! [`Ethernet`]: l2::Ethernet
//! [`Sll`]: l2::Sll
//! [`Arp`]: l2::Arp
//! [`Ip`]: ip::Ip
//! [`Ipv6`]: ip::Ipv6

pub mod icmp;
pub mod ip;
pub mod l2;
pub mod ports;
pub mod tcp;
pub mod traits;
pub mod udp;

use pktcraft_macros::Protocol;

use crate::error::Result;
use crate::fields::Field;
use crate::layers::traits::*;

/// A raw layer composed of unstructured bytes.
///
/// This type is used when inner layers cannot be interpreted by the decoder, or when payload
/// data is literally meant to be an opaque array of bytes. A [`Payload`] does not necessarily
/// hold only one protocol's worth of data: decoding never looks past the transport layer, so a
/// tunneled packet shows up as the `Payload` of its outer transport header.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "Payload", layer = 5, id = 0)]
pub struct Payload {
    data: Field,
}

impl Payload {
    #[inline]
    pub fn new() -> Self {
        Payload {
            data: Field::data("data"),
        }
    }

    /// A payload holding `data`.
    #[inline]
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Payload {
            data: Field::data_with("data", data.into()),
        }
    }

    /// The bytes held by the payload.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.bytes().unwrap_or(&[])
    }
}

impl Default for Payload {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Payload {
    fn load<'b>(&mut self, bytes: &'b [u8]) -> Result<&'b [u8]> {
        self.data.set(bytes)?;
        Ok(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;

    #[test]
    fn payload_takes_everything() {
        let mut payload = Payload::new();
        let rest = payload.load(b"UMPA").unwrap();
        assert!(rest.is_empty());
        assert_eq!(payload.data(), b"UMPA");
        assert_eq!(payload.bit_width(), 32);
        assert_eq!(payload.to_bytes().unwrap(), b"UMPA");
    }

    #[test]
    fn empty_payload_folds_to_nothing() {
        assert_eq!(Payload::new().to_bytes().unwrap(), Vec::<u8>::new());
        assert_eq!(
            Payload::from_bytes(vec![1, 2]).get("data").unwrap(),
            Some(Value::Bytes(vec![1, 2]))
        );
    }
}
