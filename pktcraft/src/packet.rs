// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Packets: ordered stacks of protocols that serialize into a single frame.

use pktcraft_common::Bits;
use tracing::instrument;

use crate::config::PacketConfig;
use crate::error::{Error, Result};
use crate::layers::traits::{BuildContext, Protocol};
use crate::transport::Transmit;

/// An ordered stack of protocols representing one full frame.
///
/// The protocol at index `i + 1` is the payload of the protocol at index `i`. Protocols are
/// owned by the packet; the payload relation is purely positional.
///
/// In a strict packet (the default) every protocol must sit exactly one layer above the one
/// before it, and violations are rejected when the protocol is included. Non-strict packets
/// accept any layering, which is how deliberately malformed frames are crafted.
#[derive(Clone, Debug)]
pub struct Packet {
    protocols: Vec<Box<dyn Protocol>>,
    config: PacketConfig,
}

impl Packet {
    /// An empty strict packet.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(PacketConfig::default())
    }

    #[inline]
    pub fn with_config(config: PacketConfig) -> Self {
        Packet {
            protocols: Vec::new(),
            config,
        }
    }

    /// A packet holding `protocols`, included in order.
    pub fn from_protocols(
        protocols: impl IntoIterator<Item = Box<dyn Protocol>>,
        config: PacketConfig,
    ) -> Result<Self> {
        let mut packet = Self::with_config(config);
        for protocol in protocols {
            packet.include_boxed(protocol)?;
        }
        Ok(packet)
    }

    #[inline]
    pub fn config(&self) -> PacketConfig {
        self.config
    }

    /// Appends a protocol, making it the payload of the previously last protocol.
    #[inline]
    pub fn include<P: Protocol + 'static>(&mut self, protocol: P) -> Result<&mut Self> {
        self.include_boxed(Box::new(protocol))
    }

    /// Appends a protocol, builder style.
    #[inline]
    pub fn with<P: Protocol + 'static>(mut self, protocol: P) -> Result<Self> {
        self.include(protocol)?;
        Ok(self)
    }

    pub fn include_boxed(&mut self, protocol: Box<dyn Protocol>) -> Result<&mut Self> {
        if let Some(prior) = self.protocols.last() {
            let (prior, new) = (prior.layer(), protocol.layer());
            if new as i16 - prior as i16 != 1 {
                if self.config.strict {
                    return Err(Error::StructuralOrdering { prior, new });
                }
                if self.config.warn_on_reorder {
                    tracing::warn!(
                        prior,
                        new,
                        "layer {} protocol included directly after a layer {} protocol",
                        new,
                        prior
                    );
                }
            }
        }

        self.protocols.push(protocol);
        Ok(self)
    }

    /// Serializes every protocol into one frame.
    ///
    /// Protocols are folded last to first, so that lengths, discriminators and checksums can be
    /// computed from the already-serialized bits of everything they carry. Nothing is written
    /// back into the protocols; the packet can be serialized any number of times.
    #[instrument(skip_all, level = "trace")]
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let bits = self.serialize_bits()?;
        bits.to_bytes().ok_or(Error::Alignment {
            target: "Packet",
            bits: bits.len(),
        })
    }

    /// Serializes every protocol into one bit string.
    pub fn serialize_bits(&self) -> Result<Bits> {
        let siblings: Vec<&dyn Protocol> = self.protocols.iter().map(|p| p.as_ref()).collect();
        let mut raw = Bits::new();
        for index in (0..siblings.len()).rev() {
            let mut ctx = BuildContext::new(&siblings, index, raw);
            siblings[index].serialize(&mut ctx)?;
            raw = ctx.into_raw();
        }
        Ok(raw)
    }

    /// Serializes the packet and hands the bytes to `transmitter`, returning the number of bytes
    /// it accepted.
    pub fn send<T: Transmit + ?Sized>(&self, transmitter: &mut T) -> Result<usize> {
        let bytes = self.serialize()?;
        Ok(transmitter.transmit(&bytes)?)
    }

    /// The first protocol whose name matches `name`, ignoring case.
    pub fn get(&self, name: &str) -> Result<&dyn Protocol> {
        self.protocols
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::lookup("Packet", name))
    }

    /// The first protocol whose name matches `name`, ignoring case, for modification.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut dyn Protocol> {
        match self
            .protocols
            .iter_mut()
            .find(|p| p.name().eq_ignore_ascii_case(name))
        {
            Some(protocol) => Ok(protocol.as_mut()),
            None => Err(Error::lookup("Packet", name)),
        }
    }

    /// The first protocol of type `T`.
    pub fn layer<T: Protocol + 'static>(&self) -> Option<&T> {
        self.protocols
            .iter()
            .find_map(|p| p.as_any().downcast_ref::<T>())
    }

    /// The first protocol of type `T`, for modification.
    pub fn layer_mut<T: Protocol + 'static>(&mut self) -> Option<&mut T> {
        self.protocols
            .iter_mut()
            .find_map(|p| p.as_any_mut().downcast_mut::<T>())
    }

    /// The protocol carried by the protocol at `index`.
    #[inline]
    pub fn payload_of(&self, index: usize) -> Option<&dyn Protocol> {
        self.protocols.get(index + 1).map(|p| p.as_ref())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &dyn Protocol> {
        self.protocols.iter().map(|p| p.as_ref())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}

impl Default for Packet {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;
    use crate::layers::ip::{Ip, Ipv6};
    use crate::layers::l2::{Arp, Ethernet};
    use crate::layers::tcp::Tcp;
    use crate::layers::udp::Udp;
    use crate::layers::Payload;
    use crate::layers::traits::ProtocolExt;

    #[test]
    fn strict_rejects_layer_gaps() {
        let mut packet = Packet::new();
        packet.include(Ethernet::new()).unwrap();
        assert!(matches!(
            packet.include(Tcp::new()),
            Err(Error::StructuralOrdering { prior: 2, new: 4 })
        ));
        assert_eq!(packet.len(), 1);

        assert!(matches!(
            Packet::new().with(Ip::new()).unwrap().with(Ipv6::new()),
            Err(Error::StructuralOrdering { prior: 3, new: 3 })
        ));
    }

    #[test]
    fn lenient_accepts_layer_gaps() {
        let packet = Packet::with_config(PacketConfig::lenient())
            .with(Ethernet::new())
            .unwrap()
            .with(Tcp::new())
            .unwrap();
        assert_eq!(packet.len(), 2);
    }

    #[test]
    fn adjacent_layers_are_accepted() {
        let packet = Packet::new()
            .with(Ethernet::new())
            .unwrap()
            .with(Arp::new())
            .unwrap();
        let bytes = packet.serialize().unwrap();
        assert_eq!(bytes.len(), 14 + 28);
        assert_eq!(&bytes[12..14], &[0x08, 0x06]);
    }

    #[test]
    fn lookup_by_name_and_type() {
        let mut packet = Packet::new()
            .with(Ip::new())
            .unwrap()
            .with(Udp::new())
            .unwrap();

        assert_eq!(packet.get("ip").unwrap().name(), "IP");
        assert!(matches!(
            packet.get("tcp"),
            Err(Error::AttributeLookup { target: "Packet", .. })
        ));

        packet.get_mut("UDP").unwrap().set_field("srcport", Value::Int(5)).unwrap();
        packet.layer_mut::<Udp>().unwrap().set("dstport", 6u16).unwrap();
        assert_eq!(packet.layer::<Udp>().unwrap().get("srcport").unwrap(), Some(Value::Int(5)));
        assert!(packet.layer::<Tcp>().is_none());
        assert_eq!(packet.payload_of(0).unwrap().name(), "UDP");
        assert!(packet.payload_of(1).is_none());
    }

    #[test]
    fn serialization_is_repeatable() {
        let packet = Packet::new()
            .with(Ip::new())
            .unwrap()
            .with(Udp::new().with("srcport", 1u16).unwrap().with("dstport", 2u16).unwrap())
            .unwrap()
            .with(Payload::from_bytes(b"hello".to_vec()))
            .unwrap();

        let first = packet.serialize().unwrap();
        let second = packet.clone().serialize().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 20 + 8 + 5);
        assert_eq!(packet.get("IP").unwrap().get("total_length").unwrap(), None);
    }

    #[test]
    fn undefined_field_aborts_serialization() {
        let packet = Packet::new().with(Ip::new()).unwrap().with(Tcp::new()).unwrap();
        assert!(matches!(
            packet.serialize(),
            Err(Error::UndefinedValue { field: "srcport" })
        ));
    }

    #[test]
    fn send_hands_bytes_to_transmitter() {
        let packet = Packet::new().with(Ip::new()).unwrap();
        let mut sent: Vec<Vec<u8>> = Vec::new();
        assert_eq!(packet.send(&mut sent).unwrap(), 20);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], packet.serialize().unwrap());
    }
}
