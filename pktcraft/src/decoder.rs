// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Decoding captured bytes back into packets.
//!
//! Decoding walks a [`Registry`] of protocols keyed by `(layer, protocol_id)`. Starting from
//! the capture's link type at layer 2, each recognized header is loaded from the front of the
//! buffer and its next-protocol field selects the protocol one layer up. The walk ends at the
//! first identifier nothing is registered for, at a header that does not fit the remaining
//! bytes, or at a protocol with no next-protocol field; whatever is left becomes an opaque
//! [`Payload`].

use once_cell::sync::Lazy;
use tracing::instrument;

use crate::config::PacketConfig;
use crate::error::Result;
use crate::layers::icmp::{Icmp, Icmpv6};
use crate::layers::ip::{Ip, Ipv6};
use crate::layers::l2::{Arp, Ethernet, Sll, ETH_PROTOCOL_IP, ETH_PROTOCOL_IPV6};
use crate::layers::tcp::Tcp;
use crate::layers::traits::{Protocol, ProtocolMeta};
use crate::layers::udp::Udp;
use crate::layers::Payload;
use crate::packet::Packet;
use crate::transport::Capture;

/// Link-layer header types (as assigned by tcpdump.org) that decoding can start from.
pub mod link_type {
    /// IEEE 802.3 Ethernet.
    pub const ETHERNET: u32 = 1;
    /// Raw IPv4 or IPv6, as `DLT_RAW` on most platforms.
    pub const DLT_RAW: u32 = 12;
    /// Raw IPv4 or IPv6, as `DLT_RAW` on OpenBSD.
    pub const DLT_RAW_OPENBSD: u32 = 14;
    /// Raw IPv4 or IPv6 (`LINKTYPE_RAW`).
    pub const RAW: u32 = 101;
    /// Linux "cooked" capture.
    pub const LINUX_SLL: u32 = 113;
}

const LOWEST_LAYER: u8 = 2;
const HIGHEST_LAYER: u8 = 4;

type Constructor = fn() -> Box<dyn Protocol>;

fn construct<P: Protocol + Default + 'static>() -> Box<dyn Protocol> {
    Box::new(P::default())
}

/// One protocol known to a [`Registry`].
#[derive(Clone, Copy, Debug)]
pub struct RegistryEntry {
    pub layer: u8,
    pub protocol_id: u32,
    pub name: &'static str,
    constructor: Constructor,
}

impl RegistryEntry {
    /// A new, default-valued instance of the protocol.
    #[inline]
    pub fn instantiate(&self) -> Box<dyn Protocol> {
        (self.constructor)()
    }
}

/// The protocols a [`Decoder`] can recognize, keyed by layer and protocol identifier.
///
/// Only layers 2 to 4 are dispatched on; anything above the transport layer is always decoded
/// as [`Payload`].
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    /// An empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every protocol implemented by this library.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register::<Ethernet>()
            .register::<Sll>()
            .register::<Ip>()
            .register::<Ipv6>()
            .register::<Arp>()
            .register::<Tcp>()
            .register::<Udp>()
            .register::<Icmp>()
            .register::<Icmpv6>();
        registry
    }

    /// Adds `P`, replacing any protocol already registered with the same layer and identifier.
    ///
    /// Protocols outside of layers 2 to 4 are never dispatched on and are not added.
    pub fn register<P: Protocol + ProtocolMeta + Default + 'static>(&mut self) -> &mut Self {
        if !(LOWEST_LAYER..=HIGHEST_LAYER).contains(&P::LAYER) {
            tracing::warn!(
                protocol = P::NAME,
                layer = P::LAYER,
                "only layer 2 to 4 protocols can be registered for decoding"
            );
            return self;
        }

        let entry = RegistryEntry {
            layer: P::LAYER,
            protocol_id: P::PROTOCOL_ID,
            name: P::NAME,
            constructor: construct::<P>,
        };

        match self
            .entries
            .iter_mut()
            .find(|e| e.layer == entry.layer && e.protocol_id == entry.protocol_id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// The protocol registered for `protocol_id` at `layer`.
    #[inline]
    pub fn entry(&self, layer: u8, protocol_id: u32) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.layer == layer && e.protocol_id == protocol_id)
    }

    /// A new instance of the protocol registered for `protocol_id` at `layer`.
    #[inline]
    pub fn lookup(&self, layer: u8, protocol_id: u32) -> Option<Box<dyn Protocol>> {
        self.entry(layer, protocol_id).map(RegistryEntry::instantiate)
    }

    /// A new instance of the protocol named `name`, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<Box<dyn Protocol>> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(RegistryEntry::instantiate)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }
}

static BUILTIN_REGISTRY: Lazy<Registry> = Lazy::new(Registry::builtin);

/// The process-wide registry of built-in protocols.
#[inline]
pub fn builtin_registry() -> &'static Registry {
    &BUILTIN_REGISTRY
}

/// Reconstructs packets from captured bytes.
#[derive(Clone, Copy, Debug)]
pub struct Decoder<'r> {
    registry: &'r Registry,
}

impl<'r> Decoder<'r> {
    #[inline]
    pub fn new(registry: &'r Registry) -> Self {
        Decoder { registry }
    }

    #[inline]
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Decodes a frame captured on a link of type `link_type`.
    ///
    /// The returned packet is permissive, so odd layering in captured traffic is never
    /// rejected. Decoding itself never fails on unrecognized or truncated data; that data ends
    /// up in a trailing [`Payload`].
    #[instrument(skip_all, level = "trace", fields(len = bytes.len(), link_type = link_type))]
    pub fn decode(&self, bytes: &[u8], link_type: u32) -> Result<Packet> {
        match link_type {
            link_type::RAW | link_type::DLT_RAW | link_type::DLT_RAW_OPENBSD => {
                let version = match bytes.first().map(|b| b >> 4) {
                    Some(4) => Some(ETH_PROTOCOL_IP as u32),
                    Some(6) => Some(ETH_PROTOCOL_IPV6 as u32),
                    _ => None,
                };
                self.walk(bytes, 3, version)
            }
            other => self.walk(bytes, LOWEST_LAYER, Some(other)),
        }
    }

    /// Decodes bytes starting with the header of the protocol registered for `protocol_id` at
    /// `layer`.
    #[inline]
    pub fn decode_at(&self, bytes: &[u8], layer: u8, protocol_id: u32) -> Result<Packet> {
        self.walk(bytes, layer, Some(protocol_id))
    }

    /// Decodes the next frame of `capture`, or returns `None` once it is exhausted.
    pub fn decode_capture<C: Capture + ?Sized>(&self, capture: &mut C) -> Result<Option<Packet>> {
        match capture.next_frame()? {
            Some(frame) => Ok(Some(self.decode(&frame.data, frame.link_type)?)),
            None => Ok(None),
        }
    }

    fn walk(&self, bytes: &[u8], mut layer: u8, mut next: Option<u32>) -> Result<Packet> {
        let mut packet = Packet::with_config(PacketConfig::permissive());
        let mut rest = bytes;

        while let Some(protocol_id) = next.take() {
            if rest.is_empty() {
                break;
            }

            let mut protocol = match self.registry.lookup(layer, protocol_id) {
                Some(protocol) => protocol,
                None => {
                    tracing::debug!(layer, protocol_id, "no protocol registered, stopping");
                    break;
                }
            };

            match protocol.load(rest) {
                Ok(tail) => rest = tail,
                Err(e) => {
                    tracing::debug!(
                        protocol = protocol.name(),
                        error = %e,
                        "header did not decode, stopping"
                    );
                    break;
                }
            }

            tracing::debug!(protocol = protocol.name(), layer, "decoded header");
            next = protocol
                .payload_field()
                .and_then(|name| protocol.field(name))
                .and_then(|field| field.int_value())
                .map(|id| id as u32);
            packet.include_boxed(protocol)?;
            layer += 1;
        }

        if !rest.is_empty() {
            packet.include(Payload::from_bytes(rest))?;
        }
        Ok(packet)
    }
}

impl Default for Decoder<'static> {
    #[inline]
    fn default() -> Self {
        Decoder::new(builtin_registry())
    }
}

/// Decodes a frame captured on a link of type `link_type` using the built-in protocols.
#[inline]
pub fn decode(bytes: &[u8], link_type: u32) -> Result<Packet> {
    Decoder::default().decode(bytes, link_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;
    use crate::layers::traits::ProtocolExt;
    use crate::transport::Frame;
    use hex_literal::hex;
    use std::collections::VecDeque;

    #[test]
    fn builtin_registry_contents() {
        let registry = builtin_registry();
        assert_eq!(registry.iter().count(), 9);
        assert_eq!(registry.entry(3, 0x0800).unwrap().name, "IP");
        assert_eq!(registry.entry(4, 58).unwrap().name, "ICMPv6");
        assert_eq!(registry.by_name("arp").unwrap().layer(), 3);
        assert!(registry.lookup(5, 0).is_none());
    }

    #[test]
    fn payload_cannot_be_registered() {
        let mut registry = Registry::new();
        registry.register::<Payload>();
        assert_eq!(registry.iter().count(), 0);
    }

    #[test]
    fn unknown_link_type_is_all_payload() {
        let packet = decode(&[1, 2, 3], 9999).unwrap();
        assert_eq!(packet.len(), 1);
        assert_eq!(packet.layer::<Payload>().unwrap().data(), &[1, 2, 3]);
    }

    #[test]
    fn unknown_ethertype_stops_at_layer_two() {
        let bytes = hex!("ffffffffffff 020000000001 88b5 cafe");
        let packet = decode(&bytes, link_type::ETHERNET).unwrap();
        assert_eq!(packet.len(), 2);
        assert_eq!(
            packet.get("ethernet").unwrap().get_human("type").unwrap(),
            Some(Value::Text("Experimental".into()))
        );
        assert_eq!(packet.layer::<Payload>().unwrap().data(), &[0xca, 0xfe]);
    }

    #[test]
    fn truncated_header_becomes_payload() {
        let bytes = hex!("ffffffffffff 020000000001 0800 4500");
        let packet = decode(&bytes, link_type::ETHERNET).unwrap();
        assert_eq!(packet.len(), 2);
        assert!(packet.layer::<Ip>().is_none());
        assert_eq!(packet.layer::<Payload>().unwrap().data(), &[0x45, 0x00]);
    }

    #[test]
    fn raw_link_dispatches_on_version() {
        let udp = Udp::new().with("srcport", 53u16).unwrap().with("dstport", 53u16).unwrap();
        let bytes = Packet::new()
            .with(Ipv6::new())
            .unwrap()
            .with(udp)
            .unwrap()
            .serialize()
            .unwrap();

        let packet = decode(&bytes, link_type::RAW).unwrap();
        assert_eq!(packet.len(), 2);
        assert!(packet.layer::<Ipv6>().is_some());
        assert_eq!(
            packet.layer::<Udp>().unwrap().get("length").unwrap(),
            Some(Value::Int(8))
        );
        assert_eq!(packet.serialize().unwrap(), bytes);
    }

    #[test]
    fn sll_capture_is_decoded() {
        let mut ip = Ip::new();
        ip.set("ttl", 1u8).unwrap();
        let icmp = Icmp::new();
        let packet = Packet::new()
            .with(Sll::new())
            .unwrap()
            .with(ip)
            .unwrap()
            .with(icmp)
            .unwrap();
        let bytes = packet.serialize().unwrap();

        let mut capture: VecDeque<Frame> = VecDeque::new();
        capture.push_back(Frame::new(link_type::LINUX_SLL, bytes.clone()));
        let decoder = Decoder::default();

        let decoded = decoder.decode_capture(&mut capture).unwrap().unwrap();
        let names: Vec<_> = decoded.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["SLL", "IP", "ICMP"]);
        assert_eq!(decoded.serialize().unwrap(), bytes);
        assert!(decoder.decode_capture(&mut capture).unwrap().is_none());
    }
}
