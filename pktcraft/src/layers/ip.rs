// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The Internet Protocol, versions 4 and 6, and the pseudo-headers transport checksums are
//! computed over.

use bitflags::bitflags;

use pktcraft_common::Bits;
use pktcraft_macros::Protocol;

use crate::config::{DEFAULT_HOP_LIMIT, DEFAULT_TTL};
use crate::error::{Error, Result};
use crate::fields::{AddressLayout, Aliases, Field, Value};
use crate::layers::l2::next_protocol;
use crate::layers::traits::*;

const IPV4_FIXED_HEADER_LEN: usize = 20;

/// IP protocol (and IPv6 next-header) numbers.
pub const IP_PROTOCOLS: Aliases = &[
    ("HOPOPT", 0),
    ("ICMP", 1),
    ("IGMP", 2),
    ("GGP", 3),
    ("IPIP", 4),
    ("ST", 5),
    ("TCP", 6),
    ("EGP", 8),
    ("IGP", 9),
    ("UDP", 17),
    ("DCCP", 33),
    ("IPv6", 41),
    ("IPv6-Route", 43),
    ("IPv6-Frag", 44),
    ("RSVP", 46),
    ("GRE", 47),
    ("ESP", 50),
    ("AH", 51),
    ("IPv6-ICMP", 58),
    ("IPv6-NoNxt", 59),
    ("IPv6-Opts", 60),
    ("EIGRP", 88),
    ("OSPF", 89),
    ("PIM", 103),
    ("VRRP", 112),
    ("L2TP", 115),
    ("SCTP", 132),
    ("UDPLite", 136),
    ("MPLS-in-IP", 137),
    ("Reserved", 255),
];

bitflags! {
    /// Flags available in an IPv4 packet.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ipv4Flags: u8 {
        const RESERVED = 0b_100;
        const DF = 0b_010;
        const MF = 0b_001;
    }
}

impl From<Ipv4Flags> for Value {
    #[inline]
    fn from(value: Ipv4Flags) -> Self {
        Value::Int(value.bits() as u64)
    }
}

/// An IPv4 (Internet Protocol version 4) packet.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |Version|  IHL  |      ToS      |          Total Length         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |         Identification        |Flags|     Fragment Offset     |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |      TTL      |    Protocol   |        Header Checksum        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |                         Source Address                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |                      Destination Address                      |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 Z                       Options + Padding                       Z
///    Z                                                               Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// IHL, total length and protocol are generated from the options and the carried payload, and
/// the header checksum is computed over the finished header. Any of them may be set explicitly
/// to craft a malformed packet; an explicitly stored nonzero checksum is left as is.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "IP", layer = 3, id = 0x0800, payload_field = "protocol")]
pub struct Ip {
    version: Field,
    ihl: Field,
    tos: Field,
    total_length: Field,
    id: Field,
    flags: Field,
    fragment_offset: Field,
    ttl: Field,
    protocol: Field,
    header_checksum: Field,
    src: Field,
    dst: Field,
    options: Field,
    padding: Field,
}

impl Ip {
    pub fn new() -> Self {
        Ip {
            version: Field::int("version", 4).auto(4),
            ihl: Field::special("ihl", 4),
            tos: Field::int("tos", 8).auto(0),
            total_length: Field::special("total_length", 16),
            id: Field::int("id", 16).auto(0),
            flags: Field::flags("flags", &["RESERVED", "DF", "MF"]),
            fragment_offset: Field::int("fragment_offset", 13).auto(0),
            ttl: Field::int("ttl", 8).auto(*DEFAULT_TTL as u64),
            protocol: Field::special("protocol", 8).aliases(IP_PROTOCOLS),
            header_checksum: Field::checksum("header_checksum", 16),
            src: Field::address("src", AddressLayout::IPV4).auto_pieces(&[127, 0, 0, 1]),
            dst: Field::address("dst", AddressLayout::IPV4).auto_pieces(&[127, 0, 0, 1]),
            options: Field::data("options"),
            padding: Field::padding("padding", 32),
        }
    }
}

impl Default for Ip {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Ip {
    fn before_fold(&self, ctx: &BuildContext<'_>) -> Result<Scratch> {
        let mut scratch = Scratch::new().with("padding", self.options.width() as u64);
        let header_bits = self.bit_width_with(&scratch);

        scratch.set("ihl", (header_bits / 32) as u64);
        scratch.set("total_length", ((header_bits + ctx.raw().len()) / 8) as u64);
        scratch.set("protocol", next_protocol(ctx));
        Ok(scratch)
    }

    fn after_fold(&self, ctx: &mut BuildContext<'_>, span: FoldSpan, scratch: &Scratch) -> Result<()> {
        inject_checksum(
            self,
            ctx,
            span,
            scratch,
            "header_checksum",
            ChecksumScope::Header,
            None,
        )
    }

    fn load<'b>(&mut self, bytes: &'b [u8]) -> Result<&'b [u8]> {
        let rest = load_fields(self, bytes)?;
        let header_len = self.ihl.int_value().unwrap_or(5) as usize * 4;
        let options_len = header_len.saturating_sub(IPV4_FIXED_HEADER_LEN);
        if options_len == 0 {
            return Ok(rest);
        }

        if rest.len() < options_len {
            return Err(Error::InsufficientBytes {
                protocol: "IP",
                needed: header_len,
                available: bytes.len(),
            });
        }
        self.options.set(&rest[..options_len])?;
        Ok(&rest[options_len..])
    }
}

/// An IPv6 (Internet Protocol version 6) packet, without extension headers.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |Version| Traffic Class |              Flow Label               |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |         Payload Length        |  Next Header  |   Hop Limit   |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 Z                         Source Address                        Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 24 Z                      Destination Address                      Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "IPv6", layer = 3, id = 0x86DD, payload_field = "next_header")]
pub struct Ipv6 {
    version: Field,
    traffic_class: Field,
    flow_label: Field,
    payload_length: Field,
    next_header: Field,
    hop_limit: Field,
    src: Field,
    dst: Field,
}

impl Ipv6 {
    pub fn new() -> Self {
        Ipv6 {
            version: Field::int("version", 4).auto(6),
            traffic_class: Field::int("traffic_class", 8).auto(0),
            flow_label: Field::int("flow_label", 20).auto(0),
            payload_length: Field::special("payload_length", 16),
            // TCP when nothing is carried
            next_header: Field::special("next_header", 8)
                .aliases(IP_PROTOCOLS)
                .auto(6),
            hop_limit: Field::int("hop_limit", 8).auto(*DEFAULT_HOP_LIMIT as u64),
            src: Field::address("src", AddressLayout::IPV6).auto_pieces(&[0, 0, 0, 0, 0, 0, 0, 1]),
            dst: Field::address("dst", AddressLayout::IPV6).auto_pieces(&[0, 0, 0, 0, 0, 0, 0, 1]),
        }
    }
}

impl Default for Ipv6 {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Ipv6 {
    fn before_fold(&self, ctx: &BuildContext<'_>) -> Result<Scratch> {
        let mut scratch = Scratch::new().with("payload_length", (ctx.raw().len() / 8) as u64);
        if let Some(payload) = ctx.payload() {
            scratch.set("next_header", payload.protocol_id() as u64);
        }
        Ok(scratch)
    }
}

// =============================================================================
//                              Pseudo-Headers
// =============================================================================

/// The IPv4 pseudo-header of RFC 793 / RFC 768.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "IPv4 pseudo-header", layer = 3, id = 0)]
struct Ipv4Pseudo {
    src: Field,
    dst: Field,
    reserved: Field,
    protocol: Field,
    length: Field,
}

impl Protocol for Ipv4Pseudo {}

/// The IPv6 pseudo-header of RFC 8200 section 8.1.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "IPv6 pseudo-header", layer = 3, id = 0)]
struct Ipv6Pseudo {
    src: Field,
    dst: Field,
    length: Field,
    reserved: Field,
    next_header: Field,
}

impl Protocol for Ipv6Pseudo {}

/// Which network protocols a transport protocol takes its pseudo-header addresses from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PseudoSource {
    /// The nearest preceding IPv4 or IPv6 header; IPv4 loopback if there is none.
    AnyIp,
    /// The nearest preceding IPv6 header; the unspecified address if there is none.
    Ipv6Only,
}

/// Builds the pseudo-header a transport checksum is computed over, taking addresses from the
/// nearest preceding network header.
///
/// Packets without a network header still get a checksum, computed over fallback addresses.
pub(crate) fn pseudo_header(
    ctx: &BuildContext<'_>,
    source: PseudoSource,
    next_header: u8,
    length: usize,
) -> Result<Bits> {
    for protocol in ctx.preceding() {
        if let Some(ip) = protocol.as_any().downcast_ref::<Ip>() {
            if source == PseudoSource::AnyIp {
                return ipv4_pseudo(Some((&ip.src, &ip.dst)), next_header, length);
            }
        } else if let Some(ip) = protocol.as_any().downcast_ref::<Ipv6>() {
            return ipv6_pseudo(Some((&ip.src, &ip.dst)), next_header, length);
        }
    }

    tracing::trace!(?source, "no network header found, using fallback pseudo-header");
    match source {
        PseudoSource::AnyIp => ipv4_pseudo(None, next_header, length),
        PseudoSource::Ipv6Only => ipv6_pseudo(None, next_header, length),
    }
}

fn ipv4_pseudo(addrs: Option<(&Field, &Field)>, protocol: u8, length: usize) -> Result<Bits> {
    let mut pseudo = Ipv4Pseudo {
        src: Field::address("src", AddressLayout::IPV4).auto_pieces(&[127, 0, 0, 1]),
        dst: Field::address("dst", AddressLayout::IPV4).auto_pieces(&[127, 0, 0, 1]),
        reserved: Field::int("reserved", 8).auto(0),
        protocol: Field::int("protocol", 8),
        length: Field::int("length", 16),
    };

    if let Some((src, dst)) = addrs {
        pseudo.src.load_raw(&src.fillout(None)?)?;
        pseudo.dst.load_raw(&dst.fillout(None)?)?;
    }
    pseudo.protocol.load_raw(&Bits::from_u64(protocol as u64, 8))?;
    pseudo.length.load_raw(&Bits::from_u64(length as u64, 16))?;
    pseudo.to_bits()
}

fn ipv6_pseudo(addrs: Option<(&Field, &Field)>, next_header: u8, length: usize) -> Result<Bits> {
    let mut pseudo = Ipv6Pseudo {
        src: Field::address("src", AddressLayout::IPV6).auto_pieces(&[0; 8]),
        dst: Field::address("dst", AddressLayout::IPV6).auto_pieces(&[0; 8]),
        length: Field::int("length", 32),
        reserved: Field::int("reserved", 24).auto(0),
        next_header: Field::int("next_header", 8),
    };

    if let Some((src, dst)) = addrs {
        pseudo.src.load_raw(&src.fillout(None)?)?;
        pseudo.dst.load_raw(&dst.fillout(None)?)?;
    }
    pseudo.length.load_raw(&Bits::from_u64(length as u64, 32))?;
    pseudo.next_header.load_raw(&Bits::from_u64(next_header as u64, 8))?;
    pseudo.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Payload;
    use hex_literal::hex;
    use pktcraft_common::checksum::internet_checksum;

    #[test]
    fn ip_fixed_checksum() {
        let ip = Ip::new()
            .with("src", "127.0.0.1")
            .unwrap()
            .with("dst", "127.0.0.1")
            .unwrap()
            .with("id", 1000u16)
            .unwrap()
            .with("header_checksum", 0x7900u16)
            .unwrap();

        let mut expected = hex!("4500 0014 03e8 0000 0000 7900 7f000001 7f000001");
        expected[8] = *DEFAULT_TTL;
        assert_eq!(ip.to_bytes().unwrap(), expected);
        assert_eq!(ip.get("total_length").unwrap(), None);
    }

    #[test]
    fn ip_generated_checksum_verifies() {
        let bytes = Ip::new().with("ttl", 7u8).unwrap().to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(internet_checksum(&bytes), 0);
    }

    #[test]
    fn ip_options_are_padded() {
        let ip = Ip::new().with("options", &[0x01u8, 0x01, 0x01]).unwrap();
        assert_eq!(ip.bit_width(), 192);
        let bytes = ip.to_bytes().unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes[0], 0x46);
        assert_eq!(&bytes[20..], &[0x01, 0x01, 0x01, 0x00]);
        assert_eq!(internet_checksum(&bytes), 0);
    }

    #[test]
    fn ip_flags() {
        let mut ip = Ip::new();
        ip.set("flags", Ipv4Flags::DF).unwrap();
        assert_eq!(ip.get_flags("flags", &["df", "mf"]).unwrap(), vec![true, false]);
        ip.set_flags("flags", &[("MF", true), ("DF", false)]).unwrap();
        assert_eq!(ip.to_bytes().unwrap()[6], 0x20);
        assert!(matches!(
            ip.set_flags("ttl", &[("DF", true)]),
            Err(Error::FieldKind { .. })
        ));
    }

    #[test]
    fn ip_load_with_options() {
        let mut original = Ip::new().with("options", &[0x94u8, 0x04, 0x00, 0x00]).unwrap();
        original.set("id", 0xbeefu16).unwrap();
        let mut bytes = original.to_bytes().unwrap();
        bytes.extend_from_slice(b"tail");

        let mut decoded = Ip::new();
        let rest = decoded.load(&bytes).unwrap();
        assert_eq!(rest, b"tail");
        assert_eq!(decoded.get("ihl").unwrap(), Some(Value::Int(6)));
        assert_eq!(decoded.get("options").unwrap(), Some(Value::Bytes(vec![0x94, 0x04, 0, 0])));
        assert_eq!(decoded.to_bytes().unwrap(), &bytes[..24]);
    }

    #[test]
    fn ip_load_short_buffer() {
        assert!(matches!(
            Ip::new().load(&[0x45, 0x00, 0x00]),
            Err(Error::InsufficientBytes { protocol: "IP", .. })
        ));
    }

    #[test]
    fn ipv6_lengths_follow_payload() {
        let ip = Ipv6::new();
        let payload = Payload::from_bytes(b"abc".to_vec());
        let siblings: [&dyn Protocol; 2] = [&ip, &payload];

        let mut ctx = BuildContext::new(&siblings, 1, Bits::new());
        payload.serialize(&mut ctx).unwrap();
        let mut ctx = BuildContext::new(&siblings, 0, ctx.into_raw());
        ip.serialize(&mut ctx).unwrap();
        let bytes = ctx.into_raw().to_bytes().unwrap();

        assert_eq!(bytes.len(), 43);
        assert_eq!(&bytes[4..6], &[0x00, 0x03]);
        assert_eq!(bytes[6], 0);
    }

    #[test]
    fn ipv6_decodes_distinct_addresses() {
        let original = Ipv6::new()
            .with("src", "fe80::1")
            .unwrap()
            .with("dst", "2001:db8::2")
            .unwrap();
        let bytes = original.to_bytes().unwrap();
        assert_eq!(bytes[6], 6);

        let mut decoded = Ipv6::new();
        decoded.load(&bytes).unwrap();
        assert_eq!(decoded.get("src").unwrap(), Some(Value::Text("fe80:0:0:0:0:0:0:1".into())));
        assert_eq!(decoded.get("dst").unwrap(), Some(Value::Text("2001:db8:0:0:0:0:0:2".into())));
    }

    #[test]
    fn pseudo_header_fallbacks() {
        let siblings: [&dyn Protocol; 0] = [];
        let ctx = BuildContext::new(&siblings, 0, Bits::new());

        let v4 = pseudo_header(&ctx, PseudoSource::AnyIp, 17, 8).unwrap();
        assert_eq!(v4.to_bytes().unwrap(), hex!("7f000001 7f000001 00 11 0008"));

        let v6 = pseudo_header(&ctx, PseudoSource::Ipv6Only, 58, 8).unwrap();
        let mut expected = [0u8; 40];
        expected[35] = 8;
        expected[39] = 58;
        assert_eq!(v6.to_bytes().unwrap(), expected);
    }
}
