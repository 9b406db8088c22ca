// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The Internet Control Message Protocol, versions 4 and 6.
//!
//! The layout of an ICMP message past its first four bytes depends on its type. Both
//! protocols declare the union of every type-specific field and keep exactly those that apply
//! to the current type active: assigning `type` (or loading it from bytes) re-evaluates the
//! activation table. Inactive fields keep their values but take no part in serialization,
//! offsets or decoding.

use pktcraft_macros::Protocol;

use crate::error::Result;
use crate::fields::{AddressLayout, Aliases, Field};
use crate::layers::ip::{pseudo_header, PseudoSource};
use crate::layers::traits::*;

const ICMPV6_PROTOCOL_ID: u8 = 58;

/// ICMP message type names.
pub const ICMP_TYPES: Aliases = &[
    ("echo-reply", 0),
    ("dest-unreach", 3),
    ("source-quench", 4),
    ("redirect", 5),
    ("echo-request", 8),
    ("router-advertisement", 9),
    ("router-solicitation", 10),
    ("time-exceeded", 11),
    ("parameter-problem", 12),
    ("timestamp-request", 13),
    ("timestamp-reply", 14),
    ("information-request", 15),
    ("information-response", 16),
    ("address-mask-request", 17),
    ("address-mask-reply", 18),
];

/// ICMPv6 message type names.
pub const ICMPV6_TYPES: Aliases = &[
    ("dest-unreach", 1),
    ("packet-too-big", 2),
    ("time-exceeded", 3),
    ("parameter-problem", 4),
    ("echo-request", 128),
    ("echo-reply", 129),
    ("mld-query", 130),
    ("mld-report", 131),
    ("mld-done", 132),
    ("router-solicitation", 133),
    ("router-advertisement", 134),
    ("neighbor-solicitation", 135),
    ("neighbor-advertisement", 136),
    ("redirect", 137),
];

const ICMP_OPTIONAL_FIELDS: &[&str] = &[
    "identifier",
    "sequence",
    "unused",
    "pointer",
    "reserved",
    "gateway",
    "originate",
    "receive",
    "transmit",
    "address_mask",
];

const ICMPV6_OPTIONAL_FIELDS: &[&str] = &[
    "identifier",
    "sequence",
    "unused",
    "mtu",
    "pointer",
    "hop_limit",
    "router_flags",
    "router_lifetime",
    "reachable_time",
    "retrans_timer",
    "reserved",
    "neighbor_flags",
    "na_reserved",
    "target_address",
    "destination_address",
];

/// The type-specific fields an ICMP message of type `icmp_type` carries.
pub fn icmp_active_fields(icmp_type: u64) -> &'static [&'static str] {
    match icmp_type {
        0 | 8 | 15 | 16 => &["identifier", "sequence"],
        13 | 14 => &["identifier", "sequence", "originate", "receive", "transmit"],
        17 | 18 => &["identifier", "sequence", "address_mask"],
        5 => &["gateway"],
        12 => &["pointer", "reserved"],
        _ => &["unused"],
    }
}

/// The type-specific fields an ICMPv6 message of type `icmpv6_type` carries.
pub fn icmpv6_active_fields(icmpv6_type: u64) -> &'static [&'static str] {
    match icmpv6_type {
        128 | 129 => &["identifier", "sequence"],
        2 => &["mtu"],
        4 => &["pointer"],
        134 => &[
            "hop_limit",
            "router_flags",
            "router_lifetime",
            "reachable_time",
            "retrans_timer",
        ],
        135 => &["reserved", "target_address"],
        136 => &["neighbor_flags", "na_reserved", "target_address"],
        137 => &["reserved", "target_address", "destination_address"],
        _ => &["unused"],
    }
}

fn apply_activation<P: Protocol + ?Sized>(
    protocol: &mut P,
    optional: &[&str],
    active: &[&str],
) {
    for name in optional {
        if let Some(field) = protocol.field_mut(name) {
            field.set_active(active.contains(name));
        }
    }
}

/// An ICMP (Internet Control Message Protocol) message.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |      Type     |      Code     |            Checksum           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 Z                     Type-Specific Fields                      Z
///    Z                                                               Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Defaults to an echo request. The checksum covers the message and its payload.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "ICMP", layer = 4, id = 1)]
pub struct Icmp {
    #[field(name = "type")]
    icmp_type: Field,
    code: Field,
    checksum: Field,
    identifier: Field,
    sequence: Field,
    unused: Field,
    pointer: Field,
    reserved: Field,
    gateway: Field,
    originate: Field,
    receive: Field,
    transmit: Field,
    address_mask: Field,
}

impl Icmp {
    pub fn new() -> Self {
        let mut icmp = Icmp {
            icmp_type: Field::enumerated("type", 8, ICMP_TYPES).auto(8),
            code: Field::int("code", 8).auto(0),
            checksum: Field::checksum("checksum", 16),
            identifier: Field::int("identifier", 16).auto(0),
            sequence: Field::int("sequence", 16).auto(0),
            unused: Field::int("unused", 32).auto(0),
            pointer: Field::int("pointer", 8).auto(0),
            reserved: Field::int("reserved", 24).auto(0),
            gateway: Field::address("gateway", AddressLayout::IPV4).auto_pieces(&[0; 4]),
            originate: Field::int("originate", 32).auto(0),
            receive: Field::int("receive", 32).auto(0),
            transmit: Field::int("transmit", 32).auto(0),
            address_mask: Field::address("address_mask", AddressLayout::IPV4)
                .auto_pieces(&[0; 4]),
        };
        icmp.field_changed("type");
        icmp
    }
}

impl Default for Icmp {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Icmp {
    fn after_fold(&self, ctx: &mut BuildContext<'_>, span: FoldSpan, scratch: &Scratch) -> Result<()> {
        inject_checksum(
            self,
            ctx,
            span,
            scratch,
            "checksum",
            ChecksumScope::HeaderAndPayload,
            None,
        )
    }

    fn field_changed(&mut self, name: &str) {
        if name == "type" {
            let active = icmp_active_fields(self.icmp_type.current_int().unwrap_or(8));
            apply_activation(self, ICMP_OPTIONAL_FIELDS, active);
        }
    }
}

/// An ICMPv6 (Internet Control Message Protocol for IPv6) message, including the Neighbor
/// Discovery messages of RFC 4861 (without their options).
///
/// Defaults to an echo request. The checksum covers the IPv6 pseudo-header of the nearest
/// preceding IPv6 header (the unspecified address is used for both ends when there is none),
/// the message and its payload.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "ICMPv6", layer = 4, id = 58)]
pub struct Icmpv6 {
    #[field(name = "type")]
    icmp_type: Field,
    code: Field,
    checksum: Field,
    identifier: Field,
    sequence: Field,
    unused: Field,
    mtu: Field,
    pointer: Field,
    hop_limit: Field,
    router_flags: Field,
    router_lifetime: Field,
    reachable_time: Field,
    retrans_timer: Field,
    reserved: Field,
    neighbor_flags: Field,
    na_reserved: Field,
    target_address: Field,
    destination_address: Field,
}

impl Icmpv6 {
    pub fn new() -> Self {
        let mut icmp = Icmpv6 {
            icmp_type: Field::enumerated("type", 8, ICMPV6_TYPES).auto(128),
            code: Field::int("code", 8).auto(0),
            checksum: Field::checksum("checksum", 16),
            identifier: Field::int("identifier", 16).auto(0),
            sequence: Field::int("sequence", 16).auto(0),
            unused: Field::int("unused", 32).auto(0),
            mtu: Field::int("mtu", 32).auto(1280),
            pointer: Field::int("pointer", 32).auto(0),
            hop_limit: Field::int("hop_limit", 8).auto(0),
            router_flags: Field::int("router_flags", 8).auto(0),
            router_lifetime: Field::int("router_lifetime", 16).auto(0),
            reachable_time: Field::int("reachable_time", 32).auto(0),
            retrans_timer: Field::int("retrans_timer", 32).auto(0),
            reserved: Field::int("reserved", 32).auto(0),
            neighbor_flags: Field::flags("neighbor_flags", &["router", "solicited", "override"]),
            na_reserved: Field::int("na_reserved", 29).auto(0),
            target_address: Field::address("target_address", AddressLayout::IPV6)
                .auto_pieces(&[0; 8]),
            destination_address: Field::address("destination_address", AddressLayout::IPV6)
                .auto_pieces(&[0; 8]),
        };
        icmp.field_changed("type");
        icmp
    }
}

impl Default for Icmpv6 {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Icmpv6 {
    fn after_fold(&self, ctx: &mut BuildContext<'_>, span: FoldSpan, scratch: &Scratch) -> Result<()> {
        let pseudo = pseudo_header(
            ctx,
            PseudoSource::Ipv6Only,
            ICMPV6_PROTOCOL_ID,
            span.total_bits() / 8,
        )?;
        inject_checksum(
            self,
            ctx,
            span,
            scratch,
            "checksum",
            ChecksumScope::HeaderAndPayload,
            Some(pseudo),
        )
    }

    fn field_changed(&mut self, name: &str) {
        if name == "type" {
            let active = icmpv6_active_fields(self.icmp_type.current_int().unwrap_or(128));
            apply_activation(self, ICMPV6_OPTIONAL_FIELDS, active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;
    use hex_literal::hex;
    use pktcraft_common::checksum::internet_checksum;
    use test_case::test_case;

    #[test]
    fn echo_request_by_default() {
        let icmp = Icmp::new().with("identifier", 0x1234u16).unwrap();
        let bytes = icmp.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[0], 8);
        assert_eq!(&bytes[4..], &hex!("1234 0000")[..]);
        assert_eq!(internet_checksum(&bytes), 0);
    }

    #[test_case("echo-reply", 8; "echo")]
    #[test_case("timestamp-request", 20; "timestamp")]
    #[test_case("address-mask-reply", 12; "address mask")]
    #[test_case("redirect", 8; "redirect")]
    #[test_case("parameter-problem", 8; "parameter problem")]
    #[test_case("dest-unreach", 8; "unused")]
    fn icmp_layout_follows_type(icmp_type: &str, bytes: usize) {
        let icmp = Icmp::new().with("type", icmp_type).unwrap();
        assert_eq!(icmp.bit_width(), bytes * 8);
        assert_eq!(icmp.to_bytes().unwrap().len(), bytes);
    }

    #[test]
    fn icmp_redirect_gateway() {
        let icmp = Icmp::new()
            .with("type", 5u8)
            .unwrap()
            .with("gateway", "10.0.0.1")
            .unwrap();
        assert!(!icmp.get_field("identifier").unwrap().is_active());
        assert_eq!(icmp.get_offset("gateway".into()).unwrap(), 32);
        assert_eq!(&icmp.to_bytes().unwrap()[4..], &[10, 0, 0, 1]);
    }

    #[test_case(128, 8; "echo request")]
    #[test_case(2, 8; "packet too big")]
    #[test_case(134, 16; "router advertisement")]
    #[test_case(135, 24; "neighbor solicitation")]
    #[test_case(136, 24; "neighbor advertisement")]
    #[test_case(137, 40; "redirect")]
    #[test_case(200, 8; "unknown")]
    fn icmpv6_layout_follows_type(icmp_type: u8, bytes: usize) {
        let icmp = Icmpv6::new().with("type", icmp_type).unwrap();
        assert_eq!(icmp.to_bytes().unwrap().len(), bytes);
    }

    #[test]
    fn icmpv6_activation_switches() {
        let mut icmp = Icmpv6::new();
        assert!(icmp.get_field("sequence").unwrap().is_active());

        icmp.set("type", "neighbor-advertisement").unwrap();
        for name in ["identifier", "sequence", "unused", "mtu", "reserved"] {
            assert!(!icmp.get_field(name).unwrap().is_active(), "{}", name);
        }
        for name in ["neighbor_flags", "na_reserved", "target_address"] {
            assert!(icmp.get_field(name).unwrap().is_active(), "{}", name);
        }

        icmp.set_flags("neighbor_flags", &[("solicited", true), ("override", true)]).unwrap();
        icmp.set("target_address", "fe80::1").unwrap();
        let bytes = icmp.to_bytes().unwrap();
        assert_eq!(bytes[4], 0b0110_0000);
        assert_eq!(&bytes[8..10], &[0xfe, 0x80]);
    }

    #[test]
    fn set_fields_keeps_activation_in_either_order() {
        let type_first = vec![("type", Value::from("packet-too-big")), ("mtu", Value::Int(1500))];
        let mtu_first = vec![("mtu", Value::Int(1500)), ("type", Value::from("packet-too-big"))];

        for pairs in [type_first, mtu_first] {
            let mut icmp = Icmpv6::new();
            icmp.set_fields(pairs).unwrap();
            assert!(icmp.get_field("mtu").unwrap().is_active());
            assert!(!icmp.get_field("identifier").unwrap().is_active());

            let bytes = icmp.to_bytes().unwrap();
            assert_eq!(bytes.len(), 8);
            assert_eq!(bytes[0], 2);
            assert_eq!(&bytes[4..], &1500u32.to_be_bytes()[..]);
        }
    }

    #[test]
    fn set_fields_seq_activates_type_fields() {
        let mut icmp = Icmp::new();
        icmp.set_fields_seq(vec![
            "type".into(),
            "redirect".into(),
            "gateway".into(),
            "192.0.2.1".into(),
        ])
        .unwrap();

        let bytes = icmp.to_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[4..], &hex!("c0000201")[..]);
    }

    #[test]
    fn icmpv6_load_activates_by_type() {
        let mut original = Icmpv6::new();
        original.set("type", 135u8).unwrap();
        original.set("target_address", "fe80::abcd").unwrap();
        let bytes = original.to_bytes().unwrap();

        let mut decoded = Icmpv6::new();
        assert!(decoded.load(&bytes).unwrap().is_empty());
        assert_eq!(decoded.get_human("type").unwrap(), Some(Value::Text("neighbor-solicitation".into())));
        assert!(!decoded.get_field("identifier").unwrap().is_active());
        assert_eq!(
            decoded.get("target_address").unwrap(),
            Some(Value::Text("fe80:0:0:0:0:0:0:abcd".into()))
        );
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }
}
