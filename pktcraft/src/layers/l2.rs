// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Ethernet and associated link-layer protocols.

use pktcraft_macros::Protocol;

use crate::error::Result;
use crate::fields::{AddressLayout, Aliases, Field};
use crate::layers::traits::*;

pub const ETH_PROTOCOL_IP: u16 = 0x0800;
pub const ETH_PROTOCOL_ARP: u16 = 0x0806;
pub const ETH_PROTOCOL_IPV6: u16 = 0x86DD;

/// EtherType names.
pub const ETHER_TYPES: Aliases = &[
    ("IPv4", 0x0800),
    ("ARP", 0x0806),
    ("WoL", 0x0842),
    ("RARP", 0x8035),
    ("AppleTalk", 0x809B),
    ("AARP", 0x80F3),
    ("VLAN", 0x8100),
    ("IPX", 0x8137),
    ("IPv6", 0x86DD),
    ("EthernetFlowControl", 0x8808),
    ("MPLS", 0x8847),
    ("MPLS-multicast", 0x8848),
    ("PPPoE-discovery", 0x8863),
    ("PPPoE-session", 0x8864),
    ("EAPoL", 0x888E),
    ("QinQ", 0x88A8),
    ("Experimental", 0x88B5),
    ("LLDP", 0x88CC),
    ("MACsec", 0x88E5),
    ("PTP", 0x88F7),
];

/// ARP hardware type names.
pub const ARP_HARDWARE_TYPES: Aliases = &[
    ("Ethernet", 1),
    ("ExperimentalEthernet", 2),
    ("AX.25", 3),
    ("ProNET", 4),
    ("Chaos", 5),
    ("IEEE802", 6),
    ("ARCNET", 7),
    ("FrameRelay", 15),
    ("ATM", 16),
    ("HDLC", 17),
    ("FibreChannel", 18),
    ("SerialLine", 20),
    ("IEEE1394", 24),
    ("InfiniBand", 32),
];

/// ARP operation names.
pub const ARP_OPCODES: Aliases = &[
    ("request", 1),
    ("reply", 2),
    ("rarp-request", 3),
    ("rarp-reply", 4),
    ("drarp-request", 5),
    ("drarp-reply", 6),
    ("drarp-error", 7),
    ("inarp-request", 8),
    ("inarp-reply", 9),
];

/// Linux cooked-capture packet type names.
pub const SLL_PACKET_TYPES: Aliases = &[
    ("host", 0),
    ("broadcast", 1),
    ("multicast", 2),
    ("otherhost", 3),
    ("outgoing", 4),
];

/// A basic 802.3 Ethernet frame.
///
/// An 802.3 Ethernet frame consists of destination and source MAC addresses, an EtherType and a
/// payload. `Ethernet` does not include any 802.1Q VLAN tags within the header or a frame check
/// sequence at the end of the payload.
///
/// The EtherType is generated from the protocol carried as payload (0 if there is none) unless
/// set explicitly.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "Ethernet", layer = 2, id = 1, payload_field = "type")]
pub struct Ethernet {
    dst: Field,
    src: Field,
    #[field(name = "type")]
    ether_type: Field,
}

impl Ethernet {
    pub fn new() -> Self {
        Ethernet {
            dst: Field::address("dst", AddressLayout::MAC).auto_pieces(&[0xff; 6]),
            src: Field::address("src", AddressLayout::MAC).auto_pieces(&[0; 6]),
            ether_type: Field::special("type", 16).aliases(ETHER_TYPES),
        }
    }
}

impl Default for Ethernet {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Ethernet {
    fn before_fold(&self, ctx: &BuildContext<'_>) -> Result<Scratch> {
        Ok(Scratch::new().with("type", next_protocol(ctx)))
    }
}

/// A Linux "cooked" capture header (`DLT_LINUX_SLL`).
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |          Packet Type          |         ARPHRD Type           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |    Link-Layer Address Length  |                               |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
///  8 |                   Link-Layer Address (8 bytes)                |
///    +                               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 |                               |         Protocol Type         |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "SLL", layer = 2, id = 113, payload_field = "protocol")]
pub struct Sll {
    packet_type: Field,
    arphrd_type: Field,
    addr_len: Field,
    addr: Field,
    protocol: Field,
}

impl Sll {
    pub fn new() -> Self {
        Sll {
            packet_type: Field::enumerated("packet_type", 16, SLL_PACKET_TYPES).auto(0),
            arphrd_type: Field::enumerated("arphrd_type", 16, ARP_HARDWARE_TYPES).auto(1),
            addr_len: Field::int("addr_len", 16).auto(6),
            addr: Field::int("addr", 64).auto(0),
            protocol: Field::special("protocol", 16).aliases(ETHER_TYPES),
        }
    }
}

impl Default for Sll {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Sll {
    fn before_fold(&self, ctx: &BuildContext<'_>) -> Result<Scratch> {
        Ok(Scratch::new().with("protocol", next_protocol(ctx)))
    }
}

/// An Address Resolution Protocol message.
///
/// The hardware and protocol address sizes are generated from the hardware and protocol types.
/// Addresses are fixed to the Ethernet/IPv4 layout.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "ARP", layer = 3, id = 0x0806)]
pub struct Arp {
    hardware_type: Field,
    protocol_type: Field,
    hw_size: Field,
    proto_size: Field,
    opcode: Field,
    src_hw: Field,
    src_ip: Field,
    dst_hw: Field,
    dst_ip: Field,
}

impl Arp {
    pub fn new() -> Self {
        Arp {
            hardware_type: Field::enumerated("hardware_type", 16, ARP_HARDWARE_TYPES).auto(1),
            protocol_type: Field::enumerated("protocol_type", 16, ETHER_TYPES)
                .auto(ETH_PROTOCOL_IP as u64),
            hw_size: Field::special("hw_size", 8),
            proto_size: Field::special("proto_size", 8),
            opcode: Field::enumerated("opcode", 16, ARP_OPCODES).auto(1),
            src_hw: Field::address("src_hw", AddressLayout::MAC).auto_pieces(&[0; 6]),
            src_ip: Field::address("src_ip", AddressLayout::IPV4).auto_pieces(&[0; 4]),
            dst_hw: Field::address("dst_hw", AddressLayout::MAC).auto_pieces(&[0; 6]),
            dst_ip: Field::address("dst_ip", AddressLayout::IPV4).auto_pieces(&[0; 4]),
        }
    }
}

impl Default for Arp {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Arp {
    fn before_fold(&self, _ctx: &BuildContext<'_>) -> Result<Scratch> {
        let hw_size = match self.hardware_type.current_int() {
            Some(1) => 6,
            _ => self.src_hw.width() as u64 / 8,
        };
        let proto_size = match self.protocol_type.current_int().map(|t| t as u16) {
            Some(ETH_PROTOCOL_IP) => 4,
            Some(ETH_PROTOCOL_IPV6) => 16,
            _ => self.src_ip.width() as u64 / 8,
        };

        Ok(Scratch::new()
            .with("hw_size", hw_size)
            .with("proto_size", proto_size))
    }
}

/// The identifier of the protocol carried by the one being serialized, or 0 if it carries
/// nothing.
#[inline]
pub(crate) fn next_protocol(ctx: &BuildContext<'_>) -> u64 {
    ctx.payload().map_or(0, |p| p.protocol_id() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;
    use hex_literal::hex;

    #[test]
    fn ethernet_defaults() {
        let eth = Ethernet::new();
        assert_eq!(
            eth.to_bytes().unwrap(),
            hex!("ffffffffffff 000000000000 0000")
        );
    }

    #[test]
    fn ethernet_type_alias() {
        let mut eth = Ethernet::new()
            .with("src", "de:ad:be:ef:00:01")
            .unwrap();
        eth.set("type", "IPv6").unwrap();
        assert_eq!(eth.get("type").unwrap(), Some(Value::Int(0x86DD)));
        assert_eq!(eth.get_human("type").unwrap(), Some(Value::Text("IPv6".into())));
        assert_eq!(&eth.to_bytes().unwrap()[6..], &hex!("deadbeef0001 86dd")[..]);
    }

    #[test]
    fn arp_sizes_follow_types() {
        let arp = Arp::new();
        let bytes = arp.to_bytes().unwrap();
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[..8], &hex!("0001 0800 06 04 0001")[..]);

        let mut arp = Arp::new();
        arp.set("protocol_type", ETH_PROTOCOL_IPV6).unwrap();
        assert_eq!(arp.to_bytes().unwrap()[5], 16);
    }

    #[test]
    fn sll_round_trip() {
        let bytes = hex!("0004 0001 0006 0242ac1100020000 0800");
        let mut sll = Sll::new();
        let rest = sll.load(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(sll.get_human("packet_type").unwrap(), Some(Value::Text("outgoing".into())));
        assert_eq!(sll.get("protocol").unwrap(), Some(Value::Int(0x0800)));
        assert_eq!(sll.to_bytes().unwrap(), bytes);
    }
}
