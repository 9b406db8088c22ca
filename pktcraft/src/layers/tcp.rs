// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The Transmission Control Protocol.

use bitflags::bitflags;

use pktcraft_macros::Protocol;

use crate::error::{Error, Result};
use crate::fields::{Field, Value};
use crate::layers::ip::{pseudo_header, PseudoSource};
use crate::layers::ports::WELL_KNOWN_PORTS;
use crate::layers::traits::*;

const TCP_FIXED_HEADER_LEN: usize = 20;
const TCP_PROTOCOL_ID: u8 = 6;

bitflags! {
    /// Control bits available in a TCP segment, in header order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const CWR = 0b_1000_0000;
        const ECE = 0b_0100_0000;
        const URG = 0b_0010_0000;
        const ACK = 0b_0001_0000;
        const PSH = 0b_0000_1000;
        const RST = 0b_0000_0100;
        const SYN = 0b_0000_0010;
        const FIN = 0b_0000_0001;
    }
}

impl TcpFlags {
    #[inline]
    pub fn new() -> Self {
        TcpFlags::default()
    }
}

impl From<u8> for TcpFlags {
    #[inline]
    fn from(value: u8) -> Self {
        TcpFlags::from_bits_truncate(value)
    }
}

impl From<TcpFlags> for Value {
    #[inline]
    fn from(value: TcpFlags) -> Self {
        Value::Int(value.bits() as u64)
    }
}

/// A TCP (Transmission Control Protocol) segment.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |          Source Port          |        Destination Port       |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |                        Sequence Number                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  8 |                     Acknowledgement Number                    |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 12 | Offset|  Res  |C|E|U|A|P|R|S|F|          Window Size          |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 16 |            Checksum           |         Urgent Pointer        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// 20 Z                       Options + Padding                       Z
///    Z                                                               Z
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The checksum is computed over the IPv4 or IPv6 pseudo-header of the nearest preceding
/// network header, the segment header and its payload.
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "TCP", layer = 4, id = 6)]
pub struct Tcp {
    srcport: Field,
    dstport: Field,
    seq: Field,
    ack: Field,
    data_offset: Field,
    reserved: Field,
    flags: Field,
    window: Field,
    checksum: Field,
    urgent_pointer: Field,
    options: Field,
    padding: Field,
}

impl Tcp {
    pub fn new() -> Self {
        Tcp {
            srcport: Field::enumerated("srcport", 16, WELL_KNOWN_PORTS),
            dstport: Field::enumerated("dstport", 16, WELL_KNOWN_PORTS),
            seq: Field::int("seq", 32).auto(0),
            ack: Field::int("ack", 32).auto(0),
            data_offset: Field::special("data_offset", 4),
            reserved: Field::int("reserved", 4).auto(0),
            flags: Field::flags(
                "flags",
                &["CWR", "ECE", "URG", "ACK", "PSH", "RST", "SYN", "FIN"],
            ),
            window: Field::int("window", 16).auto(512),
            checksum: Field::checksum("checksum", 16),
            urgent_pointer: Field::int("urgent_pointer", 16).auto(0),
            options: Field::data("options"),
            padding: Field::padding("padding", 32),
        }
    }
}

impl Default for Tcp {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Tcp {
    fn before_fold(&self, _ctx: &BuildContext<'_>) -> Result<Scratch> {
        let mut scratch = Scratch::new().with("padding", self.options.width() as u64);
        let header_bits = self.bit_width_with(&scratch);
        scratch.set("data_offset", (header_bits / 32) as u64);
        Ok(scratch)
    }

    fn after_fold(&self, ctx: &mut BuildContext<'_>, span: FoldSpan, scratch: &Scratch) -> Result<()> {
        let pseudo = pseudo_header(
            ctx,
            PseudoSource::AnyIp,
            TCP_PROTOCOL_ID,
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

    fn load<'b>(&mut self, bytes: &'b [u8]) -> Result<&'b [u8]> {
        let rest = load_fields(self, bytes)?;
        let header_len = self.data_offset.int_value().unwrap_or(5) as usize * 4;
        let options_len = header_len.saturating_sub(TCP_FIXED_HEADER_LEN);
        if options_len == 0 {
            return Ok(rest);
        }

        if rest.len() < options_len {
            return Err(Error::InsufficientBytes {
                protocol: "TCP",
                needed: header_len,
                available: bytes.len(),
            });
        }
        self.options.set(&rest[..options_len])?;
        Ok(&rest[options_len..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn ports_accept_service_names() {
        let mut tcp = Tcp::new();
        tcp.set("dstport", "https").unwrap();
        assert_eq!(tcp.get("dstport").unwrap(), Some(Value::Int(443)));
        assert_eq!(tcp.get_human("dstport").unwrap(), Some(Value::Text("https".into())));
        assert!(tcp.set("dstport", 70000u32).is_err());
    }

    #[test]
    fn ports_are_required() {
        assert!(matches!(
            Tcp::new().to_bytes(),
            Err(Error::UndefinedValue { field: "srcport" })
        ));
    }

    #[test]
    fn standalone_segment_layout() {
        let tcp = Tcp::new()
            .with("srcport", 123u16)
            .unwrap()
            .with("dstport", 321u16)
            .unwrap()
            .with("flags", TcpFlags::SYN | TcpFlags::ACK)
            .unwrap();

        let bytes = tcp.to_bytes().unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[..4], &hex!("007b 0141")[..]);
        assert_eq!(bytes[12], 0x50);
        assert_eq!(bytes[13], 0x12);
        assert_eq!(&bytes[14..16], &hex!("0200")[..]);
        assert_ne!(&bytes[16..18], &[0, 0][..]);
    }

    #[test]
    fn flags_by_name() {
        let mut tcp = Tcp::new();
        tcp.set("flags", "PSH").unwrap();
        tcp.set_flags("flags", &[("ack", true)]).unwrap();
        assert_eq!(
            tcp.get_human("flags").unwrap(),
            Some(Value::Names(vec!["ACK".into(), "PSH".into()]))
        );
        assert_eq!(TcpFlags::from(0x18), TcpFlags::ACK | TcpFlags::PSH);
        assert!(matches!(
            tcp.set_flags("flags", &[("ack", false), ("bogus", true)]),
            Err(Error::Validation { .. })
        ));
        assert_eq!(tcp.get_flags("flags", &["ACK"]).unwrap(), vec![true]);
    }

    #[test]
    fn data_offset_counts_options() {
        let tcp = Tcp::new()
            .with("srcport", 1u16)
            .unwrap()
            .with("dstport", 2u16)
            .unwrap()
            .with("options", &hex!("020405b4 0101"))
            .unwrap();

        let bytes = tcp.to_bytes().unwrap();
        assert_eq!(bytes.len(), 28);
        assert_eq!(bytes[12] >> 4, 7);

        let mut decoded = Tcp::new();
        assert!(decoded.load(&bytes).unwrap().is_empty());
        assert_eq!(
            decoded.get("options").unwrap(),
            Some(Value::Bytes(hex!("020405b4 0101 0000").to_vec()))
        );
    }
}
