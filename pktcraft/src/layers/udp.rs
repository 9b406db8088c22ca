// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The User Datagram Protocol.

use pktcraft_macros::Protocol;

use crate::error::Result;
use crate::fields::Field;
use crate::layers::ip::{pseudo_header, PseudoSource};
use crate::layers::ports::WELL_KNOWN_PORTS;
use crate::layers::traits::*;

const UDP_PROTOCOL_ID: u8 = 17;

/// A UDP (User Datagram Protocol) datagram.
///
/// ## Packet Layout
/// ```txt
///    .    Octet 0    .    Octet 1    .    Octet 2    .    Octet 3    .
///    |0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|0 1 2 3 4 5 6 7|
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  0 |          Source Port          |        Destination Port       |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  4 |             Length            |            Checksum           |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Debug, Protocol)]
#[protocol(name = "UDP", layer = 4, id = 17)]
pub struct Udp {
    srcport: Field,
    dstport: Field,
    length: Field,
    checksum: Field,
}

impl Udp {
    pub fn new() -> Self {
        Udp {
            srcport: Field::enumerated("srcport", 16, WELL_KNOWN_PORTS),
            dstport: Field::enumerated("dstport", 16, WELL_KNOWN_PORTS),
            length: Field::special("length", 16),
            checksum: Field::checksum("checksum", 16),
        }
    }
}

impl Default for Udp {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for Udp {
    fn before_fold(&self, ctx: &BuildContext<'_>) -> Result<Scratch> {
        let length = (self.bit_width() + ctx.raw().len()) / 8;
        Ok(Scratch::new().with("length", length as u64))
    }

    fn after_fold(&self, ctx: &mut BuildContext<'_>, span: FoldSpan, scratch: &Scratch) -> Result<()> {
        let pseudo = pseudo_header(
            ctx,
            PseudoSource::AnyIp,
            UDP_PROTOCOL_ID,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Value;
    use hex_literal::hex;

    #[test]
    fn length_and_checksum_are_generated() {
        let udp = Udp::new()
            .with("srcport", "domain")
            .unwrap()
            .with("dstport", 33000u16)
            .unwrap();

        let bytes = udp.to_bytes().unwrap();
        assert_eq!(&bytes[..6], &hex!("0035 80e8 0008")[..]);
        assert_eq!(udp.get("length").unwrap(), None);
        assert_eq!(udp.get("checksum").unwrap(), None);
    }

    #[test]
    fn explicit_checksum_is_kept() {
        let udp = Udp::new()
            .with("srcport", 1u16)
            .unwrap()
            .with("dstport", 2u16)
            .unwrap()
            .with("checksum", 0xabcdu16)
            .unwrap()
            .with("length", 99u16)
            .unwrap();

        assert_eq!(udp.to_bytes().unwrap(), hex!("0001 0002 0063 abcd"));
        assert_eq!(udp.get("length").unwrap(), Some(Value::Int(99)));
    }
}
