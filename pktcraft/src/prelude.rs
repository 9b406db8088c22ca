// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

pub use crate::config::{PacketConfig, DEFAULT_HOP_LIMIT, DEFAULT_TTL};
pub use crate::decoder::{decode, link_type, Decoder, Registry};
pub use crate::error::Error;
pub use crate::fields::{AddressLayout, Field, Value};
pub use crate::layers::icmp::{Icmp, Icmpv6};
pub use crate::layers::ip::{Ip, Ipv4Flags, Ipv6};
pub use crate::layers::l2::{Arp, Ethernet, Sll};
pub use crate::layers::tcp::{Tcp, TcpFlags};
pub use crate::layers::traits::{FieldRef, Protocol, ProtocolExt, ProtocolFields};
pub use crate::layers::udp::Udp;
pub use crate::layers::Payload;
pub use crate::packet::Packet;
pub use crate::transport::{Capture, Frame, Transmit};
