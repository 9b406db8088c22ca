// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A library for crafting, serializing and decoding network packets, including deliberately
//! malformed ones.
//!
//! A packet is built from protocols (Ethernet, ARP, IP, IPv6, TCP, UDP, ICMP, ICMPv6 and opaque
//! payloads), each of which is an ordered list of bit-width-bounded fields. Fields the caller
//! leaves unset are generated at serialization time: lengths, next-protocol identifiers and
//! checksums follow from the surrounding layers, and any of them can be overridden to produce
//! a frame a regular network stack never would.
//!
//! ```
//! use pktcraft::prelude::*;
//!
//! let packet = Packet::new()
//!     .with(Ip::new().with("dst", "192.0.2.1")?)?
//!     .with(Tcp::new().with("srcport", 123u16)?.with("dstport", "http")?.with("flags", "SYN")?)?
//!     .with(Payload::from_bytes(b"UMPA".to_vec()))?;
//!
//! let bytes = packet.serialize()?;
//! assert_eq!(bytes.len(), 44);
//!
//! let decoded = decode(&bytes, link_type::RAW)?;
//! assert_eq!(decoded.get("tcp")?.get_human("dstport")?, Some(Value::Text("http".into())));
//! # Ok::<(), pktcraft::error::Error>(())
//! ```
//!
//! Sending and capturing are left to implementations of the [`transport`] traits.

#![forbid(unsafe_code)]
#![allow(clippy::len_without_is_empty)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod fields;
pub mod layers;
pub mod packet;
pub mod prelude;
pub mod transport;

pub use pktcraft_common::Bits;
