// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Interfaces to the sockets and capture devices packets are sent through and read from.
//!
//! This library performs no I/O of its own. A [`Transmit`] implementation receives fully
//! serialized frames, and a [`Capture`] implementation yields captured frames tagged with their
//! link type for the [`Decoder`](crate::decoder::Decoder). The in-memory implementations here
//! make it possible to exercise both paths without a network.

use std::collections::VecDeque;
use std::io;

/// A captured frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// The link type of the capture the frame came from (see [`crate::decoder::link_type`]).
    pub link_type: u32,
    pub data: Vec<u8>,
}

impl Frame {
    #[inline]
    pub fn new(link_type: u32, data: impl Into<Vec<u8>>) -> Self {
        Frame {
            link_type,
            data: data.into(),
        }
    }
}

/// Something serialized frames can be sent through.
pub trait Transmit {
    /// Sends one frame, returning the number of bytes sent.
    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize>;
}

/// A source of captured frames.
pub trait Capture {
    /// The next captured frame, or `None` once the capture is exhausted.
    fn next_frame(&mut self) -> io::Result<Option<Frame>>;
}

/// Records every transmitted frame.
impl Transmit for Vec<Vec<u8>> {
    #[inline]
    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.push(frame.to_vec());
        Ok(frame.len())
    }
}

/// Replays queued frames in order.
impl Capture for VecDeque<Frame> {
    #[inline]
    fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        Ok(self.pop_front())
    }
}

impl<T: Transmit + ?Sized> Transmit for &mut T {
    #[inline]
    fn transmit(&mut self, frame: &[u8]) -> io::Result<usize> {
        (**self).transmit(frame)
    }
}

impl<C: Capture + ?Sized> Capture for &mut C {
    #[inline]
    fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        (**self).next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_log_records_frames() {
        let mut log: Vec<Vec<u8>> = Vec::new();
        assert_eq!(log.transmit(&[1, 2, 3]).unwrap(), 3);
        assert_eq!(log, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn capture_queue_drains_in_order() {
        let mut queue: VecDeque<Frame> = [Frame::new(1, vec![0xaa]), Frame::new(101, vec![0x45])]
            .into_iter()
            .collect();
        assert_eq!(queue.next_frame().unwrap().unwrap().link_type, 1);
        assert_eq!(queue.next_frame().unwrap().unwrap().link_type, 101);
        assert!(queue.next_frame().unwrap().is_none());
    }
}
