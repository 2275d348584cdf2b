// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    can::{Frame, Transport},
    error::Error,
    protocol::{matches, Command, NodeId},
};
use log::trace;
use std::time::{Duration, Instant};

/// Waits for the first frame carrying `command` from `node`.
///
/// Each receive is bounded by `slice` (or the remaining budget, whichever is
/// shorter) so the caller regains control regularly. Frames for other ids are
/// dropped, not buffered. Fails with [`Error::Timeout`] once `timeout` has
/// elapsed, even while unrelated traffic keeps arriving.
pub fn wait_for<T: Transport + ?Sized>(
    transport: &mut T,
    node: NodeId,
    command: Command,
    timeout: Duration,
    slice: Duration,
) -> Result<Frame, Error> {
    let deadline = Instant::now() + timeout;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout { command, timeout });
        }

        match transport.receive(slice.min(deadline - now))? {
            Some(frame) if matches(&frame, node, command) => return Ok(frame),
            Some(frame) => trace!("discarding {:?} while waiting for {:?}", frame, command),
            None => {}
        }
    }
}
