// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::protocol::Command;
use std::{fmt, io, time::Duration};

/// Motor controller diagnostic error types.
#[derive(Debug)]
pub enum Error {
    /// I/O error from underlying socket operations
    Io(io::Error),
    /// The run was interrupted while waiting on the bus
    Interrupted,
    /// Frame could not be built for the bus (bad identifier or length)
    InvalidFrame(String),
    /// Node identifier does not fit the 6-bit node field
    InvalidNodeId(u8),
    /// Command identifier is not part of the catalogue
    UnknownCommand(u8),
    /// No frame for the command arrived before the deadline
    Timeout {
        /// Command whose response was awaited
        command: Command,
        /// Time budget that elapsed
        timeout: Duration,
    },
    /// A matching frame carried fewer bytes than its layout requires
    MalformedPayload {
        /// Command whose response failed to decode
        command: Command,
        /// Bytes required by the payload layout
        expected: usize,
        /// Bytes present in the frame
        actual: usize,
    },
}

impl Error {
    /// Bus-level failures which abort whatever operation was running.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Interrupted | Error::InvalidFrame(_)
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Interrupted => write!(f, "interrupted"),
            Error::InvalidFrame(err) => write!(f, "invalid frame: {}", err),
            Error::InvalidNodeId(id) => write!(f, "invalid node id: {} (expected 0..=63)", id),
            Error::UnknownCommand(id) => write!(f, "unknown command id: 0x{:03X}", id),
            Error::Timeout { command, timeout } => {
                write!(f, "no {:?} response within {:?}", command, timeout)
            }
            Error::MalformedPayload {
                command,
                expected,
                actual,
            } => write!(
                f,
                "malformed {:?} payload: expected {} bytes but got {}",
                command, expected, actual
            ),
        }
    }
}
