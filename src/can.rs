// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::Error;
use std::{fmt, time::Duration};

/// Largest payload carried by a classic CAN data frame.
pub const MAX_DATA_LEN: usize = 8;

/// Raw CAN data frame as seen by the diagnostic client.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Arbitration identifier (11-bit standard or 29-bit extended)
    pub id: u32,
    /// Whether `id` is a 29-bit extended identifier
    pub extended: bool,
    data: [u8; MAX_DATA_LEN],
    len: usize,
}

impl Frame {
    /// Builds a frame, rejecting payloads longer than eight bytes.
    pub fn new(id: u32, extended: bool, data: &[u8]) -> Result<Frame, Error> {
        if data.len() > MAX_DATA_LEN {
            return Err(Error::InvalidFrame(format!(
                "payload of {} bytes exceeds {}",
                data.len(),
                MAX_DATA_LEN
            )));
        }

        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);

        Ok(Frame {
            id,
            extended,
            data: buf,
            len: data.len(),
        })
    }

    /// Builds a full-width frame.
    pub fn from_bytes(id: u32, extended: bool, data: [u8; MAX_DATA_LEN]) -> Frame {
        Frame {
            id,
            extended,
            data,
            len: MAX_DATA_LEN,
        }
    }

    /// Payload bytes actually carried by the frame.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ID=0x{:03X} Data={:02X?}", self.id, self.data())
    }
}

/// Blocking CAN bus capability consumed by the client.
///
/// Implementations own the underlying socket and release it when dropped.
pub trait Transport {
    /// Queue a frame for transmission.
    fn send(&mut self, frame: &Frame) -> Result<(), Error>;

    /// Wait at most `timeout` for the next frame, returning `None` when the
    /// bus stayed quiet.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        (**self).send(frame)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, Error> {
        (**self).receive(timeout)
    }
}

#[cfg(feature = "can")]
pub use self::socket::SocketCanTransport;

#[cfg(feature = "can")]
mod socket {
    use super::{Frame, Transport};
    use crate::error::Error;
    use log::{debug, trace, warn};
    use socketcan::{
        CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id as CanId, Socket, StandardId,
    };
    use std::{
        io,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    /// SocketCAN adapter for Linux CAN interfaces.
    ///
    /// The interface must already be configured and up. Raising the shared
    /// `interrupted` flag makes the next receive fail with
    /// [`Error::Interrupted`].
    pub struct SocketCanTransport {
        device: String,
        sock: CanSocket,
        interrupted: Arc<AtomicBool>,
    }

    impl SocketCanTransport {
        /// Opens the named CAN interface, e.g. `can0`.
        pub fn open(device: &str, interrupted: Arc<AtomicBool>) -> Result<Self, Error> {
            debug!("opening can interface {}", device);
            let sock = CanSocket::open(device)?;
            Ok(SocketCanTransport {
                device: device.to_string(),
                sock,
                interrupted,
            })
        }

        fn check_interrupted(&self) -> Result<(), Error> {
            match self.interrupted.load(Ordering::Relaxed) {
                true => Err(Error::Interrupted),
                false => Ok(()),
            }
        }
    }

    impl Transport for SocketCanTransport {
        fn send(&mut self, frame: &Frame) -> Result<(), Error> {
            self.check_interrupted()?;

            let id: CanId = if frame.extended {
                ExtendedId::new(frame.id)
                    .ok_or_else(|| Error::InvalidFrame(format!("bad extended id {}", frame.id)))?
                    .into()
            } else {
                u16::try_from(frame.id)
                    .ok()
                    .and_then(StandardId::new)
                    .ok_or_else(|| Error::InvalidFrame(format!("bad standard id {}", frame.id)))?
                    .into()
            };

            let can_frame = CanFrame::new(id, frame.data())
                .ok_or_else(|| Error::InvalidFrame(format!("{:?}", frame)))?;
            self.sock.write_frame(&can_frame)?;
            Ok(())
        }

        fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, Error> {
            self.check_interrupted()?;

            match self.sock.read_frame_timeout(timeout) {
                Ok(CanFrame::Data(frame)) => {
                    let (id, extended) = match frame.id() {
                        CanId::Standard(id) => (id.as_raw() as u32, false),
                        CanId::Extended(id) => (id.as_raw(), true),
                    };
                    Frame::new(id, extended, frame.data()).map(Some)
                }
                Ok(CanFrame::Remote(frame)) => {
                    trace!("ignoring remote frame: {:?}", frame);
                    Ok(None)
                }
                Ok(CanFrame::Error(frame)) => {
                    warn!("bus error frame: {:?}", frame);
                    Ok(None)
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    Ok(None)
                }
                Err(err) => Err(Error::Io(err)),
            }
        }
    }

    impl Drop for SocketCanTransport {
        fn drop(&mut self) {
            debug!("closing can interface {}", self.device);
        }
    }
}
