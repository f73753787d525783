//! Audio data descriptor: non-blocking frame writes and receiver status reads

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

use bytes::Bytes;

use super::state::DeviceBuffer;
use crate::error::{RaopError, Result};
use crate::net::{EventHandler, Interest, Registry};

/// Offset of the buffered-frames field in a receiver status report
pub const STATUS_LEVEL_OFFSET: usize = 0x2c;

/// Size of one status read
pub const STATUS_READ_SIZE: usize = 256;

/// Socket carrying audio frames to the receiver
pub trait DataTransport: AsRawFd {
    /// Write part or all of `buf`
    ///
    /// # Errors
    ///
    /// Returns the socket error; `WouldBlock` when the socket is full.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read one status report
    ///
    /// # Errors
    ///
    /// Returns the socket error; `WouldBlock` when nothing is queued.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether an empty read means the peer went away
    fn is_connection_oriented(&self) -> bool;
}

/// The audio socket of a connected session
#[derive(Debug)]
pub enum DataSocket {
    /// Connected UDP socket (datagram mode)
    Udp(UdpSocket),
    /// TCP connection (stream mode)
    Tcp(TcpStream),
}

impl DataSocket {
    /// Close the write side where the transport has one
    pub fn shutdown(&self) {
        if let Self::Tcp(stream) = self {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                tracing::debug!("data socket shutdown: {}", e);
            }
        }
    }
}

impl AsRawFd for DataSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Udp(socket) => socket.as_raw_fd(),
            Self::Tcp(stream) => stream.as_raw_fd(),
        }
    }
}

impl DataTransport for DataSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Udp(socket) => socket.send(buf),
            Self::Tcp(stream) => stream.write(buf),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Udp(socket) => socket.recv(buf),
            Self::Tcp(stream) => stream.read(buf),
        }
    }

    fn is_connection_oriented(&self) -> bool {
        matches!(self, Self::Tcp(_))
    }
}

/// Outbound frame and how much of it has been written
#[derive(Debug, Clone)]
pub struct PendingWrite {
    frame: Bytes,
    cursor: usize,
}

impl PendingWrite {
    /// Start writing `frame`
    #[must_use]
    pub fn new(frame: Bytes) -> Self {
        Self { frame, cursor: 0 }
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> usize {
        self.cursor
    }

    /// Bytes still to write
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frame.len() - self.cursor
    }

    /// Whether the whole frame went out
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Unwritten tail
    #[must_use]
    pub fn unwritten(&self) -> &[u8] {
        &self.frame[self.cursor..]
    }

    /// Record `n` more bytes as written
    pub fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.frame.len());
    }
}

/// Reactor handler for the audio data descriptor
///
/// Writable events push the pending frame from its cursor; once the frame
/// is complete the descriptor is re-armed read-only. Readable events take
/// receiver status reports and update the buffer estimate.
pub struct DataChannel<T: DataTransport = DataSocket> {
    transport: T,
    pending: Option<PendingWrite>,
    device: DeviceBuffer,
}

impl<T: DataTransport> DataChannel<T> {
    /// Wrap a connected non-blocking transport
    pub fn new(transport: T, sample_rate: u32) -> Self {
        Self {
            transport,
            pending: None,
            device: DeviceBuffer::new(sample_rate),
        }
    }

    /// Descriptor to register with the reactor
    pub fn fd(&self) -> RawFd {
        self.transport.as_raw_fd()
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queue a frame for writing; returns its length
    ///
    /// # Errors
    ///
    /// Returns `RaopError::FrameInFlight` while the previous frame is
    /// incomplete.
    pub fn begin_write(&mut self, frame: Bytes) -> Result<usize> {
        if let Some(pending) = &self.pending {
            if !pending.is_complete() {
                return Err(RaopError::FrameInFlight {
                    remaining: pending.remaining(),
                });
            }
        }
        let len = frame.len();
        self.pending = Some(PendingWrite::new(frame));
        Ok(len)
    }

    /// Bytes of the current frame not yet written
    pub fn pending_bytes(&self) -> usize {
        self.pending.as_ref().map_or(0, PendingWrite::remaining)
    }

    /// Drop the unwritten frame
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Receiver buffer estimate
    pub fn device_buffer(&self) -> &DeviceBuffer {
        &self.device
    }

    fn on_readable(&mut self) -> Result<()> {
        let mut buf = [0u8; STATUS_READ_SIZE];
        match self.transport.recv(&mut buf) {
            Ok(0) if self.transport.is_connection_oriented() => {
                Err(RaopError::Disconnected { channel: "data" })
            }
            Ok(n) if n >= STATUS_LEVEL_OFFSET + 4 => {
                let level = u32::from_be_bytes([
                    buf[STATUS_LEVEL_OFFSET],
                    buf[STATUS_LEVEL_OFFSET + 1],
                    buf[STATUS_LEVEL_OFFSET + 2],
                    buf[STATUS_LEVEL_OFFSET + 3],
                ]);
                tracing::trace!("receiver buffer: {} frames", level);
                self.device.report(level, Instant::now());
                Ok(())
            }
            Ok(n) => {
                tracing::trace!("ignoring {} byte status read", n);
                Ok(())
            }
            Err(e) if is_transient(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn on_writable(&mut self, fd: RawFd, registry: &mut Registry) -> Result<()> {
        let Some(pending) = self.pending.as_mut() else {
            registry.reregister(fd, Interest::READ);
            return Ok(());
        };

        if !pending.is_complete() {
            match self.transport.send(pending.unwritten()) {
                Ok(0) => return Err(RaopError::Disconnected { channel: "data" }),
                Ok(n) => {
                    pending.advance(n);
                    tracing::trace!("wrote {} bytes, {} remaining", n, pending.remaining());
                }
                Err(e) if is_transient(&e) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        if pending.is_complete() {
            self.pending = None;
            registry.reregister(fd, Interest::READ);
        }
        Ok(())
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl<T: DataTransport> EventHandler for DataChannel<T> {
    fn handle_event(&mut self, fd: RawFd, ready: Interest, registry: &mut Registry) -> Result<()> {
        if ready.contains(Interest::READ) {
            self.on_readable()?;
        }
        if ready.contains(Interest::WRITE) {
            self.on_writable(fd, registry)?;
        }
        Ok(())
    }
}
