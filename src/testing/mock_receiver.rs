//! Loopback sockets standing in for a RAOP receiver

#![allow(clippy::missing_errors_doc)]

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::time::Duration;

use crate::client::{STATUS_LEVEL_OFFSET, STATUS_READ_SIZE};
use crate::protocol::raop::RaopTransport;
use crate::protocol::rtp::{
    NtpTimestamp, StreamFrameHeader, SyncPacket, TimingRequest, TimingResponse,
};
use crate::protocol::rtsp::SetupResponse;
use crate::types::{JackStatus, TransportMode};

/// Receiver-side data, control and timing endpoints on 127.0.0.1
pub struct MockReceiver {
    data: UdpSocket,
    control: UdpSocket,
    timing: UdpSocket,
    listener: TcpListener,
    stream: Option<TcpStream>,
    client_data: Option<SocketAddr>,
    client_timing: Option<SocketAddr>,
    jack: JackStatus,
    timeout: Duration,
}

impl MockReceiver {
    /// Bind every endpoint on ephemeral loopback ports
    pub fn bind() -> io::Result<Self> {
        let timeout = Duration::from_secs(2);
        let data = UdpSocket::bind("127.0.0.1:0")?;
        let control = UdpSocket::bind("127.0.0.1:0")?;
        let timing = UdpSocket::bind("127.0.0.1:0")?;
        for socket in [&data, &control, &timing] {
            socket.set_read_timeout(Some(timeout))?;
        }
        Ok(Self {
            data,
            control,
            timing,
            listener: TcpListener::bind("127.0.0.1:0")?,
            stream: None,
            client_data: None,
            client_timing: None,
            jack: JackStatus::default(),
            timeout,
        })
    }

    /// Report `jack` in SETUP replies
    #[must_use]
    pub fn with_jack(mut self, jack: JackStatus) -> Self {
        self.jack = jack;
        self
    }

    /// SETUP reply naming this receiver's ports for `mode`
    pub fn setup_response(&self, mode: TransportMode) -> io::Result<SetupResponse> {
        let server_port = match mode {
            TransportMode::Datagram => self.data.local_addr()?.port(),
            TransportMode::Stream => self.listener.local_addr()?.port(),
        };
        Ok(SetupResponse {
            transport: RaopTransport {
                server_port,
                control_port: self.control.local_addr()?.port(),
                timing_port: self.timing.local_addr()?.port(),
            },
            jack: self.jack,
        })
    }

    /// Next audio datagram
    pub fn recv_audio(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 65536];
        let (n, from) = self.data.recv_from(&mut buf)?;
        self.client_data = Some(from);
        buf.truncate(n);
        Ok(buf)
    }

    /// Accept the stream-mode data connection
    pub fn accept_stream(&mut self) -> io::Result<()> {
        let (stream, from) = self.listener.accept()?;
        stream.set_read_timeout(Some(self.timeout))?;
        self.client_data = Some(from);
        self.stream = Some(stream);
        Ok(())
    }

    /// Next stream-mode frame, preamble included
    pub fn read_stream_frame(&mut self) -> io::Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(not_accepted)?;
        let mut frame = vec![0u8; StreamFrameHeader::SIZE];
        stream.read_exact(&mut frame)?;
        let len = StreamFrameHeader::decode_payload_len(&frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        frame.resize(StreamFrameHeader::SIZE + len, 0);
        stream.read_exact(&mut frame[StreamFrameHeader::SIZE..])?;
        Ok(frame)
    }

    /// Close the stream-mode data connection
    pub fn drop_stream(&mut self) {
        self.stream = None;
    }

    /// Report `frames` buffered on the data channel
    pub fn send_status(&mut self, frames: u32) -> io::Result<()> {
        let mut report = [0u8; STATUS_READ_SIZE];
        report[STATUS_LEVEL_OFFSET..STATUS_LEVEL_OFFSET + 4].copy_from_slice(&frames.to_be_bytes());
        match (self.stream.as_mut(), self.client_data) {
            (Some(stream), _) => stream.write_all(&report),
            (None, Some(addr)) => self.data.send_to(&report, addr).map(drop),
            (None, None) => Err(not_accepted()),
        }
    }

    /// Next sync frame on the control port
    pub fn recv_sync(&self) -> io::Result<SyncPacket> {
        let mut buf = [0u8; 64];
        let n = self.control.recv(&mut buf)?;
        SyncPacket::decode(&buf[..n]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Raw bytes of the next datagram on the timing port
    pub fn recv_timing(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = [0u8; 64];
        let (n, from) = self.timing.recv_from(&mut buf)?;
        self.client_timing = Some(from);
        Ok(buf[..n].to_vec())
    }

    /// Send a timing request and wait for the answer
    pub fn exchange_timing(&mut self, send_time: NtpTimestamp) -> io::Result<TimingResponse> {
        let client = self.client_timing.ok_or_else(not_accepted)?;
        self.timing
            .send_to(&TimingRequest { send_time }.encode(), client)?;
        let reply = self.recv_timing()?;
        TimingResponse::decode(&reply).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn not_accepted() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no client has connected yet")
}
