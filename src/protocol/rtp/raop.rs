//! RAOP-specific RTP packet types

use super::timing::NtpTimestamp;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors decoding a received frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtpDecodeError {
    #[error("buffer too small: need {needed}, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("unexpected payload type: 0x{0:02x}")]
    UnexpectedPayloadType(u8),

    #[error("invalid stream frame preamble")]
    InvalidPreamble,
}

/// RAOP RTP payload types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RaopPayloadType {
    /// Timing request (receiver -> client)
    TimingRequest = 0x52,
    /// Timing response (client -> receiver)
    TimingResponse = 0x53,
    /// Sync packet (client -> receiver on control channel)
    Sync = 0x54,
    /// Audio data
    Audio = 0x60,
}

impl RaopPayloadType {
    /// Parse from byte value, ignoring the marker bit
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7F {
            0x52 => Some(Self::TimingRequest),
            0x53 => Some(Self::TimingResponse),
            0x54 => Some(Self::Sync),
            0x60 => Some(Self::Audio),
            _ => None,
        }
    }
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn ntp_at(buf: &[u8], at: usize) -> NtpTimestamp {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    NtpTimestamp::decode(raw)
}

/// RAOP audio packet (datagram mode)
#[derive(Debug, Clone)]
pub struct RaopAudioPacket {
    /// Marker bit (set on the first packet of a session)
    pub marker: bool,
    /// Sequence number
    pub sequence: u16,
    /// RTP timestamp
    pub timestamp: u32,
    /// SSRC
    pub ssrc: u32,
    /// Audio payload (possibly encrypted)
    pub payload: Bytes,
}

impl RaopAudioPacket {
    /// RTP header size
    pub const HEADER_SIZE: usize = 12;

    /// Write the 12-byte header for the given fields
    pub fn put_header(buf: &mut BytesMut, marker: bool, sequence: u16, timestamp: u32, ssrc: u32) {
        buf.put_u8(0x80); // V=2, P=0, X=0, CC=0
        buf.put_u8(RaopPayloadType::Audio as u8 | if marker { 0x80 } else { 0x00 });
        buf.put_u16(sequence);
        buf.put_u32(timestamp);
        buf.put_u32(ssrc);
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_SIZE + self.payload.len());
        Self::put_header(&mut buf, self.marker, self.sequence, self.timestamp, self.ssrc);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is short or not an audio packet
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::HEADER_SIZE,
                have: buf.len(),
            });
        }
        if buf[0] >> 6 != 2 {
            return Err(RtpDecodeError::InvalidVersion(buf[0] >> 6));
        }
        if RaopPayloadType::from_byte(buf[1]) != Some(RaopPayloadType::Audio) {
            return Err(RtpDecodeError::UnexpectedPayloadType(buf[1] & 0x7F));
        }

        Ok(Self {
            marker: (buf[1] & 0x80) != 0,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: be_u32(buf, 4),
            ssrc: be_u32(buf, 8),
            payload: Bytes::copy_from_slice(&buf[Self::HEADER_SIZE..]),
        })
    }
}

/// Legacy stream-mode frame preamble
///
/// `24 00 LL LL F0 FF` followed by ten zero bytes, where `LLLL` is the
/// big-endian payload length plus 12.
pub struct StreamFrameHeader;

impl StreamFrameHeader {
    /// Preamble size
    pub const SIZE: usize = 16;

    /// Largest payload whose length fits the 16-bit field
    pub const MAX_PAYLOAD: usize = u16::MAX as usize - (Self::SIZE - 4);

    /// Build the preamble for a payload, `None` if it is too long
    #[must_use]
    pub fn encode(payload_len: usize) -> Option<[u8; Self::SIZE]> {
        let len = u16::try_from(payload_len + Self::SIZE - 4).ok()?;
        let mut header = [0u8; Self::SIZE];
        header[0] = 0x24;
        header[2..4].copy_from_slice(&len.to_be_bytes());
        header[4] = 0xF0;
        header[5] = 0xFF;
        Some(header)
    }

    /// Payload length described by a preamble
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` on a short buffer or foreign preamble
    pub fn decode_payload_len(buf: &[u8]) -> Result<usize, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        if buf[0] != 0x24 || buf[4] != 0xF0 || buf[5] != 0xFF {
            return Err(RtpDecodeError::InvalidPreamble);
        }
        let len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        len.checked_sub(Self::SIZE - 4)
            .ok_or(RtpDecodeError::InvalidPreamble)
    }
}

/// RAOP sync packet (sent on control channel)
///
/// Ties the RTP timestamp being played to wall clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPacket {
    /// Current RTP timestamp
    pub rtp_timestamp: u32,
    /// Current NTP time
    pub ntp_time: NtpTimestamp,
    /// RTP timestamp of next audio packet
    pub next_timestamp: u32,
}

impl SyncPacket {
    /// Sync packet size
    pub const SIZE: usize = 20;

    /// Create a sync packet for `rtp_timestamp` at `ntp_time`
    #[must_use]
    pub fn new(rtp_timestamp: u32, ntp_time: NtpTimestamp) -> Self {
        Self {
            rtp_timestamp,
            ntp_time,
            next_timestamp: rtp_timestamp.wrapping_add(super::constants::FRAMES_PER_PACKET),
        }
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = 0x80;
        buf[1] = 0x80 | RaopPayloadType::Sync as u8;
        buf[2..4].copy_from_slice(&0x0007u16.to_be_bytes());
        buf[4..8].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        buf[8..16].copy_from_slice(&self.ntp_time.encode());
        buf[16..20].copy_from_slice(&self.next_timestamp.to_be_bytes());
        buf
    }

    /// Decode from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if buffer is too small
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        if RaopPayloadType::from_byte(buf[1]) != Some(RaopPayloadType::Sync) {
            return Err(RtpDecodeError::UnexpectedPayloadType(buf[1] & 0x7F));
        }

        Ok(Self {
            rtp_timestamp: be_u32(buf, 4),
            ntp_time: ntp_at(buf, 8),
            next_timestamp: be_u32(buf, 16),
        })
    }
}

/// Timing request as sent by a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRequest {
    /// Receiver transmit time
    pub send_time: NtpTimestamp,
}

impl TimingRequest {
    /// Request size
    pub const SIZE: usize = 32;

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = 0x80;
        buf[1] = 0x80 | RaopPayloadType::TimingRequest as u8;
        buf[2..4].copy_from_slice(&0x0007u16.to_be_bytes());
        buf[24..32].copy_from_slice(&self.send_time.encode());
        buf
    }
}

/// Timing response to a receiver's request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingResponse {
    /// Receiver transmit time copied from the request
    pub reference_time: NtpTimestamp,
    /// Local receive time
    pub receive_time: NtpTimestamp,
    /// Local transmit time
    pub send_time: NtpTimestamp,
}

impl TimingResponse {
    /// Response size
    pub const SIZE: usize = 32;

    /// Answer a request received at `now`; `None` for requests under 32 bytes
    #[must_use]
    pub fn from_request(request: &[u8], now: NtpTimestamp) -> Option<Self> {
        if request.len() < TimingRequest::SIZE {
            return None;
        }
        Some(Self {
            reference_time: ntp_at(request, 24),
            receive_time: now,
            send_time: now,
        })
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = 0x80;
        buf[1] = 0x80 | RaopPayloadType::TimingResponse as u8;
        buf[2..4].copy_from_slice(&0x0007u16.to_be_bytes());
        buf[8..16].copy_from_slice(&self.reference_time.encode());
        buf[16..24].copy_from_slice(&self.receive_time.encode());
        buf[24..32].copy_from_slice(&self.send_time.encode());
        buf
    }

    /// Decode from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if buffer is too small
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        if RaopPayloadType::from_byte(buf[1]) != Some(RaopPayloadType::TimingResponse) {
            return Err(RtpDecodeError::UnexpectedPayloadType(buf[1] & 0x7F));
        }

        Ok(Self {
            reference_time: ntp_at(buf, 8),
            receive_time: ntp_at(buf, 16),
            send_time: ntp_at(buf, 24),
        })
    }
}
