//! Audio packet framing for both transport modes

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use crate::audio::SampleChunk;
use crate::error::{RaopError, Result};
use crate::protocol::crypto::BLOCK_SIZE;
use crate::protocol::raop::RaopEncryptor;
use crate::protocol::rtp::{RaopAudioPacket, StreamFrameHeader};
use crate::types::TransportMode;

/// RTP timestamp shared between the audio path and the sync loop
///
/// The audio path is the only writer (`Release`); the sync loop reads with
/// `Acquire`.
#[derive(Debug, Default)]
pub struct StreamClock {
    timestamp: AtomicU32,
}

impl StreamClock {
    /// Create a clock starting at `timestamp`
    #[must_use]
    pub fn new(timestamp: u32) -> Self {
        Self {
            timestamp: AtomicU32::new(timestamp),
        }
    }

    /// Current timestamp
    #[must_use]
    pub fn now(&self) -> u32 {
        self.timestamp.load(Ordering::Acquire)
    }

    /// Advance by `frames`, wrapping; returns the timestamp before the advance
    pub fn advance(&self, frames: u32) -> u32 {
        self.timestamp.fetch_add(frames, Ordering::Release)
    }
}

/// Builds wire frames for audio chunks
///
/// Datagram frames carry a 12-byte RTP header; the marker bit is set on the
/// first frame only, the sequence grows by one per frame and the timestamp
/// by the frames of each chunk. Stream frames carry the 16-byte legacy
/// preamble.
pub struct PacketFramer {
    mode: TransportMode,
    ssrc: u32,
    sequence: u16,
    first: bool,
    clock: Arc<StreamClock>,
    encryptor: Option<RaopEncryptor>,
}

impl PacketFramer {
    /// Create a framer; payloads are encrypted when `encryptor` is set
    #[must_use]
    pub fn new(
        mode: TransportMode,
        ssrc: u32,
        clock: Arc<StreamClock>,
        encryptor: Option<RaopEncryptor>,
    ) -> Self {
        Self {
            mode,
            ssrc,
            sequence: 0,
            first: true,
            clock,
            encryptor,
        }
    }

    /// Transport mode
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Sequence number of the next datagram frame
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// SSRC of datagram frames
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Shared RTP timestamp
    #[must_use]
    pub fn clock(&self) -> &Arc<StreamClock> {
        &self.clock
    }

    /// Whether payloads are encrypted
    #[must_use]
    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Frame one chunk and advance sequence and timestamp
    ///
    /// # Errors
    ///
    /// Returns `RaopError::FrameTooLarge` if a stream frame cannot describe
    /// the payload length.
    pub fn frame(&mut self, chunk: &SampleChunk) -> Result<Bytes> {
        // Refuse before the cipher state moves
        let max = StreamFrameHeader::MAX_PAYLOAD - BLOCK_SIZE;
        if self.mode == TransportMode::Stream && chunk.payload.len() > max {
            return Err(RaopError::FrameTooLarge {
                size: chunk.payload.len(),
                max,
            });
        }

        let mut payload = chunk.payload.clone();
        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.seal(&mut payload);
        }

        let frame = match self.mode {
            TransportMode::Datagram => {
                let mut buf = BytesMut::with_capacity(RaopAudioPacket::HEADER_SIZE + payload.len());
                let timestamp = self.clock.now();
                RaopAudioPacket::put_header(&mut buf, self.first, self.sequence, timestamp, self.ssrc);
                buf.put_slice(&payload);
                self.sequence = self.sequence.wrapping_add(1);
                self.first = false;
                buf.freeze()
            }
            TransportMode::Stream => {
                let header = StreamFrameHeader::encode(payload.len()).ok_or(
                    RaopError::FrameTooLarge {
                        size: payload.len(),
                        max: StreamFrameHeader::MAX_PAYLOAD,
                    },
                )?;
                let mut buf = BytesMut::with_capacity(StreamFrameHeader::SIZE + payload.len());
                buf.put_slice(&header);
                buf.put_slice(&payload);
                buf.freeze()
            }
        };

        self.clock.advance(chunk.frames);
        tracing::trace!(
            "framed {} bytes ({} frames), next seq {}",
            frame.len(),
            chunk.frames,
            self.sequence
        );
        Ok(frame)
    }
}
