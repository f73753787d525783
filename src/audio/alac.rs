//! Uncompressed ALAC framing
//!
//! Receivers accept ALAC frames flagged "not compressed": a 23-bit header,
//! an optional 32-bit frame count, then every stereo frame as two
//! big-endian 16-bit samples, all packed without byte alignment.

use super::format::ChannelConfig;

/// Frames in a full chunk; other counts carry an explicit size
pub const FULL_CHUNK_FRAMES: u32 = 4096;

/// Smallest chunk ever sent; shorter input is zero-padded
pub const MIN_CHUNK_FRAMES: u32 = 32;

/// MSB-first bit packer
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    // Bits already used in the last byte (0 = byte-aligned)
    used: u8,
}

impl BitWriter {
    /// Create a writer with room for `bytes`
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            used: 0,
        }
    }

    /// Append the low `bits` bits of `value`, most significant first
    pub fn write(&mut self, value: u32, bits: u8) {
        let mut remaining = bits;
        while remaining > 0 {
            if self.used == 0 {
                self.buf.push(0);
            }
            let free = 8 - self.used;
            let take = free.min(remaining);
            let shift = remaining - take;
            #[allow(clippy::cast_possible_truncation)]
            let chunk = ((value >> shift) & ((1u32 << take) - 1)) as u8;
            if let Some(last) = self.buf.last_mut() {
                *last |= chunk << (free - take);
            }
            self.used = (self.used + take) % 8;
            remaining -= take;
        }
    }

    /// Number of bits written so far
    #[must_use]
    pub fn bit_len(&self) -> usize {
        match self.used {
            0 => self.buf.len() * 8,
            used => (self.buf.len() - 1) * 8 + usize::from(used),
        }
    }

    /// Bytes written, a partial last byte zero-filled
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Full and minimum chunk lengths a session streams with
///
/// The full length is announced to the receiver; frames of any other
/// length carry an explicit frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Frames in a full chunk
    pub full_frames: u32,
    /// Smallest chunk ever sent; shorter input is zero-padded
    pub min_frames: u32,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            full_frames: FULL_CHUNK_FRAMES,
            min_frames: MIN_CHUNK_FRAMES,
        }
    }
}

impl FrameLayout {
    /// Layout with `full` frames per chunk and at least `min` per chunk
    ///
    /// Both lengths are at least one frame and `min` never exceeds `full`.
    #[must_use]
    pub fn new(full: u32, min: u32) -> Self {
        let full_frames = full.max(1);
        Self {
            full_frames,
            min_frames: min.clamp(1, full_frames),
        }
    }

    /// Encoded size of a frame holding `frames` stereo frames
    #[must_use]
    pub fn encoded_len(&self, frames: u32) -> usize {
        let size_bits = if frames == self.full_frames { 0 } else { 32 };
        let bits = 23 + size_bits + frames as usize * 32;
        bits.div_ceil(8)
    }

    /// Wrap little-endian 16-bit PCM into one uncompressed ALAC frame of
    /// exactly `frames` stereo frames
    ///
    /// Input beyond `frames` is ignored and missing input is zero-filled.
    #[must_use]
    pub fn encode(&self, pcm: &[u8], frames: u32, channels: ChannelConfig) -> Vec<u8> {
        let mut w = BitWriter::with_capacity(self.encoded_len(frames));

        w.write(1, 3); // channels - 1 (stereo)
        w.write(0, 4);
        w.write(0, 8);
        w.write(0, 4);
        let has_size = frames != self.full_frames;
        w.write(u32::from(has_size), 1);
        w.write(0, 2);
        w.write(1, 1); // not compressed
        if has_size {
            w.write(frames, 32);
        }

        let sample_bytes = 2 * usize::from(channels.channels());
        let sample = |at: usize| -> u32 {
            let lo = pcm.get(at).copied().unwrap_or(0);
            let hi = pcm.get(at + 1).copied().unwrap_or(0);
            u32::from(u16::from_le_bytes([lo, hi]))
        };

        for i in 0..frames as usize {
            let at = i * sample_bytes;
            let (left, right) = match channels {
                ChannelConfig::Mono => (sample(at), sample(at)),
                ChannelConfig::Stereo => (sample(at), sample(at + 2)),
            };
            w.write(left, 16);
            w.write(right, 16);
        }

        w.finish()
    }

    /// Encode `frames` frames of PCM into a chunk
    #[must_use]
    pub fn chunk(&self, pcm: &[u8], frames: u32, channels: ChannelConfig) -> SampleChunk {
        SampleChunk {
            payload: self.encode(pcm, frames, channels),
            frames,
        }
    }

    /// The minimum-length silent chunk, sent as a keep-alive while the
    /// source is starved
    #[must_use]
    pub fn silence(&self) -> SampleChunk {
        self.chunk(&[], self.min_frames, ChannelConfig::Stereo)
    }
}

/// Encoded size of `frames` stereo frames under the default layout
#[must_use]
pub fn encoded_len(frames: u32) -> usize {
    FrameLayout::default().encoded_len(frames)
}

/// Encode one uncompressed ALAC frame under the default layout
#[must_use]
pub fn encode_uncompressed(pcm: &[u8], frames: u32, channels: ChannelConfig) -> Vec<u8> {
    FrameLayout::default().encode(pcm, frames, channels)
}

/// Frame of `MIN_CHUNK_FRAMES` silent frames
#[must_use]
pub fn silence_frame() -> Vec<u8> {
    FrameLayout::default().silence().payload
}

/// One encoded audio chunk ready for framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleChunk {
    /// Uncompressed ALAC frame
    pub payload: Vec<u8>,
    /// Stereo frames the payload carries (advances the RTP timestamp)
    pub frames: u32,
}

impl SampleChunk {
    /// Encode `frames` frames of little-endian 16-bit PCM under the
    /// default layout
    #[must_use]
    pub fn encode(pcm: &[u8], frames: u32, channels: ChannelConfig) -> Self {
        FrameLayout::default().chunk(pcm, frames, channels)
    }

    /// The default layout's silent chunk
    #[must_use]
    pub fn silence() -> Self {
        FrameLayout::default().silence()
    }
}
