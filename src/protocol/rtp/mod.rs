//! RTP framing for RAOP audio, sync and timing packets

#![allow(missing_docs)]

pub mod raop;
mod timing;


pub use raop::{
    RaopAudioPacket, RaopPayloadType, RtpDecodeError, StreamFrameHeader, SyncPacket,
    TimingRequest, TimingResponse,
};
pub use timing::NtpTimestamp;

/// RTP protocol constants for RAOP
pub mod constants {
    /// Frames a sync packet looks ahead of the current timestamp
    pub const FRAMES_PER_PACKET: u32 = 352;

    /// Audio sample rate
    pub const SAMPLE_RATE: u32 = 44100;

    /// Audio channels (stereo)
    pub const CHANNELS: u8 = 2;

    /// Bits per sample
    pub const BITS_PER_SAMPLE: u8 = 16;

    /// Byte sent on the timing socket right after connecting
    pub const TIMING_HELLO: u8 = 0xFF;
}
