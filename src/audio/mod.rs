//! Audio payload preparation

pub mod alac;
pub mod format;


pub use alac::{
    FULL_CHUNK_FRAMES, FrameLayout, MIN_CHUNK_FRAMES, SampleChunk, encode_uncompressed, silence_frame,
};
pub use format::{ChannelConfig, PcmFormat};
