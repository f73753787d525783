//! Wire protocols spoken by a RAOP sender

pub mod crypto;
pub mod daap;
pub mod raop;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
