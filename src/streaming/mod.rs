//! Audio sources and the loop that streams them

mod player;
mod source;

#[cfg(test)]
mod source_tests;

pub use player::{PlayerStep, StopHandle, StreamPlayer};
pub use source::{AudioSource, PCM_LISTEN_PORT, PcmSource};
