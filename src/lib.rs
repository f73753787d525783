//! # raop-client
//!
//! A RAOP (`AirPlay` 1) sender: negotiates a session with a receiver over
//! RTSP, streams uncompressed ALAC audio over RTP/UDP or the legacy TCP
//! framing, and keeps the receiver in sync while it plays.
//!
//! ## Example
//!
//! ```rust,no_run
//! use raop_client::{PcmFormat, PcmSource, RaopClient, RaopConfig, StreamPlayer, TransportMode};
//!
//! # fn example() -> Result<(), raop_client::RaopError> {
//! let mut client = RaopClient::new(RaopConfig::default());
//! client.connect_host("192.168.1.20", true, TransportMode::Datagram)?;
//! client.update_volume(60)?;
//! client.set_content("Title", "Artist", "Album")?;
//!
//! let source = PcmSource::open("track.pcm", PcmFormat::CD_QUALITY)?
//!     .with_layout(client.frame_layout());
//! StreamPlayer::new(&mut client, source).run_to_completion()?;
//! client.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Session**: `RaopClient` - connect, volume, metadata, pause, send
//! - **Main loop**: `StreamPlayer` - pulls an `AudioSource` into a session
//! - **Low-level**: protocol modules (RTSP, SDP, RTP, DMAP, crypto) and the
//!   `poll(2)` reactor

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod audio;
pub mod client;
pub mod net;
pub mod protocol;
/// Streaming support
pub mod streaming;

#[cfg(test)]
mod error_tests;

// Re-exports
pub use audio::{ChannelConfig, FrameLayout, PcmFormat, SampleChunk};
pub use client::{PauseState, RaopClient, StreamEvent};
pub use error::{RaopError, Result};
pub use protocol::rtsp::{ControlChannel, RtspClient};
pub use streaming::{AudioSource, PcmSource, PlayerStep, StopHandle, StreamPlayer};
pub use types::{JackKind, JackStatus, RaopConfig, RaopConfigBuilder, TransportMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AudioSource, PauseState, PcmFormat, PcmSource, RaopClient, RaopConfig, RaopError,
        StreamEvent, StreamPlayer, TransportMode,
    };
}
