use std::io;
use thiserror::Error;

use crate::protocol::crypto::CryptoError;
use crate::protocol::rtsp::RtspCodecError;

/// Errors raised by the RAOP client session engine
#[derive(Debug, Error)]
pub enum RaopError {
    /// Key derivation, wrapping or cipher setup failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // ===== Control Channel Errors =====
    /// RTSP request failed or returned a non-success status
    #[error("RTSP error: {message}")]
    Rtsp {
        /// Description of the error
        message: String,
        /// RTSP status code if available
        status_code: Option<u16>,
    },

    /// RTSP response could not be parsed
    #[error("RTSP codec error: {0}")]
    Codec(#[from] RtspCodecError),

    /// SETUP reply carried no usable transport
    #[error("missing transport parameter: {0}")]
    MissingTransport(String),

    // ===== Session Errors =====
    /// Operation requires a connected session
    #[error("session not connected")]
    NotConnected,

    /// `connect` called on a session that is already connected
    #[error("session already connected")]
    AlreadyConnected,

    /// Peer closed one of the session channels
    #[error("{channel} channel disconnected")]
    Disconnected {
        /// Which channel closed
        channel: &'static str,
    },

    /// A previous frame is still being written
    #[error("frame in flight: {remaining} bytes still pending")]
    FrameInFlight {
        /// Bytes of the previous frame not yet written
        remaining: usize,
    },

    /// Frame exceeds what the wire format can describe
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Frame size in bytes
        size: usize,
        /// Largest accepted size
        max: usize,
    },

    /// Pause transition not allowed from the current state
    #[error("invalid pause transition from {from} to {to}")]
    InvalidTransition {
        /// State before
        from: &'static str,
        /// Requested state
        to: &'static str,
    },

    /// Volume outside 0..=100
    #[error("invalid volume: {0} (expected 0..=100)")]
    InvalidVolume(u8),

    /// Readiness wait failed
    #[error("reactor error: {0}")]
    Reactor(String),

    // ===== IO Errors =====
    /// Socket or file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RaopError {
    /// Check if error is recoverable by retrying the operation
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FrameInFlight { .. } | Self::InvalidTransition { .. })
    }

    /// Check if error means the session must be torn down
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Io(_))
    }
}

/// Result type for RAOP client operations
pub type Result<T> = std::result::Result<T, RaopError>;
