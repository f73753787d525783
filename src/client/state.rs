//! Pause state machine, pacing and receiver buffer tracking

use std::time::{Duration, Instant};

use crate::error::{RaopError, Result};
use crate::net::Interest;
use crate::types::RaopConfig;

/// Playback state of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PauseState {
    /// Audio flows
    #[default]
    Playing,
    /// Paused by the user; the receiver is flushed periodically
    UserPaused,
    /// The source has no data; silence keeps the receiver alive
    BufferPaused,
}

impl PauseState {
    /// Name for logs and errors
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::UserPaused => "user-paused",
            Self::BufferPaused => "buffer-paused",
        }
    }

    /// Whether audio is held back
    #[must_use]
    pub fn is_paused(self) -> bool {
        self != Self::Playing
    }

    /// Whether `self -> to` is an allowed edge (staying put always is)
    #[must_use]
    pub fn can_transition_to(self, to: PauseState) -> bool {
        self == to
            || matches!(
                (self, to),
                (Self::Playing, Self::UserPaused)
                    | (Self::Playing, Self::BufferPaused)
                    | (Self::UserPaused, Self::Playing)
                    | (Self::BufferPaused, Self::Playing)
                    | (Self::BufferPaused, Self::UserPaused)
            )
    }

    /// Check an edge
    ///
    /// # Errors
    ///
    /// Returns `RaopError::InvalidTransition` for a disallowed edge.
    pub fn transition(self, to: PauseState) -> Result<PauseState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(RaopError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// Data descriptor interest in this state
    #[must_use]
    pub fn data_interest(self) -> Interest {
        match self {
            Self::Playing => Interest::READ | Interest::WRITE,
            Self::UserPaused | Self::BufferPaused => Interest::READ,
        }
    }
}

/// Datagram flow control
///
/// Counts transmitted frames; once the count reaches the threshold the
/// sender backs off and one pacing quantum is released.
#[derive(Debug, Clone)]
pub struct Throttle {
    total: u64,
    threshold: u64,
    quantum: u64,
    backoff: Duration,
}

impl Throttle {
    /// Create a throttle
    #[must_use]
    pub fn new(threshold: u64, quantum: u64, backoff: Duration) -> Self {
        Self {
            total: 0,
            threshold,
            quantum,
            backoff,
        }
    }

    /// Throttle configured from `config`
    #[must_use]
    pub fn from_config(config: &RaopConfig) -> Self {
        Self::new(
            config.throttle_threshold(),
            u64::from(config.pacing_quantum),
            config.throttle_backoff,
        )
    }

    /// Count `frames` just sent; returns the pause to apply, if any
    pub fn record(&mut self, frames: u32) -> Option<Duration> {
        self.total += u64::from(frames);
        if self.total >= self.threshold {
            self.total = self.total.saturating_sub(self.quantum);
            Some(self.backoff)
        } else {
            None
        }
    }

    /// Frames counted and not yet released
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Receiver-side buffer level as last reported on the data channel
#[derive(Debug, Clone, Copy)]
pub struct DeviceBuffer {
    sample_rate: u32,
    report: Option<(u32, Instant)>,
}

impl DeviceBuffer {
    /// Track a receiver playing at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            report: None,
        }
    }

    /// Record a report of `frames` buffered, observed at `at`
    pub fn report(&mut self, frames: u32, at: Instant) {
        self.report = Some((frames, at));
    }

    /// Last reported level
    #[must_use]
    pub fn reported_frames(&self) -> Option<u32> {
        self.report.map(|(frames, _)| frames)
    }

    /// Estimated time until the receiver runs dry, floored at zero
    #[must_use]
    pub fn drain_time(&self, now: Instant) -> Duration {
        match self.report {
            Some((frames, at)) if frames > 0 && self.sample_rate > 0 => {
                let buffered =
                    Duration::from_secs_f64(f64::from(frames) / f64::from(self.sample_rate));
                buffered.saturating_sub(now.saturating_duration_since(at))
            }
            _ => Duration::ZERO,
        }
    }
}
