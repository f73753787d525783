//! PCM input format

use std::time::Duration;

/// Channel configuration of 16-bit input PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelConfig {
    /// Mono (1 channel), duplicated into both output channels
    Mono,
    /// Stereo (2 channels)
    #[default]
    Stereo,
}

impl ChannelConfig {
    /// Get number of channels
    #[must_use]
    pub fn channels(self) -> u8 {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
        }
    }
}

/// Signed 16-bit little-endian PCM format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Channel configuration
    pub channels: ChannelConfig,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl PcmFormat {
    /// 16-bit 44.1kHz stereo
    pub const CD_QUALITY: Self = Self {
        channels: ChannelConfig::Stereo,
        sample_rate: 44100,
    };

    /// Bytes per frame (all channels for one sample)
    #[must_use]
    pub fn bytes_per_frame(self) -> usize {
        2 * usize::from(self.channels.channels())
    }

    /// Playback time of `frames` frames
    #[must_use]
    pub fn frames_to_duration(self, frames: u32) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(f64::from(frames) / f64::from(self.sample_rate))
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::CD_QUALITY
    }
}
