use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// NTP timestamp (64-bit, seconds since 1900-01-01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp {
    /// Seconds since NTP epoch
    pub seconds: u32,
    /// Fractional seconds (1/2^32 of a second)
    pub fraction: u32,
}

impl NtpTimestamp {
    /// NTP epoch offset from Unix epoch (70 years in seconds)
    pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

    /// 2^32 / 10^6, fraction units per microsecond
    const FRACTION_PER_MICRO: f64 = 4294.967296;

    /// Convert Unix seconds plus microseconds
    #[must_use]
    pub fn from_unix(secs: u64, micros: u32) -> Self {
        let micros = micros.min(999_999);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let fraction = (f64::from(micros) * Self::FRACTION_PER_MICRO).round() as u32;

        #[allow(clippy::cast_possible_truncation)]
        Self {
            seconds: (secs + Self::NTP_UNIX_OFFSET) as u32,
            fraction,
        }
    }

    /// Convert a duration since the Unix epoch
    #[must_use]
    pub fn from_duration(since_epoch: Duration) -> Self {
        Self::from_unix(since_epoch.as_secs(), since_epoch.subsec_micros())
    }

    /// Create from current time
    #[must_use]
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(duration)
    }

    /// Seconds in the high word, fraction in the low word
    #[must_use]
    pub fn to_u64(&self) -> u64 {
        (u64::from(self.seconds) << 32) | u64::from(self.fraction)
    }

    /// Encode to 8 bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 8] {
        self.to_u64().to_be_bytes()
    }

    /// Decode from 8 bytes
    #[must_use]
    pub fn decode(buf: [u8; 8]) -> Self {
        let value = u64::from_be_bytes(buf);
        #[allow(clippy::cast_possible_truncation)]
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Convert to microseconds since NTP epoch
    #[must_use]
    pub fn to_micros(&self) -> u64 {
        let secs = u64::from(self.seconds);
        let frac_micros = (u64::from(self.fraction) * 1_000_000) >> 32;
        secs * 1_000_000 + frac_micros
    }
}
