use crate::audio::FrameLayout;
use crate::protocol::raop::encryption::{IvPolicy, PartialBlockPolicy};
use std::time::Duration;

/// How audio frames travel to the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportMode {
    /// RTP over UDP with separate control and timing channels
    #[default]
    Datagram,
    /// Legacy length-prefixed frames over one TCP connection
    Stream,
}

impl TransportMode {
    /// Lowercase name for logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Datagram => "datagram",
            Self::Stream => "stream",
        }
    }
}

/// Configuration for RAOP client behavior
#[derive(Debug, Clone)]
pub struct RaopConfig {
    /// Receiver RTSP port (default: 5000)
    pub rtsp_port: u16,
    /// User-Agent sent on every RTSP request
    pub user_agent: String,
    /// Timeout for TCP connection attempts (default: 10 seconds)
    pub connection_timeout: Duration,
    /// Local control port for sync frames (default: 6001, 0 = ephemeral)
    pub control_port: u16,
    /// Local timing port (default: 6002, 0 = ephemeral)
    pub timing_port: u16,
    /// Sample rate of the outgoing stream (default: 44100)
    pub sample_rate: u32,
    /// Frames per full audio chunk (default: 4096)
    pub max_chunk_samples: u32,
    /// Smallest chunk ever sent; shorter reads are padded (default: 32)
    pub min_chunk_samples: u32,
    /// Chunks that may be sent back-to-back before pacing kicks in
    pub buffer_depth: u32,
    /// Sleep applied when pacing kicks in (default: 7ms)
    pub throttle_backoff: Duration,
    /// Samples released per pacing step (default: `sample_rate / 25`)
    pub pacing_quantum: u32,
    /// Interval between pause keep-alives (default: 3 seconds)
    pub keepalive_interval: Duration,
    /// Upper bound on one reactor wait (default: 3 seconds)
    pub reactor_ceiling: Duration,
    /// AES-CBC chaining across packets
    pub iv_policy: IvPolicy,
    /// Handling of payload tails shorter than one AES block
    pub partial_block_policy: PartialBlockPolicy,
}

impl Default for RaopConfig {
    fn default() -> Self {
        Self {
            rtsp_port: 5000,
            user_agent: "iTunes/7.6.2 (Windows; N;)".to_string(),
            connection_timeout: Duration::from_secs(10),
            control_port: 6001,
            timing_port: 6002,
            sample_rate: 44100,
            max_chunk_samples: 4096,
            min_chunk_samples: 32,
            buffer_depth: 2,
            throttle_backoff: Duration::from_millis(7),
            pacing_quantum: 44100 / 25,
            keepalive_interval: Duration::from_secs(3),
            reactor_ceiling: Duration::from_secs(3),
            iv_policy: IvPolicy::default(),
            partial_block_policy: PartialBlockPolicy::default(),
        }
    }
}

impl RaopConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> RaopConfigBuilder {
        RaopConfigBuilder::default()
    }

    /// Chunk lengths announced to the receiver and used for encoding
    #[must_use]
    pub fn frame_layout(&self) -> FrameLayout {
        FrameLayout::new(self.max_chunk_samples, self.min_chunk_samples)
    }

    /// Sample count after which pacing starts
    #[must_use]
    pub fn throttle_threshold(&self) -> u64 {
        u64::from(self.buffer_depth) * u64::from(self.frame_layout().full_frames)
    }
}

/// Builder for `RaopConfig`
#[derive(Debug, Clone, Default)]
pub struct RaopConfigBuilder {
    config: RaopConfig,
}

impl RaopConfigBuilder {
    /// Set receiver RTSP port
    #[must_use]
    pub fn rtsp_port(mut self, port: u16) -> Self {
        self.config.rtsp_port = port;
        self
    }

    /// Set User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set connection timeout
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set local control and timing ports (0 picks ephemeral ports)
    #[must_use]
    pub fn local_ports(mut self, control: u16, timing: u16) -> Self {
        self.config.control_port = control;
        self.config.timing_port = timing;
        self
    }

    /// Set sample rate; the pacing quantum follows at `rate / 25`
    #[must_use]
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self.config.pacing_quantum = rate / 25;
        self
    }

    /// Set full and minimum chunk sizes in frames
    #[must_use]
    pub fn chunk_samples(mut self, max: u32, min: u32) -> Self {
        self.config.max_chunk_samples = max;
        self.config.min_chunk_samples = min;
        self
    }

    /// Set flow-control depth in chunks
    #[must_use]
    pub fn buffer_depth(mut self, depth: u32) -> Self {
        self.config.buffer_depth = depth;
        self
    }

    /// Set the pacing sleep and per-step sample release
    #[must_use]
    pub fn throttle(mut self, backoff: Duration, quantum: u32) -> Self {
        self.config.throttle_backoff = backoff;
        self.config.pacing_quantum = quantum;
        self
    }

    /// Set pause keep-alive interval
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set the longest single reactor wait
    #[must_use]
    pub fn reactor_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.reactor_ceiling = ceiling;
        self
    }

    /// Set AES-CBC chaining policy
    #[must_use]
    pub fn iv_policy(mut self, policy: IvPolicy) -> Self {
        self.config.iv_policy = policy;
        self
    }

    /// Set treatment of partial AES blocks
    #[must_use]
    pub fn partial_block_policy(mut self, policy: PartialBlockPolicy) -> Self {
        self.config.partial_block_policy = policy;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> RaopConfig {
        self.config
    }
}
