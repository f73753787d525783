//! RAOP client session engine
//!
//! `RaopClient` owns one streaming session: the RTSP control collaborator,
//! the audio data socket driven by a single-threaded reactor, and the
//! background timing loops of datagram mode.

mod data_channel;
mod framer;
mod state;
mod timing;

#[cfg(test)]
mod client_tests;
#[cfg(test)]
mod timing_tests;

pub use data_channel::{
    DataChannel, DataSocket, DataTransport, PendingWrite, STATUS_LEVEL_OFFSET, STATUS_READ_SIZE,
};
pub use framer::{PacketFramer, StreamClock};
pub use state::{DeviceBuffer, PauseState, Throttle};
pub use timing::{SYNC_INTERVAL, TIMING_THREAD_NAME, TimingSynchronizer};

use std::cell::RefCell;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{FrameLayout, SampleChunk};
use crate::error::{RaopError, Result};
use crate::net::{Interest, Reactor, SharedHandler};
use crate::protocol::daap::TrackMetadata;
use crate::protocol::raop::{RaopEncryptor, RaopSessionKeys, SessionIdentifiers, TransportOffer};
use crate::protocol::rtp::constants::TIMING_HELLO;
use crate::protocol::rtsp::{ControlChannel, RtspClient};
use crate::protocol::sdp::create_raop_announce_sdp;
use crate::types::{JackStatus, RaopConfig, TransportMode};

/// Lowest volume in dB
pub const VOLUME_MIN_DB: i32 = -144;

/// Highest volume in dB
pub const VOLUME_MAX_DB: i32 = 0;

/// Events surfaced by `RaopClient::process_events`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The receiver drained its buffer after the last chunk
    SongDone,
}

/// Map a 0..=100 volume onto the receiver's dB scale
///
/// # Errors
///
/// Returns `RaopError::InvalidVolume` above 100.
pub fn volume_to_db(volume: u8) -> Result<i32> {
    if volume > 100 {
        return Err(RaopError::InvalidVolume(volume));
    }
    Ok(VOLUME_MIN_DB + (VOLUME_MAX_DB - VOLUME_MIN_DB) * i32::from(volume) / 100)
}

struct ActiveSession {
    mode: TransportMode,
    encrypt: bool,
    data: Rc<RefCell<DataChannel>>,
    data_fd: RawFd,
    framer: PacketFramer,
    throttle: Throttle,
    timing: Option<TimingSynchronizer>,
    jack: JackStatus,
    volume: Option<u8>,
}

/// A RAOP streaming session
///
/// The handle is single-threaded; only the timing loops run elsewhere.
pub struct RaopClient<C: ControlChannel = RtspClient> {
    config: RaopConfig,
    control: C,
    reactor: Reactor,
    session: Option<ActiveSession>,
    pause: PauseState,
    paused_at: Instant,
    wait_song_done: bool,
    silence: SampleChunk,
}

impl RaopClient<RtspClient> {
    /// Create an unconnected client speaking RTSP over TCP
    #[must_use]
    pub fn new(config: RaopConfig) -> Self {
        let control = RtspClient::new(&config.user_agent, config.connection_timeout);
        Self::with_control(config, control)
    }
}

impl<C: ControlChannel> RaopClient<C> {
    /// Create an unconnected client over a custom control channel
    #[must_use]
    pub fn with_control(config: RaopConfig, control: C) -> Self {
        Self {
            control,
            reactor: Reactor::new(),
            session: None,
            pause: PauseState::Playing,
            paused_at: Instant::now(),
            wait_song_done: false,
            silence: config.frame_layout().silence(),
            config,
        }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &RaopConfig {
        &self.config
    }

    /// Chunk lengths the session announces and keeps alive with
    #[must_use]
    pub fn frame_layout(&self) -> FrameLayout {
        self.config.frame_layout()
    }

    /// Control collaborator
    #[must_use]
    pub fn control(&self) -> &C {
        &self.control
    }

    /// Control collaborator, mutable
    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Whether a session is established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Transport of the current session
    #[must_use]
    pub fn transport_mode(&self) -> Option<TransportMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Whether audio payloads are encrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.encrypt)
    }

    /// Jack status reported at SETUP
    #[must_use]
    pub fn jack_status(&self) -> Option<JackStatus> {
        self.session.as_ref().map(|s| s.jack)
    }

    /// Last volume set, 0..=100
    #[must_use]
    pub fn volume(&self) -> Option<u8> {
        self.session.as_ref().and_then(|s| s.volume)
    }

    /// Current RTP timestamp
    #[must_use]
    pub fn rtp_timestamp(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.framer.clock().now())
    }

    /// Sequence number of the next datagram frame
    #[must_use]
    pub fn sequence(&self) -> Option<u16> {
        self.session.as_ref().map(|s| s.framer.sequence())
    }

    /// Descriptor of the audio data socket
    #[must_use]
    pub fn data_fd(&self) -> Option<RawFd> {
        self.session.as_ref().map(|s| s.data_fd)
    }

    /// Reactor driving the session
    #[must_use]
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Open a session with the receiver at `host` on the configured RTSP port
    ///
    /// # Errors
    ///
    /// See [`RaopClient::connect`].
    pub fn connect_host(&mut self, host: &str, encrypt: bool, mode: TransportMode) -> Result<()> {
        let port = self.config.rtsp_port;
        self.connect(host, port, encrypt, mode)
    }

    /// Open a session with the receiver at `host:port`
    ///
    /// Stream mode always encrypts. On failure everything opened so far is
    /// released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `RaopError::AlreadyConnected` if a session is open, otherwise
    /// the first socket, handshake or key exchange failure.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        encrypt: bool,
        mode: TransportMode,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(RaopError::AlreadyConnected);
        }

        let encrypt = encrypt || mode == TransportMode::Stream;
        let ids = SessionIdentifiers::generate(mode);
        tracing::debug!(
            "connecting to {}:{} sid={} mode={} encrypt={}",
            host,
            port,
            ids.sid,
            mode.as_str(),
            encrypt
        );

        self.control.set_user_agent(&self.config.user_agent);
        self.control.add_header("Client-Instance", &ids.client_instance);
        self.control.connect(host, port, &ids.sid)?;

        match self.establish(host, &ids, encrypt, mode) {
            Ok(session) => {
                if self.reactor.registry_mut().unregister(session.data_fd) {
                    tracing::debug!("dropped stale registration for fd {}", session.data_fd);
                }
                let handler: SharedHandler = session.data.clone();
                self.reactor
                    .registry_mut()
                    .register(session.data_fd, Interest::READ, handler);
                self.pause = PauseState::Playing;
                self.paused_at = Instant::now();
                self.wait_song_done = false;
                self.session = Some(session);
                tracing::info!("RAOP session established with {}:{}", host, port);
                Ok(())
            }
            Err(e) => {
                if let Err(teardown) = self.control.teardown() {
                    tracing::debug!("teardown after failed connect: {}", teardown);
                }
                Err(e)
            }
        }
    }

    fn establish(
        &mut self,
        host: &str,
        ids: &SessionIdentifiers,
        encrypt: bool,
        mode: TransportMode,
    ) -> Result<ActiveSession> {
        let keys = RaopSessionKeys::derive()?;
        let local_ip = self.control.local_ip().unwrap_or_else(|| {
            tracing::warn!("control channel has no local address");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        if mode == TransportMode::Datagram {
            self.control.options()?;
        }

        let sdp = create_raop_announce_sdp(
            &ids.sid,
            &local_ip.to_string(),
            host,
            &keys.rsaaeskey(),
            &keys.aesiv(),
            self.config.frame_layout().full_frames,
            self.config.sample_rate,
        );
        self.control.add_header("Apple-Challenge", &ids.challenge);
        let announced = self.control.announce_sdp(&sdp);
        self.control.remove_header("Apple-Challenge");
        announced?;

        let receiver_ip = resolve(host, 0)?.ip();
        let local_channels = match mode {
            TransportMode::Datagram => Some((
                bind_udp(receiver_ip, self.config.control_port)?,
                bind_udp(receiver_ip, self.config.timing_port)?,
            )),
            TransportMode::Stream => None,
        };
        let offer = match &local_channels {
            Some((control, timing)) => TransportOffer {
                mode,
                control_port: control.local_addr()?.port(),
                timing_port: timing.local_addr()?.port(),
            },
            None => TransportOffer {
                mode,
                control_port: 0,
                timing_port: 0,
            },
        };

        let setup = self.control.setup(&offer)?;
        let transport = setup.transport;
        tracing::debug!(
            "receiver ports: server={} control={} timing={}",
            transport.server_port,
            transport.control_port,
            transport.timing_port
        );

        let clock = Arc::new(StreamClock::new(0));
        let timing = match local_channels {
            Some((control, timing)) => {
                control.connect(SocketAddr::new(receiver_ip, transport.control_port))?;
                timing.connect(SocketAddr::new(receiver_ip, transport.timing_port))?;
                timing.send(&[TIMING_HELLO])?;
                Some(TimingSynchronizer::start(
                    control,
                    timing,
                    Arc::clone(&clock),
                    SYNC_INTERVAL,
                )?)
            }
            None => None,
        };

        let server = SocketAddr::new(receiver_ip, transport.server_port);
        let socket = match mode {
            TransportMode::Datagram => {
                let socket = bind_udp(receiver_ip, 0)?;
                socket.connect(server)?;
                socket.set_nonblocking(true)?;
                DataSocket::Udp(socket)
            }
            TransportMode::Stream => {
                let stream = TcpStream::connect_timeout(&server, self.config.connection_timeout)?;
                stream.set_nodelay(true)?;
                stream.set_nonblocking(true)?;
                DataSocket::Tcp(stream)
            }
        };

        let encryptor = if encrypt {
            Some(
                RaopEncryptor::from_session_keys(&keys)?
                    .with_iv_policy(self.config.iv_policy)
                    .with_partial_block_policy(self.config.partial_block_policy),
            )
        } else {
            None
        };
        let framer = PacketFramer::new(mode, rand::random::<u32>(), clock, encryptor);

        self.control.record()?;
        tracing::info!("record started");

        let data = DataChannel::new(socket, self.config.sample_rate);
        let data_fd = data.fd();
        Ok(ActiveSession {
            mode,
            encrypt,
            data: Rc::new(RefCell::new(data)),
            data_fd,
            framer,
            throttle: Throttle::from_config(&self.config),
            timing,
            jack: setup.jack,
            volume: None,
        })
    }

    fn session(&self) -> Result<&ActiveSession> {
        self.session.as_ref().ok_or(RaopError::NotConnected)
    }

    /// Set the receiver volume, 0..=100 mapped onto -144..0 dB
    ///
    /// # Errors
    ///
    /// Returns `RaopError::InvalidVolume` above 100, `NotConnected` without
    /// a session, or the control channel failure.
    pub fn update_volume(&mut self, volume: u8) -> Result<()> {
        let db = volume_to_db(volume)?;
        self.session()?;
        self.control
            .set_parameter(&format!("volume: {db}.000000\r\n"))?;
        if let Some(session) = self.session.as_mut() {
            session.volume = Some(volume);
        }
        tracing::debug!("volume {} ({} dB)", volume, db);
        Ok(())
    }

    /// Push track metadata tied to the current RTP timestamp
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a session, or the control channel
    /// failure.
    pub fn set_content(&mut self, title: &str, artist: &str, album: &str) -> Result<()> {
        let rtptime = self.session()?.framer.clock().now();
        let dmap = TrackMetadata::new(title, artist, album).encode_dmap();
        self.control.set_daap(&dmap, rtptime)
    }

    /// Ask the receiver to drop its buffered audio
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a session, or the control channel
    /// failure.
    pub fn flush(&mut self) -> Result<()> {
        let session = self.session()?;
        let (seq, rtptime) = (session.framer.sequence(), session.framer.clock().now());
        self.control.flush(seq, rtptime)
    }

    /// Current pause state
    #[must_use]
    pub fn pause_state(&self) -> PauseState {
        self.pause
    }

    /// Move the pause state machine
    ///
    /// Entering `UserPaused` flushes the receiver. Paused states arm the data
    /// descriptor read-only; `Playing` arms it read and write.
    ///
    /// # Errors
    ///
    /// Returns `RaopError::InvalidTransition` for a disallowed edge or a
    /// user pause while waiting for the song to finish.
    pub fn set_pause(&mut self, state: PauseState) -> Result<()> {
        let data_fd = self.session()?.data_fd;
        if state == self.pause {
            return Ok(());
        }
        if state == PauseState::UserPaused && self.wait_song_done {
            return Err(RaopError::InvalidTransition {
                from: self.pause.as_str(),
                to: state.as_str(),
            });
        }

        let next = self.pause.transition(state)?;
        if next == PauseState::UserPaused {
            self.flush()?;
        }
        self.reactor
            .registry_mut()
            .reregister(data_fd, next.data_interest());
        if next.is_paused() {
            self.paused_at = Instant::now();
        }
        tracing::debug!("pause state {} -> {}", self.pause.as_str(), next.as_str());
        self.pause = next;
        Ok(())
    }

    /// Frame and queue one chunk; returns the bytes pending on the wire
    ///
    /// In datagram mode the sender backs off briefly once the configured
    /// depth of audio has been sent ahead.
    ///
    /// # Errors
    ///
    /// Returns `RaopError::FrameInFlight` while the previous frame is still
    /// being written, `NotConnected` without a session, or
    /// `FrameTooLarge` for an oversized stream frame.
    pub fn send_sample(&mut self, chunk: &SampleChunk) -> Result<usize> {
        let session = self.session.as_mut().ok_or(RaopError::NotConnected)?;
        let remaining = session.data.borrow().pending_bytes();
        if remaining > 0 {
            return Err(RaopError::FrameInFlight { remaining });
        }

        let frame = session.framer.frame(chunk)?;
        let len = session.data.borrow_mut().begin_write(frame)?;
        self.reactor
            .registry_mut()
            .reregister(session.data_fd, Interest::READ | Interest::WRITE);

        if session.mode == TransportMode::Datagram {
            if let Some(backoff) = session.throttle.record(chunk.frames) {
                std::thread::sleep(backoff);
            }
        }
        Ok(len)
    }

    /// Bytes of the current frame not yet written
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.data.borrow().pending_bytes())
    }

    /// Estimated time until the receiver's buffer runs dry
    #[must_use]
    pub fn buffer_drain_time(&self) -> Duration {
        self.session.as_ref().map_or(Duration::ZERO, |s| {
            s.data.borrow().device_buffer().drain_time(Instant::now())
        })
    }

    /// Whether end-of-song detection is armed
    #[must_use]
    pub fn wait_song_done(&self) -> bool {
        self.wait_song_done
    }

    /// Arm or disarm end-of-song detection
    pub fn set_wait_song_done(&mut self, wait: bool) {
        self.wait_song_done = wait;
    }

    /// Register a caller descriptor with the session reactor
    pub fn register(&mut self, fd: RawFd, interest: Interest, handler: SharedHandler) {
        self.reactor.registry_mut().register(fd, interest, handler);
    }

    /// Remove a descriptor from the session reactor
    pub fn unregister(&mut self, fd: RawFd) -> bool {
        self.reactor.registry_mut().unregister(fd)
    }

    fn tick_timeout(&self) -> Duration {
        let ceiling = self.config.reactor_ceiling;
        if self.wait_song_done {
            self.buffer_drain_time().min(ceiling)
        } else {
            ceiling
        }
    }

    /// Run one reactor tick, then end-of-song detection and pause keep-alive
    ///
    /// A data channel failure closes the session before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first handler or wait failure, or a keep-alive failure.
    pub fn process_events(&mut self) -> Result<Option<StreamEvent>> {
        if let Err(e) = self.reactor.tick(self.tick_timeout()) {
            if e.is_connection_error() {
                tracing::warn!("closing session after data channel failure: {}", e);
                if let Err(close) = self.close() {
                    tracing::debug!("close after failure: {}", close);
                }
            }
            return Err(e);
        }

        let mut event = None;
        if self.session.is_some() && self.wait_song_done && self.buffer_drain_time().is_zero() {
            self.wait_song_done = false;
            tracing::info!("song done");
            event = Some(StreamEvent::SongDone);
        }

        self.keep_alive()?;
        Ok(event)
    }

    fn keep_alive(&mut self) -> Result<()> {
        if self.session.is_none()
            || !self.pause.is_paused()
            || self.paused_at.elapsed() < self.config.keepalive_interval
        {
            return Ok(());
        }

        match self.pause {
            PauseState::UserPaused => {
                tracing::debug!("re-flushing while paused");
                self.flush()?;
            }
            PauseState::BufferPaused => {
                let silence = self.silence.clone();
                match self.send_sample(&silence) {
                    Ok(_) => tracing::debug!("sent silence keep-alive"),
                    Err(RaopError::FrameInFlight { remaining }) => {
                        tracing::debug!("keep-alive skipped, {} bytes in flight", remaining);
                    }
                    Err(e) => return Err(e),
                }
            }
            PauseState::Playing => {}
        }
        self.paused_at = Instant::now();
        Ok(())
    }

    /// Tear the session down
    ///
    /// The timing loops are cancelled and joined, every descriptor is
    /// unregistered, TEARDOWN is sent and only then are the sockets closed.
    /// Closing an unconnected client does nothing.
    ///
    /// # Errors
    ///
    /// Returns the TEARDOWN failure; the session is released regardless.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if let Some(mut timing) = session.timing.take() {
            timing.stop();
        }
        self.reactor.registry_mut().clear();
        let teardown = self.control.teardown();
        session.data.borrow().transport().shutdown();
        drop(session);

        self.pause = PauseState::Playing;
        self.wait_song_done = false;
        tracing::info!("RAOP session closed");
        teardown
    }
}

impl<C: ControlChannel> Drop for RaopClient<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("close on drop: {}", e);
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        RaopError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("cannot resolve {host}"),
        ))
    })
}

fn bind_udp(peer: IpAddr, port: u16) -> Result<UdpSocket> {
    let local = match peer {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    Ok(UdpSocket::bind(SocketAddr::new(local, port))?)
}
