//! Blocking RTSP control client

use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Method, RtspCodec, RtspRequest, RtspResponse};
use crate::error::{RaopError, Result};
use crate::protocol::raop::session::{RaopRtspSession, RaopTransport, TransportOffer};
use crate::types::JackStatus;

/// Result of a successful SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupResponse {
    /// Receiver ports
    pub transport: RaopTransport,
    /// Receiver jack status (connected/digital when not reported)
    pub jack: JackStatus,
}

/// The RTSP handshake as seen by the streaming engine
///
/// Implemented by [`RtspClient`] for real receivers and by
/// `testing::MockControlChannel` for tests.
pub trait ControlChannel {
    /// Replace the User-Agent sent with each request
    fn set_user_agent(&mut self, agent: &str);

    /// Add a header sent with every following request
    fn add_header(&mut self, name: &str, value: &str);

    /// Stop sending a previously added header
    fn remove_header(&mut self, name: &str);

    /// Open the control connection; requests address `rtsp://{local_ip}/{sid}`
    fn connect(&mut self, host: &str, port: u16, sid: &str) -> Result<()>;

    /// Local address of the control connection
    fn local_ip(&self) -> Option<IpAddr>;

    /// OPTIONS
    fn options(&mut self) -> Result<()>;

    /// ANNOUNCE with an SDP body
    fn announce_sdp(&mut self, sdp: &str) -> Result<()>;

    /// SETUP offering the given transport
    fn setup(&mut self, offer: &TransportOffer) -> Result<SetupResponse>;

    /// RECORD
    fn record(&mut self) -> Result<()>;

    /// `SET_PARAMETER` with a `text/parameters` body
    fn set_parameter(&mut self, body: &str) -> Result<()>;

    /// `SET_PARAMETER` with DMAP metadata anchored at `rtptime`
    fn set_daap(&mut self, dmap: &[u8], rtptime: u32) -> Result<()>;

    /// FLUSH up to the given sequence and timestamp
    fn flush(&mut self, seq: u16, rtptime: u32) -> Result<()>;

    /// TEARDOWN and close the connection
    fn teardown(&mut self) -> Result<()>;
}

struct Connection {
    stream: TcpStream,
    codec: RtspCodec,
    session: RaopRtspSession,
    local_ip: IpAddr,
}

/// RTSP client over a blocking TCP connection
pub struct RtspClient {
    timeout: Duration,
    user_agent: String,
    pending_headers: Vec<(String, String)>,
    conn: Option<Connection>,
}

impl RtspClient {
    /// Create an unconnected client
    #[must_use]
    pub fn new(user_agent: &str, timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: user_agent.to_string(),
            pending_headers: Vec::new(),
            conn: None,
        }
    }

    /// Whether the control connection is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(RaopError::NotConnected)
    }

    fn transact(
        &mut self,
        build: impl FnOnce(&mut RaopRtspSession) -> RtspRequest,
    ) -> Result<RtspResponse> {
        let conn = self.connection()?;
        let request = build(&mut conn.session);
        let method = request.method;

        tracing::debug!(method = method.as_str(), uri = %request.uri, "RTSP request");
        let response = match conn.exchange(&request) {
            Ok(response) => response,
            Err(e) => {
                // A half-read reply must not prefix the next one
                conn.codec.reset();
                tracing::debug!(method = method.as_str(), error = %e, "RTSP exchange failed");
                return Err(e);
            }
        };

        tracing::debug!(
            method = method.as_str(),
            status = response.status.as_u16(),
            "RTSP response"
        );
        conn.session.process_response(method, &response)?;

        Ok(response)
    }
}

impl Connection {
    fn exchange(&mut self, request: &RtspRequest) -> Result<RtspResponse> {
        self.stream.write_all(&request.encode())?;

        loop {
            if let Some(response) = self.codec.decode()? {
                return Ok(response);
            }
            let mut buf = [0u8; 2048];
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Err(RaopError::Disconnected { channel: "control" });
            }
            self.codec.feed(&buf[..n])?;
        }
    }
}

impl ControlChannel for RtspClient {
    fn set_user_agent(&mut self, agent: &str) {
        self.user_agent = agent.to_string();
        if let Some(conn) = self.conn.as_mut() {
            conn.session.set_user_agent(agent);
        }
    }

    fn add_header(&mut self, name: &str, value: &str) {
        match self.conn.as_mut() {
            Some(conn) => conn.session.add_header(name, value),
            None => {
                self.pending_headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
                self.pending_headers
                    .push((name.to_string(), value.to_string()));
            }
        }
    }

    fn remove_header(&mut self, name: &str) {
        self.pending_headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        if let Some(conn) = self.conn.as_mut() {
            conn.session.remove_header(name);
        }
    }

    fn connect(&mut self, host: &str, port: u16, sid: &str) -> Result<()> {
        if self.conn.is_some() {
            return Err(RaopError::AlreadyConnected);
        }

        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            RaopError::Rtsp {
                message: format!("cannot resolve {host}"),
                status_code: None,
            }
        })?;

        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        let local_ip = stream.local_addr()?.ip();

        let mut session = RaopRtspSession::new(&local_ip.to_string(), sid, &self.user_agent);
        for (name, value) in self.pending_headers.drain(..) {
            session.add_header(&name, &value);
        }

        tracing::info!(%addr, %local_ip, "RTSP control connected");
        self.conn = Some(Connection {
            stream,
            codec: RtspCodec::new(),
            session,
            local_ip,
        });
        Ok(())
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.conn.as_ref().map(|c| c.local_ip)
    }

    fn options(&mut self) -> Result<()> {
        self.transact(RaopRtspSession::options_request).map(drop)
    }

    fn announce_sdp(&mut self, sdp: &str) -> Result<()> {
        self.transact(|s| s.announce_request(sdp)).map(drop)
    }

    fn setup(&mut self, offer: &TransportOffer) -> Result<SetupResponse> {
        self.transact(|s| s.setup_request(offer))?;

        let session = &self.connection()?.session;
        let transport = session
            .transport()
            .ok_or_else(|| RaopError::MissingTransport("Transport".to_string()))?;

        Ok(SetupResponse {
            transport,
            jack: session.jack_status().unwrap_or_default(),
        })
    }

    fn record(&mut self) -> Result<()> {
        self.transact(RaopRtspSession::record_request).map(drop)
    }

    fn set_parameter(&mut self, body: &str) -> Result<()> {
        self.transact(|s| s.set_parameter_request(body)).map(drop)
    }

    fn set_daap(&mut self, dmap: &[u8], rtptime: u32) -> Result<()> {
        self.transact(|s| s.set_daap_request(dmap, rtptime))
            .map(drop)
    }

    fn flush(&mut self, seq: u16, rtptime: u32) -> Result<()> {
        self.transact(|s| s.flush_request(seq, rtptime)).map(drop)
    }

    fn teardown(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        let result = self.transact(RaopRtspSession::teardown_request).map(drop);
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.stream.shutdown(Shutdown::Both) {
                tracing::debug!(error = %e, "RTSP control shutdown failed");
            }
        }
        tracing::info!(method = Method::Teardown.as_str(), "RTSP control closed");
        result
    }
}
