//! RAOP RTSP request construction and reply processing

use crate::error::RaopError;
use crate::protocol::rtsp::{
    Headers, Method, RtspRequest, RtspRequestBuilder, RtspResponse, headers::names, headers::raop,
};
use crate::types::{JackStatus, TransportMode};

/// RAOP session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaopSessionState {
    /// Initial state
    Init,
    /// OPTIONS answered
    OptionsExchange,
    /// ANNOUNCE accepted
    Announced,
    /// SETUP answered with a transport
    SetUp,
    /// RECORD accepted, streaming
    Recording,
    /// Session terminated
    Terminated,
}

/// Receiver ports from the SETUP reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RaopTransport {
    /// Server audio data port
    pub server_port: u16,
    /// Server control port (datagram mode)
    pub control_port: u16,
    /// Server timing port (datagram mode)
    pub timing_port: u16,
}

/// Transport parameters the client offers in SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOffer {
    /// Datagram or stream framing
    pub mode: TransportMode,
    /// Local control port
    pub control_port: u16,
    /// Local timing port
    pub timing_port: u16,
}

impl TransportOffer {
    /// Render the `Transport` header value
    #[must_use]
    pub fn header_value(&self) -> String {
        match self.mode {
            TransportMode::Datagram => format!(
                "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port={};timing_port={}",
                self.control_port, self.timing_port
            ),
            TransportMode::Stream => "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record".to_string(),
        }
    }
}

/// Sans-IO RAOP RTSP session
///
/// Builds each request with the running `CSeq`, the user agent, any extra
/// headers and the server session, and folds replies back into state.
pub struct RaopRtspSession {
    state: RaopSessionState,
    cseq: u32,
    url: String,
    user_agent: String,
    extra_headers: Headers,
    session_id: Option<String>,
    transport: Option<RaopTransport>,
    jack: Option<JackStatus>,
}

impl RaopRtspSession {
    /// Create a session addressed at `rtsp://{local_ip}/{sid}`
    #[must_use]
    pub fn new(local_ip: &str, sid: &str, user_agent: &str) -> Self {
        Self {
            state: RaopSessionState::Init,
            cseq: 0,
            url: format!("rtsp://{local_ip}/{sid}"),
            user_agent: user_agent.to_string(),
            extra_headers: Headers::new(),
            session_id: None,
            transport: None,
            jack: None,
        }
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> RaopSessionState {
        self.state
    }

    /// Request URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Transport negotiated in SETUP
    #[must_use]
    pub fn transport(&self) -> Option<RaopTransport> {
        self.transport
    }

    /// Jack status from SETUP
    #[must_use]
    pub fn jack_status(&self) -> Option<JackStatus> {
        self.jack
    }

    /// Server session ID
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Replace the User-Agent
    pub fn set_user_agent(&mut self, agent: &str) {
        self.user_agent = agent.to_string();
    }

    /// Add a header sent with every following request
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.extra_headers.insert(name, value);
    }

    /// Stop sending a previously added header
    pub fn remove_header(&mut self, name: &str) {
        self.extra_headers.remove(name);
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    fn builder(&mut self, method: Method, uri: &str) -> RtspRequestBuilder {
        let cseq = self.next_cseq();
        let mut b = RtspRequest::builder(method, uri)
            .cseq(cseq)
            .user_agent(&self.user_agent)
            .headers(&self.extra_headers);

        if let Some(ref session) = self.session_id {
            b = b.session(session);
        }
        b
    }

    /// Create OPTIONS request
    pub fn options_request(&mut self) -> RtspRequest {
        self.builder(Method::Options, "*").build()
    }

    /// Create ANNOUNCE request with SDP
    pub fn announce_request(&mut self, sdp: &str) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::Announce, &url)
            .content_type("application/sdp")
            .body(sdp.as_bytes().to_vec())
            .build()
    }

    /// Create SETUP request
    pub fn setup_request(&mut self, offer: &TransportOffer) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::Setup, &url)
            .header(names::TRANSPORT, offer.header_value())
            .build()
    }

    /// Create RECORD request
    pub fn record_request(&mut self) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::Record, &url)
            .header(names::RANGE, "npt=0-")
            .rtp_info("seq=0;rtptime=0")
            .build()
    }

    /// Create `SET_PARAMETER` request with a `text/parameters` body
    pub fn set_parameter_request(&mut self, body: &str) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::SetParameter, &url)
            .content_type("text/parameters")
            .body(body.as_bytes().to_vec())
            .build()
    }

    /// Create `SET_PARAMETER` request carrying DMAP track metadata
    pub fn set_daap_request(&mut self, dmap: &[u8], rtptime: u32) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::SetParameter, &url)
            .content_type("application/x-dmap-tagged")
            .rtp_info(format!("rtptime={rtptime}"))
            .body(dmap.to_vec())
            .build()
    }

    /// Create FLUSH request
    pub fn flush_request(&mut self, seq: u16, rtptime: u32) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::Flush, &url)
            .rtp_info(format!("seq={seq};rtptime={rtptime}"))
            .build()
    }

    /// Create TEARDOWN request
    pub fn teardown_request(&mut self) -> RtspRequest {
        let url = self.url.clone();
        self.builder(Method::Teardown, &url).build()
    }

    /// Process response and update state
    ///
    /// # Errors
    ///
    /// Returns `RaopError::Rtsp` on a non-success status and
    /// `RaopError::MissingTransport` if SETUP names no server port.
    pub fn process_response(
        &mut self,
        method: Method,
        response: &RtspResponse,
    ) -> Result<(), RaopError> {
        if !response.is_success() {
            return Err(RaopError::Rtsp {
                message: format!(
                    "{} failed: {} {}",
                    method.as_str(),
                    response.status.as_u16(),
                    response.reason
                ),
                status_code: Some(response.status.as_u16()),
            });
        }

        if let Some(session) = response.session() {
            self.session_id = Some(session.to_string());
        }

        match method {
            Method::Options => self.state = RaopSessionState::OptionsExchange,
            Method::Announce => self.state = RaopSessionState::Announced,
            Method::Setup => {
                let transport = response
                    .headers
                    .get(names::TRANSPORT)
                    .ok_or_else(|| RaopError::MissingTransport("Transport".to_string()))?;
                self.transport = Some(Self::parse_transport(transport)?);

                let jack = response
                    .headers
                    .get(raop::AUDIO_JACK_STATUS)
                    .or_else(|| response.headers.get(raop::APPLE_JACK_STATUS));
                self.jack = Some(match jack {
                    Some(value) => JackStatus::parse(value),
                    None => {
                        tracing::warn!("SETUP reply has no jack status, assuming connected/digital");
                        JackStatus::default()
                    }
                });
                self.state = RaopSessionState::SetUp;
            }
            Method::Record => self.state = RaopSessionState::Recording,
            Method::Teardown => self.state = RaopSessionState::Terminated,
            Method::Flush | Method::SetParameter => {}
        }

        Ok(())
    }

    /// Parse a reply `Transport` header such as
    /// `RTP/AVP/UDP;unicast;mode=record;server_port=6000;control_port=6001;timing_port=6002`
    pub(crate) fn parse_transport(transport: &str) -> Result<RaopTransport, RaopError> {
        let mut parsed = RaopTransport::default();

        for part in transport.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let port = value.trim().parse().unwrap_or(0);
                match key {
                    "server_port" => parsed.server_port = port,
                    "control_port" => parsed.control_port = port,
                    "timing_port" => parsed.timing_port = port,
                    _ => {}
                }
            }
        }

        if parsed.server_port == 0 {
            return Err(RaopError::MissingTransport("server_port".to_string()));
        }

        Ok(parsed)
    }
}

/// Random per-connection identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentifiers {
    /// Session ID used in the request URL and SDP origin
    pub sid: String,
    /// `Client-Instance` header value (16 hex digits)
    pub client_instance: String,
    /// `Apple-Challenge` header value (unpadded Base64 of 16 random bytes)
    pub challenge: String,
}

impl SessionIdentifiers {
    /// Generate identifiers for a connection in `mode`
    #[must_use]
    pub fn generate(mode: TransportMode) -> Self {
        use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD as BASE64};
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let sid = match mode {
            TransportMode::Datagram => format!("3420{}", rng.r#gen::<u16>()),
            TransportMode::Stream => rng.r#gen::<u32>().to_string(),
        };
        let challenge: [u8; 16] = rng.r#gen();

        Self {
            sid,
            client_instance: format!("{:016x}", rng.r#gen::<u64>()),
            challenge: BASE64.encode(challenge),
        }
    }
}
