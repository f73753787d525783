//! Scripted control channel that records every call

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{RaopError, Result};
use crate::protocol::raop::{RaopTransport, TransportOffer};
use crate::protocol::rtsp::{ControlChannel, Method, SetupResponse};
use crate::types::JackStatus;

/// One call made on the control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    /// `set_user_agent`
    SetUserAgent(String),
    /// `add_header`
    AddHeader(String, String),
    /// `remove_header`
    RemoveHeader(String),
    /// `connect`
    Connect {
        /// Receiver host
        host: String,
        /// Receiver RTSP port
        port: u16,
        /// Session id
        sid: String,
    },
    /// OPTIONS
    Options,
    /// ANNOUNCE, with the `Apple-Challenge` header in force at the time
    Announce {
        /// SDP body
        sdp: String,
        /// Challenge header, if set
        challenge: Option<String>,
    },
    /// SETUP
    Setup(TransportOffer),
    /// RECORD
    Record,
    /// SET_PARAMETER with a text body
    SetParameter(String),
    /// SET_PARAMETER with DMAP metadata
    SetDaap {
        /// Encoded DMAP
        dmap: Vec<u8>,
        /// RTP timestamp the metadata applies from
        rtptime: u32,
    },
    /// FLUSH
    Flush {
        /// Next sequence number
        seq: u16,
        /// Current RTP timestamp
        rtptime: u32,
    },
    /// TEARDOWN
    Teardown,
}

/// In-memory `ControlChannel` for driving `RaopClient` without a receiver
#[derive(Debug, Clone)]
pub struct MockControlChannel {
    calls: Vec<ControlCall>,
    headers: Vec<(String, String)>,
    setup: SetupResponse,
    local_ip: IpAddr,
    fail: Option<Method>,
    connected: bool,
}

impl Default for MockControlChannel {
    fn default() -> Self {
        Self::new(SetupResponse {
            transport: RaopTransport::default(),
            jack: JackStatus::default(),
        })
    }
}

impl MockControlChannel {
    /// Mock answering SETUP with `setup`
    #[must_use]
    pub fn new(setup: SetupResponse) -> Self {
        Self {
            calls: Vec::new(),
            headers: Vec::new(),
            setup,
            local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            fail: None,
            connected: false,
        }
    }

    /// Make `method` fail with a 500 reply
    #[must_use]
    pub fn failing(mut self, method: Method) -> Self {
        self.fail = Some(method);
        self
    }

    /// Every call so far, in order
    #[must_use]
    pub fn calls(&self) -> &[ControlCall] {
        &self.calls
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Extra headers currently in force
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Whether `connect` succeeded and no TEARDOWN followed
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn exchange(&mut self, method: Method, call: ControlCall) -> Result<()> {
        self.calls.push(call);
        if !self.connected {
            return Err(RaopError::NotConnected);
        }
        if self.fail == Some(method) {
            return Err(RaopError::Rtsp {
                message: format!("{} failed: 500 Internal Server Error", method.as_str()),
                status_code: Some(500),
            });
        }
        Ok(())
    }
}

impl ControlChannel for MockControlChannel {
    fn set_user_agent(&mut self, agent: &str) {
        self.calls.push(ControlCall::SetUserAgent(agent.to_string()));
    }

    fn add_header(&mut self, name: &str, value: &str) {
        self.calls
            .push(ControlCall::AddHeader(name.to_string(), value.to_string()));
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn remove_header(&mut self, name: &str) {
        self.calls.push(ControlCall::RemoveHeader(name.to_string()));
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    fn connect(&mut self, host: &str, port: u16, sid: &str) -> Result<()> {
        if self.connected {
            return Err(RaopError::AlreadyConnected);
        }
        self.calls.push(ControlCall::Connect {
            host: host.to_string(),
            port,
            sid: sid.to_string(),
        });
        self.connected = true;
        Ok(())
    }

    fn local_ip(&self) -> Option<IpAddr> {
        self.connected.then_some(self.local_ip)
    }

    fn options(&mut self) -> Result<()> {
        self.exchange(Method::Options, ControlCall::Options)
    }

    fn announce_sdp(&mut self, sdp: &str) -> Result<()> {
        let challenge = self.header("Apple-Challenge");
        self.exchange(
            Method::Announce,
            ControlCall::Announce {
                sdp: sdp.to_string(),
                challenge,
            },
        )
    }

    fn setup(&mut self, offer: &TransportOffer) -> Result<SetupResponse> {
        self.exchange(Method::Setup, ControlCall::Setup(*offer))?;
        Ok(self.setup)
    }

    fn record(&mut self) -> Result<()> {
        self.exchange(Method::Record, ControlCall::Record)
    }

    fn set_parameter(&mut self, body: &str) -> Result<()> {
        self.exchange(
            Method::SetParameter,
            ControlCall::SetParameter(body.to_string()),
        )
    }

    fn set_daap(&mut self, dmap: &[u8], rtptime: u32) -> Result<()> {
        self.exchange(
            Method::SetParameter,
            ControlCall::SetDaap {
                dmap: dmap.to_vec(),
                rtptime,
            },
        )
    }

    fn flush(&mut self, seq: u16, rtptime: u32) -> Result<()> {
        self.exchange(Method::Flush, ControlCall::Flush { seq, rtptime })
    }

    fn teardown(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.calls.push(ControlCall::Teardown);
        self.connected = false;
        Ok(())
    }
}
