//! RTSP control channel for RAOP
//!
//! The message types and codec are sans-IO; `client` drives them over a
//! blocking TCP connection.

#![allow(missing_docs)]

pub mod client;
pub mod codec;
pub mod headers;
pub mod request;
pub mod response;

#[cfg(test)]
mod headers_tests;

pub use client::{ControlChannel, RtspClient, SetupResponse};
pub use codec::{RtspCodec, RtspCodecError};
pub use headers::Headers;
pub use request::{RtspRequest, RtspRequestBuilder};
pub use response::{RtspResponse, StatusCode};

/// RTSP methods a RAOP sender issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Capability probe
    Options,
    /// Announce stream information (SDP)
    Announce,
    /// Set up transport and session
    Setup,
    /// Start streaming
    Record,
    /// Drop buffered audio on the receiver
    Flush,
    /// Tear down session
    Teardown,
    /// Set parameter (volume, metadata)
    SetParameter,
}

impl Method {
    /// Convert to RTSP method string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
            Method::SetParameter => "SET_PARAMETER",
        }
    }

    /// Parse from string (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPTIONS" => Some(Method::Options),
            "ANNOUNCE" => Some(Method::Announce),
            "SETUP" => Some(Method::Setup),
            "RECORD" => Some(Method::Record),
            "FLUSH" => Some(Method::Flush),
            "TEARDOWN" => Some(Method::Teardown),
            "SET_PARAMETER" => Some(Method::SetParameter),
            _ => None,
        }
    }
}
