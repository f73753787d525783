use super::session::*;
use crate::error::RaopError;
use crate::protocol::rtsp::{Method, RtspCodec, RtspResponse, headers::raop};
use crate::types::{JackKind, TransportMode};

fn response(text: &str) -> RtspResponse {
    let mut codec = RtspCodec::new();
    codec.feed(text.as_bytes()).unwrap();
    codec.decode().unwrap().unwrap()
}

fn encoded(request: &crate::protocol::rtsp::RtspRequest) -> String {
    String::from_utf8(request.encode()).unwrap()
}

#[test]
fn test_cseq_increments_and_user_agent() {
    let mut session = RaopRtspSession::new("10.0.0.5", "342012345", "iTunes/7.6.2 (Windows; N;)");

    let first = session.options_request();
    let second = session.options_request();

    assert_eq!(first.headers.cseq(), Some(1));
    assert_eq!(second.headers.cseq(), Some(2));
    assert_eq!(
        first.headers.get("User-Agent"),
        Some("iTunes/7.6.2 (Windows; N;)")
    );
    assert_eq!(first.uri, "*");
}

#[test]
fn test_announce_uses_session_url() {
    let mut session = RaopRtspSession::new("10.0.0.5", "342012345", "ua");
    let request = session.announce_request("v=0\r\n");

    assert_eq!(request.uri, "rtsp://10.0.0.5/342012345");
    assert_eq!(request.headers.get("Content-Type"), Some("application/sdp"));
    assert_eq!(request.body, b"v=0\r\n");
}

#[test]
fn test_extra_headers_added_and_removed() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    session.add_header(raop::CLIENT_INSTANCE, "0123456789abcdef");
    session.add_header(raop::APPLE_CHALLENGE, "Y2hhbGxlbmdl");

    let announce = session.announce_request("");
    assert!(announce.headers.contains(raop::APPLE_CHALLENGE));

    session.remove_header(raop::APPLE_CHALLENGE);
    let setup = session.setup_request(&TransportOffer {
        mode: TransportMode::Datagram,
        control_port: 6001,
        timing_port: 6002,
    });
    assert!(!setup.headers.contains(raop::APPLE_CHALLENGE));
    assert_eq!(
        setup.headers.get(raop::CLIENT_INSTANCE),
        Some("0123456789abcdef")
    );
}

#[test]
fn test_setup_transport_header() {
    let datagram = TransportOffer {
        mode: TransportMode::Datagram,
        control_port: 6001,
        timing_port: 6002,
    };
    assert_eq!(
        datagram.header_value(),
        "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port=6001;timing_port=6002"
    );

    let stream = TransportOffer {
        mode: TransportMode::Stream,
        ..datagram
    };
    assert_eq!(
        stream.header_value(),
        "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record"
    );
}

#[test]
fn test_setup_reply_parsed() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let reply = response(
        "RTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 1A2B\r\n\
         Transport: RTP/AVP/UDP;unicast;mode=record;server_port=53561;control_port=63379;timing_port=50607\r\n\
         Audio-Jack-Status: connected; type=analog\r\n\r\n",
    );

    session.process_response(Method::Setup, &reply).unwrap();

    let transport = session.transport().unwrap();
    assert_eq!(transport.server_port, 53561);
    assert_eq!(transport.control_port, 63379);
    assert_eq!(transport.timing_port, 50607);
    assert_eq!(session.session_id(), Some("1A2B"));
    assert_eq!(session.state(), RaopSessionState::SetUp);

    let jack = session.jack_status().unwrap();
    assert!(jack.connected);
    assert_eq!(jack.kind, JackKind::Analog);

    let record = session.record_request();
    assert_eq!(record.headers.session(), Some("1A2B"));
    assert_eq!(record.headers.get("Range"), Some("npt=0-"));
    assert_eq!(record.headers.get("RTP-Info"), Some("seq=0;rtptime=0"));
}

#[test]
fn test_setup_reply_without_jack_defaults() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let reply = response(
        "RTSP/1.0 200 OK\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;server_port=6000\r\n\r\n",
    );

    session.process_response(Method::Setup, &reply).unwrap();

    let jack = session.jack_status().unwrap();
    assert!(jack.connected);
    assert_eq!(jack.kind, JackKind::Digital);
}

#[test]
fn test_apple_jack_status_spelling() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let reply = response(
        "RTSP/1.0 200 OK\r\nTransport: server_port=6000\r\nApple-Jack-Status: disconnected\r\n\r\n",
    );

    session.process_response(Method::Setup, &reply).unwrap();
    assert!(!session.jack_status().unwrap().connected);
}

#[test]
fn test_setup_without_server_port_fails() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let reply = response("RTSP/1.0 200 OK\r\nTransport: RTP/AVP/UDP;control_port=1\r\n\r\n");

    assert!(matches!(
        session.process_response(Method::Setup, &reply),
        Err(RaopError::MissingTransport(_))
    ));
}

#[test]
fn test_error_status_is_rtsp_error() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let reply = response("RTSP/1.0 453 Not Enough Bandwidth\r\nCSeq: 2\r\n\r\n");

    match session.process_response(Method::Announce, &reply) {
        Err(RaopError::Rtsp { status_code, .. }) => assert_eq!(status_code, Some(453)),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_daap_and_flush_headers() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");

    let daap = session.set_daap_request(b"mlit", 88200);
    assert_eq!(
        daap.headers.get("Content-Type"),
        Some("application/x-dmap-tagged")
    );
    assert_eq!(daap.headers.get("RTP-Info"), Some("rtptime=88200"));

    let flush = session.flush_request(12, 4096);
    assert_eq!(flush.headers.get("RTP-Info"), Some("seq=12;rtptime=4096"));
    assert!(encoded(&flush).starts_with("FLUSH rtsp://10.0.0.5/1 RTSP/1.0\r\n"));
}

#[test]
fn test_volume_body() {
    let mut session = RaopRtspSession::new("10.0.0.5", "1", "ua");
    let request = session.set_parameter_request("volume: -72.000000\r\n");

    assert_eq!(request.headers.get("Content-Type"), Some("text/parameters"));
    assert!(encoded(&request).ends_with("\r\n\r\nvolume: -72.000000\r\n"));
}

#[test]
fn test_identifiers_shape() {
    let ids = SessionIdentifiers::generate(TransportMode::Datagram);
    assert!(ids.sid.starts_with("3420"));
    assert_eq!(ids.client_instance.len(), 16);
    assert!(ids.client_instance.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!ids.challenge.contains('='));
    assert_eq!(ids.challenge.len(), 22);

    let ids = SessionIdentifiers::generate(TransportMode::Stream);
    assert!(ids.sid.parse::<u32>().is_ok());
}
