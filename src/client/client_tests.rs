use std::cell::RefCell;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::*;
use crate::audio::SampleChunk;
use crate::error::RaopError;
use crate::net::{EventHandler, Interest, Registry, SharedHandler};
use crate::protocol::rtp::RaopAudioPacket;
use crate::protocol::rtsp::Method;
use crate::testing::{ControlCall, MockControlChannel, MockReceiver};
use crate::types::{JackKind, JackStatus, RaopConfig, TransportMode};

fn test_config() -> RaopConfig {
    RaopConfig::builder()
        .local_ports(0, 0)
        .reactor_ceiling(Duration::from_millis(50))
        .keepalive_interval(Duration::from_millis(10))
        .build()
}

fn connected(mode: TransportMode, encrypt: bool) -> (RaopClient<MockControlChannel>, MockReceiver) {
    let mut receiver = MockReceiver::bind().unwrap();
    let control = MockControlChannel::new(receiver.setup_response(mode).unwrap());
    let mut client = RaopClient::with_control(test_config(), control);
    client.connect("127.0.0.1", 5000, encrypt, mode).unwrap();
    if mode == TransportMode::Stream {
        receiver.accept_stream().unwrap();
    }
    (client, receiver)
}

fn pump_until_written(client: &mut RaopClient<MockControlChannel>) {
    for _ in 0..20 {
        if client.pending_bytes() == 0 {
            return;
        }
        client.process_events().unwrap();
    }
    panic!("frame never completed");
}

#[test]
fn test_datagram_handshake_order() {
    let (client, mut receiver) = connected(TransportMode::Datagram, true);
    let calls = client.control().calls();

    assert!(matches!(calls[0], ControlCall::SetUserAgent(ref ua) if ua == "iTunes/7.6.2 (Windows; N;)"));
    assert!(matches!(calls[1], ControlCall::AddHeader(ref n, ref v) if n == "Client-Instance" && v.len() == 16));
    assert!(matches!(calls[2], ControlCall::Connect { port: 5000, ref sid, .. } if sid.starts_with("3420")));
    assert_eq!(calls[3], ControlCall::Options);
    assert!(matches!(calls[4], ControlCall::AddHeader(ref n, _) if n == "Apple-Challenge"));
    match &calls[5] {
        ControlCall::Announce { sdp, challenge } => {
            assert!(challenge.is_some());
            assert!(sdp.contains("a=rsaaeskey:"));
            assert!(sdp.contains("a=aesiv:"));
            assert!(sdp.contains("o=iTunes 3420"));
            assert!(sdp.contains("c=IN IP4 127.0.0.1\r\n"));
            let key_line = sdp.lines().find(|l| l.starts_with("a=rsaaeskey:")).unwrap();
            assert!(!key_line.ends_with('='));
        }
        other => panic!("expected ANNOUNCE, got {other:?}"),
    }
    assert_eq!(calls[6], ControlCall::RemoveHeader("Apple-Challenge".to_string()));
    match &calls[7] {
        ControlCall::Setup(offer) => {
            assert_eq!(offer.mode, TransportMode::Datagram);
            assert_ne!(offer.control_port, 0);
            assert_ne!(offer.timing_port, 0);
        }
        other => panic!("expected SETUP, got {other:?}"),
    }
    assert_eq!(calls[8], ControlCall::Record);
    assert_eq!(calls.len(), 9);

    assert!(client.is_connected());
    assert!(client.is_encrypted());
    assert_eq!(client.transport_mode(), Some(TransportMode::Datagram));
    assert_eq!(receiver.recv_timing().unwrap(), vec![0xFF]);
}

#[test]
fn test_stream_mode_skips_options_and_always_encrypts() {
    let (client, _receiver) = connected(TransportMode::Stream, false);
    let calls = client.control().calls();

    assert!(!calls.contains(&ControlCall::Options));
    assert!(calls.iter().any(|c| matches!(c, ControlCall::Setup(o) if o.mode == TransportMode::Stream)));
    assert!(client.is_encrypted());
}

#[test]
fn test_connect_twice_refused() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    let err = client
        .connect("127.0.0.1", 5000, false, TransportMode::Datagram)
        .unwrap_err();
    assert!(matches!(err, RaopError::AlreadyConnected));
}

#[test]
fn test_failed_announce_releases_session() {
    let receiver = MockReceiver::bind().unwrap();
    let control = MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap())
        .failing(Method::Announce);
    let mut client = RaopClient::with_control(test_config(), control);

    let err = client
        .connect("127.0.0.1", 5000, true, TransportMode::Datagram)
        .unwrap_err();
    assert!(matches!(err, RaopError::Rtsp { status_code: Some(500), .. }));
    assert!(!client.is_connected());
    let calls = client.control().calls();
    assert_eq!(calls[calls.len() - 1], ControlCall::Teardown);
    assert_eq!(
        calls[calls.len() - 2],
        ControlCall::RemoveHeader("Apple-Challenge".to_string())
    );
}

#[test]
fn test_volume_maps_onto_db_scale() {
    assert_eq!(volume_to_db(0).unwrap(), -144);
    assert_eq!(volume_to_db(50).unwrap(), -72);
    assert_eq!(volume_to_db(100).unwrap(), 0);
    assert!(matches!(volume_to_db(101), Err(RaopError::InvalidVolume(101))));
}

#[test]
fn test_update_volume_body() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, true);
    client.update_volume(50).unwrap();

    assert_eq!(
        client.control().calls().last(),
        Some(&ControlCall::SetParameter("volume: -72.000000\r\n".to_string()))
    );
    assert_eq!(client.volume(), Some(50));
}

#[test]
fn test_update_volume_requires_session() {
    let mut client = RaopClient::with_control(test_config(), MockControlChannel::default());
    assert!(matches!(client.update_volume(10), Err(RaopError::NotConnected)));
    assert!(matches!(client.update_volume(200), Err(RaopError::InvalidVolume(200))));
}

#[test]
fn test_send_sample_reaches_receiver() {
    let (mut client, mut receiver) = connected(TransportMode::Datagram, false);
    let chunk = SampleChunk::silence();

    let pending = client.send_sample(&chunk).unwrap();
    assert_eq!(pending, RaopAudioPacket::HEADER_SIZE + chunk.payload.len());
    assert_eq!(client.pending_bytes(), pending);
    pump_until_written(&mut client);

    let packet = RaopAudioPacket::decode(&receiver.recv_audio().unwrap()).unwrap();
    assert!(packet.marker);
    assert_eq!(packet.sequence, 0);
    assert_eq!(packet.timestamp, 0);
    assert_eq!(&packet.payload[..], &chunk.payload[..]);
    assert_eq!(client.rtp_timestamp(), Some(chunk.frames));
    assert_eq!(client.sequence(), Some(1));

    let data_fd = client.data_fd().unwrap();
    assert_eq!(client.reactor().registry().interest(data_fd), Some(Interest::READ));
}

#[test]
fn test_second_send_refused_while_in_flight() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    let chunk = SampleChunk::silence();

    let pending = client.send_sample(&chunk).unwrap();
    let err = client.send_sample(&chunk).unwrap_err();
    assert!(matches!(err, RaopError::FrameInFlight { remaining } if remaining == pending));
    assert_eq!(client.sequence(), Some(1));
}

#[test]
fn test_stream_frames_reach_receiver() {
    let (mut client, mut receiver) = connected(TransportMode::Stream, false);
    let chunk = SampleChunk::silence();

    client.send_sample(&chunk).unwrap();
    pump_until_written(&mut client);

    let frame = receiver.read_stream_frame().unwrap();
    assert_eq!(frame.len(), 16 + chunk.payload.len());
    assert_eq!(&frame[..2], &[0x24, 0x00]);
}

#[test]
fn test_user_pause_flushes_and_disarms_write() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    let data_fd = client.data_fd().unwrap();
    client.control_mut().clear_calls();

    client.set_pause(PauseState::UserPaused).unwrap();
    assert_eq!(client.pause_state(), PauseState::UserPaused);
    assert_eq!(
        client.control().calls(),
        &[ControlCall::Flush { seq: 0, rtptime: 0 }]
    );
    assert_eq!(client.reactor().registry().interest(data_fd), Some(Interest::READ));

    client.set_pause(PauseState::Playing).unwrap();
    assert_eq!(
        client.reactor().registry().interest(data_fd),
        Some(Interest::READ | Interest::WRITE)
    );
}

#[test]
fn test_user_pause_reflushes_after_interval() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    client.set_pause(PauseState::UserPaused).unwrap();
    client.control_mut().clear_calls();

    std::thread::sleep(Duration::from_millis(20));
    client.process_events().unwrap();
    assert!(matches!(client.control().calls(), [ControlCall::Flush { .. }]));
}

#[test]
fn test_invalid_transition_refused() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    client.set_pause(PauseState::UserPaused).unwrap();
    let err = client.set_pause(PauseState::BufferPaused).unwrap_err();
    assert!(matches!(err, RaopError::InvalidTransition { .. }));
    assert_eq!(client.pause_state(), PauseState::UserPaused);
}

#[test]
fn test_user_pause_refused_while_waiting_for_song_done() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    client.set_wait_song_done(true);
    assert!(client.set_pause(PauseState::UserPaused).is_err());
    assert_eq!(client.pause_state(), PauseState::Playing);
}

#[test]
fn test_buffer_pause_sends_silence_keepalive() {
    let (mut client, mut receiver) = connected(TransportMode::Datagram, false);
    client.set_pause(PauseState::BufferPaused).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    client.process_events().unwrap();
    assert!(client.pending_bytes() > 0);
    pump_until_written(&mut client);

    let packet = RaopAudioPacket::decode(&receiver.recv_audio().unwrap()).unwrap();
    assert_eq!(&packet.payload[..], &SampleChunk::silence().payload[..]);
    assert_eq!(client.pause_state(), PauseState::BufferPaused);

    client.set_pause(PauseState::Playing).unwrap();
    assert_eq!(client.pause_state(), PauseState::Playing);
}

#[test]
fn test_song_done_without_report_is_immediate() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    client.set_wait_song_done(true);
    assert_eq!(client.process_events().unwrap(), Some(StreamEvent::SongDone));
    assert!(!client.wait_song_done());
    assert_eq!(client.process_events().unwrap(), None);
}

#[test]
fn test_song_done_after_receiver_drains() {
    let (mut client, mut receiver) = connected(TransportMode::Datagram, false);
    client.send_sample(&SampleChunk::silence()).unwrap();
    pump_until_written(&mut client);
    receiver.recv_audio().unwrap();

    // 0.1 s of audio buffered on the receiver
    receiver.send_status(4410).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.buffer_drain_time().is_zero() {
        assert!(Instant::now() < deadline, "status report never arrived");
        client.process_events().unwrap();
    }
    assert!(client.buffer_drain_time() <= Duration::from_millis(100));

    client.set_wait_song_done(true);
    let started = Instant::now();
    let event = loop {
        assert!(Instant::now() < deadline, "song never finished");
        if let Some(event) = client.process_events().unwrap() {
            break event;
        }
    };
    assert_eq!(event, StreamEvent::SongDone);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(client.buffer_drain_time().is_zero());
}

#[test]
fn test_set_content_carries_rtptime() {
    let (mut client, mut receiver) = connected(TransportMode::Datagram, false);
    client.send_sample(&SampleChunk::silence()).unwrap();
    pump_until_written(&mut client);
    receiver.recv_audio().unwrap();

    client.set_content("Title", "Artist", "Album").unwrap();
    match client.control().calls().last() {
        Some(ControlCall::SetDaap { dmap, rtptime }) => {
            assert_eq!(&dmap[..4], b"mlit");
            assert_eq!(*rtptime, 32);
        }
        other => panic!("expected metadata, got {other:?}"),
    }
}

#[test]
fn test_jack_status_from_setup() {
    let receiver = MockReceiver::bind().unwrap().with_jack(JackStatus {
        connected: false,
        kind: JackKind::Analog,
    });
    let control = MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap());
    let mut client = RaopClient::with_control(test_config(), control);
    assert_eq!(client.jack_status(), None);

    client
        .connect("127.0.0.1", 5000, false, TransportMode::Datagram)
        .unwrap();
    assert_eq!(
        client.jack_status(),
        Some(JackStatus {
            connected: false,
            kind: JackKind::Analog
        })
    );
}

struct CountingHandler {
    calls: usize,
}

impl EventHandler for CountingHandler {
    fn handle_event(&mut self, _fd: RawFd, _ready: Interest, _registry: &mut Registry) -> crate::error::Result<()> {
        self.calls += 1;
        Ok(())
    }
}

#[test]
fn test_close_stops_handler_invocations() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    let (local, _peer) = UnixStream::pair().unwrap();
    let counter = Rc::new(RefCell::new(CountingHandler { calls: 0 }));
    let handler: SharedHandler = counter.clone();
    client.register(local.as_raw_fd(), Interest::WRITE, handler);

    client.process_events().unwrap();
    assert_eq!(counter.borrow().calls, 1);

    client.set_pause(PauseState::BufferPaused).unwrap();
    client.close().unwrap();
    assert!(!client.is_connected());
    assert_eq!(client.pause_state(), PauseState::Playing);
    assert!(client.reactor().registry().is_empty());
    assert_eq!(client.control().calls().last(), Some(&ControlCall::Teardown));

    client.process_events().unwrap();
    assert_eq!(counter.borrow().calls, 1);
}

#[test]
fn test_close_unconnected_is_noop() {
    let mut client = RaopClient::with_control(test_config(), MockControlChannel::default());
    client.close().unwrap();
    assert!(client.control().calls().is_empty());
    assert!(matches!(client.send_sample(&SampleChunk::silence()), Err(RaopError::NotConnected)));
    assert_eq!(client.buffer_drain_time(), Duration::ZERO);
}

#[test]
fn test_reconnect_after_close() {
    let (mut client, _receiver) = connected(TransportMode::Datagram, false);
    client.close().unwrap();

    let receiver = MockReceiver::bind().unwrap();
    *client.control_mut() =
        MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap());
    client
        .connect("127.0.0.1", 5000, false, TransportMode::Datagram)
        .unwrap();
    assert_eq!(client.sequence(), Some(0));
    assert_eq!(client.rtp_timestamp(), Some(0));
}

#[test]
fn test_connect_host_uses_configured_port() {
    let receiver = MockReceiver::bind().unwrap();
    let control = MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap());
    let config = RaopConfig::builder()
        .rtsp_port(7000)
        .local_ports(0, 0)
        .reactor_ceiling(Duration::from_millis(50))
        .build();
    let mut client = RaopClient::with_control(config, control);

    client
        .connect_host("127.0.0.1", false, TransportMode::Datagram)
        .unwrap();
    assert!(client.is_connected());
    assert!(
        client
            .control()
            .calls()
            .iter()
            .any(|c| matches!(c, ControlCall::Connect { port: 7000, .. }))
    );
}

#[test]
fn test_chunk_layout_reaches_sdp_and_keepalive() {
    let mut receiver = MockReceiver::bind().unwrap();
    let control = MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap());
    let config = RaopConfig::builder()
        .local_ports(0, 0)
        .reactor_ceiling(Duration::from_millis(50))
        .keepalive_interval(Duration::from_millis(10))
        .chunk_samples(352, 64)
        .build();
    let mut client = RaopClient::with_control(config, control);
    client
        .connect("127.0.0.1", 5000, false, TransportMode::Datagram)
        .unwrap();

    let sdp = client
        .control()
        .calls()
        .iter()
        .find_map(|c| match c {
            ControlCall::Announce { sdp, .. } => Some(sdp.clone()),
            _ => None,
        })
        .unwrap();
    assert!(sdp.contains("a=fmtp:96 352 0 16 "));

    client.set_pause(PauseState::BufferPaused).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    client.process_events().unwrap();
    pump_until_written(&mut client);

    let layout = client.frame_layout();
    let packet = RaopAudioPacket::decode(&receiver.recv_audio().unwrap()).unwrap();
    assert_eq!(&packet.payload[..], &layout.silence().payload[..]);
    assert_eq!(packet.payload.len(), layout.encoded_len(64));
}

#[test]
fn test_connect_keeps_caller_registrations() {
    let receiver = MockReceiver::bind().unwrap();
    let control = MockControlChannel::new(receiver.setup_response(TransportMode::Datagram).unwrap());
    let mut client = RaopClient::with_control(test_config(), control);

    let (local, _peer) = UnixStream::pair().unwrap();
    let counter = Rc::new(RefCell::new(CountingHandler { calls: 0 }));
    let handler: SharedHandler = counter.clone();
    client.register(local.as_raw_fd(), Interest::WRITE, handler);

    client
        .connect("127.0.0.1", 5000, false, TransportMode::Datagram)
        .unwrap();
    let data_fd = client.data_fd().unwrap();
    assert!(client.reactor().registry().contains(local.as_raw_fd()));
    assert!(client.reactor().registry().contains(data_fd));

    client.process_events().unwrap();
    assert_eq!(counter.borrow().calls, 1);
}
