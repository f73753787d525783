use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use super::framer::StreamClock;
use super::timing::*;
use crate::protocol::rtp::{NtpTimestamp, SyncPacket, TimingRequest, TimingResponse};

struct Peers {
    receiver_control: UdpSocket,
    receiver_timing: UdpSocket,
    control: UdpSocket,
    timing: UdpSocket,
}

fn peers() -> Peers {
    let receiver_control = UdpSocket::bind("127.0.0.1:0").unwrap();
    let receiver_timing = UdpSocket::bind("127.0.0.1:0").unwrap();
    let control = UdpSocket::bind("127.0.0.1:0").unwrap();
    let timing = UdpSocket::bind("127.0.0.1:0").unwrap();
    control
        .connect(receiver_control.local_addr().unwrap())
        .unwrap();
    timing.connect(receiver_timing.local_addr().unwrap()).unwrap();
    for socket in [&receiver_control, &receiver_timing] {
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
    }
    Peers {
        receiver_control,
        receiver_timing,
        control,
        timing,
    }
}

#[test]
fn test_sync_frames_carry_shared_clock() {
    let peers = peers();
    let clock = Arc::new(StreamClock::new(0));
    let mut sync = TimingSynchronizer::start(
        peers.control,
        peers.timing,
        Arc::clone(&clock),
        Duration::from_millis(50),
    )
    .unwrap();

    let mut buf = [0u8; 64];
    let n = peers.receiver_control.recv(&mut buf).unwrap();
    let first = SyncPacket::decode(&buf[..n]).unwrap();
    assert_eq!(n, SyncPacket::SIZE);
    assert_eq!(first.next_timestamp, first.rtp_timestamp.wrapping_add(352));

    clock.advance(44100);
    // Skip frames sent before the advance
    let advanced = loop {
        let n = peers.receiver_control.recv(&mut buf).unwrap();
        let packet = SyncPacket::decode(&buf[..n]).unwrap();
        if packet.rtp_timestamp == 44100 {
            break packet;
        }
    };
    assert_eq!(advanced.next_timestamp, 44452);

    sync.stop();
    assert!(!sync.is_running());
}

#[test]
fn test_timing_request_answered() {
    let peers = peers();
    let clock = Arc::new(StreamClock::default());
    let receiver_timing = peers.receiver_timing;
    receiver_timing
        .connect(peers.timing.local_addr().unwrap())
        .unwrap();
    let mut sync =
        TimingSynchronizer::start(peers.control, peers.timing, clock, SYNC_INTERVAL).unwrap();

    let sent = NtpTimestamp::from_unix(1_700_000_000, 123_456);
    receiver_timing
        .send(&TimingRequest { send_time: sent }.encode())
        .unwrap();

    let mut buf = [0u8; 64];
    let n = receiver_timing.recv(&mut buf).unwrap();
    let response = TimingResponse::decode(&buf[..n]).unwrap();
    assert_eq!(n, TimingResponse::SIZE);
    assert_eq!(response.reference_time, sent);
    assert_eq!(response.receive_time, response.send_time);

    sync.stop();
}

#[test]
fn test_short_timing_request_ignored() {
    let peers = peers();
    let receiver_timing = peers.receiver_timing;
    receiver_timing
        .connect(peers.timing.local_addr().unwrap())
        .unwrap();
    receiver_timing
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut sync = TimingSynchronizer::start(
        peers.control,
        peers.timing,
        Arc::new(StreamClock::default()),
        SYNC_INTERVAL,
    )
    .unwrap();

    receiver_timing.send(&[0x80, 0xD2, 0x00]).unwrap();
    let mut buf = [0u8; 64];
    assert!(receiver_timing.recv(&mut buf).is_err());

    sync.stop();
}

#[test]
fn test_stop_is_idempotent() {
    let peers = peers();
    let mut sync = TimingSynchronizer::start(
        peers.control,
        peers.timing,
        Arc::new(StreamClock::default()),
        SYNC_INTERVAL,
    )
    .unwrap();
    assert!(sync.is_running());
    sync.stop();
    sync.stop();
    assert!(!sync.is_running());
}
