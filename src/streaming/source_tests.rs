use std::io::Write;
use std::net::{TcpListener, TcpStream};

use super::source::*;
use crate::audio::alac::encoded_len;
use crate::audio::{ChannelConfig, FrameLayout, PcmFormat, encode_uncompressed};

fn stereo_pcm(frames: usize) -> Vec<u8> {
    (0..frames * 4).map(|i| (i % 256) as u8).collect()
}

#[test]
fn test_memory_source_full_then_short_chunk() {
    let pcm = stereo_pcm(4096 + 100);
    let mut source = PcmSource::from_bytes(pcm.clone(), PcmFormat::CD_QUALITY);

    assert!(source.poll_available().unwrap());
    let full = source.next_chunk().unwrap().unwrap();
    assert_eq!(full.frames, 4096);
    assert_eq!(full.payload.len(), encoded_len(4096));
    assert_eq!(
        full.payload,
        encode_uncompressed(&pcm[..4096 * 4], 4096, ChannelConfig::Stereo)
    );

    let tail = source.next_chunk().unwrap().unwrap();
    assert_eq!(tail.frames, 100);
    assert_eq!(tail.payload.len(), encoded_len(100));

    assert!(source.next_chunk().unwrap().is_none());
    assert!(source.is_exhausted());
    assert!(!source.poll_available().unwrap());
}

#[test]
fn test_tiny_read_padded_to_minimum() {
    let mut source = PcmSource::from_bytes(stereo_pcm(5), PcmFormat::CD_QUALITY);
    let chunk = source.next_chunk().unwrap().unwrap();
    assert_eq!(chunk.frames, 32);
    assert_eq!(chunk.payload.len(), encoded_len(32));
}

#[test]
fn test_empty_source_is_exhausted() {
    let mut source = PcmSource::from_bytes(Vec::new(), PcmFormat::CD_QUALITY);
    assert!(source.next_chunk().unwrap().is_none());
    assert!(source.next_chunk().unwrap().is_none());
}

#[test]
fn test_mono_reads_half_the_bytes() {
    let format = PcmFormat {
        channels: ChannelConfig::Mono,
        sample_rate: 44100,
    };
    let mut source = PcmSource::from_bytes(vec![0x11; 4096 * 2], format);
    let chunk = source.next_chunk().unwrap().unwrap();
    assert_eq!(chunk.frames, 4096);
    assert!(source.next_chunk().unwrap().is_none());
}

#[test]
fn test_custom_layout() {
    let layout = FrameLayout::new(352, 32);
    let mut source =
        PcmSource::from_bytes(stereo_pcm(1000), PcmFormat::CD_QUALITY).with_layout(layout);
    let chunks: Vec<_> = std::iter::from_fn(|| source.next_chunk().unwrap()).collect();

    let frames: Vec<u32> = chunks.iter().map(|c| c.frames).collect();
    assert_eq!(frames, vec![352, 352, 296]);
    // A full chunk of the custom layout carries no size field
    assert_eq!(chunks[0].payload.len(), layout.encoded_len(352));
    assert_eq!(chunks[0].payload.len(), (23 + 352 * 32usize).div_ceil(8));
    assert_eq!(chunks[2].payload.len(), layout.encoded_len(296));
}

#[test]
fn test_trailing_partial_frame_dropped_at_end() {
    let mut source = PcmSource::from_bytes(vec![1u8; 10], PcmFormat::CD_QUALITY)
        .with_layout(FrameLayout::new(4, 1));

    let chunk = source.next_chunk().unwrap().unwrap();
    assert_eq!(chunk.frames, 2);
    assert!(source.next_chunk().unwrap().is_none());
}

fn wait_readable(source: &mut PcmSource) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while !source.poll_available().unwrap() {
        assert!(std::time::Instant::now() < deadline);
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[test]
fn test_socket_frame_split_across_reads() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut producer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let layout = FrameLayout::new(4, 1);
    let mut source = PcmSource::accept(&listener, PcmFormat::CD_QUALITY)
        .unwrap()
        .with_layout(layout);

    // One and a half frames
    producer.write_all(&[1, 0, 2, 0, 3, 0]).unwrap();
    wait_readable(&mut source);
    let first = source.next_chunk().unwrap().unwrap();
    assert_eq!(first, layout.chunk(&[1, 0, 2, 0], 1, ChannelConfig::Stereo));

    // The held-back left sample pairs with the next read
    producer.write_all(&[4, 0, 5, 0, 6, 0]).unwrap();
    wait_readable(&mut source);
    let second = source.next_chunk().unwrap().unwrap();
    assert_eq!(second.frames, 2);
    assert_eq!(
        second,
        layout.chunk(&[3, 0, 4, 0, 5, 0, 6, 0], 2, ChannelConfig::Stereo)
    );
}

#[test]
fn test_file_source() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&stereo_pcm(4096 * 2)).unwrap();
    file.flush().unwrap();

    let mut source = PcmSource::open(file.path(), PcmFormat::CD_QUALITY).unwrap();
    assert!(source.poll_available().unwrap());
    assert_eq!(source.next_chunk().unwrap().unwrap().frames, 4096);
    assert_eq!(source.next_chunk().unwrap().unwrap().frames, 4096);
    // End of file still polls readable; the empty read ends the source
    assert!(source.poll_available().unwrap());
    assert!(source.next_chunk().unwrap().is_none());
}

#[test]
fn test_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(PcmSource::open(dir.path().join("missing.pcm"), PcmFormat::CD_QUALITY).is_err());
}

#[test]
fn test_socket_source_readiness() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut producer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let mut source = PcmSource::accept(&listener, PcmFormat::CD_QUALITY).unwrap();

    assert!(!source.poll_available().unwrap());

    producer.write_all(&stereo_pcm(64)).unwrap();
    producer.flush().unwrap();
    wait_readable(&mut source);
    let chunk = source.next_chunk().unwrap().unwrap();
    assert!(chunk.frames >= 32);

    drop(producer);
    let mut saw_end = false;
    for _ in 0..10 {
        if source.next_chunk().unwrap().is_none() {
            saw_end = true;
            break;
        }
    }
    assert!(saw_end);
}
