//! Audio source abstraction

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;

use crate::audio::{FrameLayout, PcmFormat, SampleChunk};
use crate::error::Result;
use crate::net::is_readable;

/// Port a listening PCM source accepts its producer on by default
pub const PCM_LISTEN_PORT: u16 = 4999;

/// Audio source that provides encoded chunks
pub trait AudioSource {
    /// Next chunk, or `None` once the source is exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails
    fn next_chunk(&mut self) -> Result<Option<SampleChunk>>;

    /// Non-blocking check whether `next_chunk` would return promptly
    ///
    /// # Errors
    ///
    /// Returns an error if the readiness probe fails
    fn poll_available(&mut self) -> Result<bool>;
}

enum PcmInput {
    File(File),
    Socket(TcpStream),
    Memory(Cursor<Vec<u8>>),
}

/// Raw 16-bit little-endian PCM wrapped into uncompressed ALAC chunks
///
/// Each read asks for one full chunk. Short reads become smaller chunks,
/// padded with silence up to the minimum chunk length; an empty read ends
/// the source. Bytes of a frame split across reads are held back for the
/// next chunk.
pub struct PcmSource {
    input: PcmInput,
    format: PcmFormat,
    layout: FrameLayout,
    leftover: Vec<u8>,
    exhausted: bool,
}

impl PcmSource {
    fn with_input(input: PcmInput, format: PcmFormat) -> Self {
        Self {
            input,
            format,
            layout: FrameLayout::default(),
            leftover: Vec::new(),
            exhausted: false,
        }
    }

    /// Read PCM from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened
    pub fn open(path: impl AsRef<Path>, format: PcmFormat) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        tracing::debug!("PCM source: {}", path.as_ref().display());
        Ok(Self::with_input(PcmInput::File(file), format))
    }

    /// Read PCM from an in-memory buffer
    #[must_use]
    pub fn from_bytes(data: Vec<u8>, format: PcmFormat) -> Self {
        Self::with_input(PcmInput::Memory(Cursor::new(data)), format)
    }

    /// Read PCM from an established TCP connection
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be configured
    pub fn from_stream(stream: TcpStream, format: PcmFormat) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self::with_input(PcmInput::Socket(stream), format))
    }

    /// Accept one producer on `listener` and read PCM from it
    ///
    /// Blocks until a producer connects.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting fails
    pub fn accept(listener: &TcpListener, format: PcmFormat) -> Result<Self> {
        let (stream, peer) = listener.accept()?;
        tracing::info!("PCM producer connected from {}", peer);
        Self::from_stream(stream, format)
    }

    /// Listen on `port` of every interface and accept one producer
    ///
    /// # Errors
    ///
    /// Returns an error if binding or accepting fails
    pub fn listen(port: u16, format: PcmFormat) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
        tracing::info!("listening for PCM on port {}", port);
        Self::accept(&listener, format)
    }

    /// Encode with the session's chunk lengths
    #[must_use]
    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Chunk lengths in use
    #[must_use]
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Input format
    #[must_use]
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Whether an empty read has been seen
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.input {
            // One receive per chunk; producers set the pace
            PcmInput::Socket(stream) => loop {
                match stream.read(buf) {
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    other => return other,
                }
            },
            PcmInput::File(file) => read_full(file, buf),
            PcmInput::Memory(cursor) => read_full(cursor, buf),
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl AudioSource for PcmSource {
    fn next_chunk(&mut self) -> Result<Option<SampleChunk>> {
        if self.exhausted {
            return Ok(None);
        }

        let frame_bytes = self.format.bytes_per_frame();
        let mut buf = vec![0u8; self.layout.full_frames as usize * frame_bytes];
        let held = self.leftover.len();
        buf[..held].copy_from_slice(&self.leftover);
        self.leftover.clear();

        let n = self.fill(&mut buf[held..])?;
        if n == 0 {
            if held > 0 {
                tracing::debug!("dropping {} bytes of a partial frame at end of input", held);
            }
            tracing::debug!("PCM source exhausted");
            self.exhausted = true;
            return Ok(None);
        }

        let total = held + n;
        let whole = total - total % frame_bytes;
        self.leftover.extend_from_slice(&buf[whole..total]);
        buf.truncate(whole);

        #[allow(clippy::cast_possible_truncation)]
        let read_frames = (whole / frame_bytes) as u32;
        let frames = if read_frames < self.layout.min_frames {
            tracing::debug!("short PCM read ({} bytes), padding with silence", n);
            self.layout.min_frames
        } else {
            read_frames
        };

        Ok(Some(self.layout.chunk(&buf, frames, self.format.channels)))
    }

    fn poll_available(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        Ok(match &self.input {
            PcmInput::File(file) => is_readable(file)?,
            PcmInput::Socket(stream) => is_readable(stream)?,
            // Never blocks; the end shows up as an empty read
            PcmInput::Memory(_) => true,
        })
    }
}
