use super::{Headers, RtspResponse, StatusCode};
use thiserror::Error;

/// Errors during RTSP parsing
#[derive(Debug, Error)]
pub enum RtspCodecError {
    #[error("invalid status line: {0}")]
    InvalidStatusLine(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Status line and headers of a response whose body is still arriving
#[derive(Debug)]
struct Head {
    version: String,
    status: StatusCode,
    reason: String,
    headers: Headers,
    content_length: usize,
}

/// Sans-IO RTSP response parser
///
/// Feed bytes with `feed()` as they arrive, then call `decode()` until it
/// returns `Ok(None)`.
pub struct RtspCodec {
    buffer: Vec<u8>,
    max_size: usize,
    head: Option<Head>,
}

impl RtspCodec {
    /// Create a new codec
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
            max_size: 64 * 1024,
            head: None,
        }
    }

    /// Set maximum buffered size
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Feed bytes into the codec
    ///
    /// # Errors
    /// Returns `RtspCodecError::ResponseTooLarge` if the buffer would exceed `max_size`.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), RtspCodecError> {
        let size = self.buffer.len() + bytes.len();
        if size > self.max_size {
            return Err(RtspCodecError::ResponseTooLarge { size });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Try to decode one complete response
    ///
    /// # Errors
    /// Returns `RtspCodecError` if the status line or a header is malformed.
    pub fn decode(&mut self) -> Result<Option<RtspResponse>, RtspCodecError> {
        if self.head.is_none() {
            let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
                return Ok(None);
            };
            let text = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.drain(..end + 4);
            self.head = Some(Self::parse_head(&text)?);
        }

        let Some(head) = self.head.as_ref() else {
            return Ok(None);
        };
        if self.buffer.len() < head.content_length {
            return Ok(None);
        }

        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        let body = self.buffer.drain(..head.content_length).collect();

        Ok(Some(RtspResponse {
            version: head.version,
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        }))
    }

    /// Clear the codec buffer and reset state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.head = None;
    }

    /// Get current buffer length
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn parse_head(text: &str) -> Result<Head, RtspCodecError> {
        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or_default();

        // "RTSP/1.0 200 OK"
        let mut parts = status_line.splitn(3, ' ');
        let version = parts
            .next()
            .filter(|v| v.starts_with("RTSP/"))
            .ok_or_else(|| RtspCodecError::InvalidStatusLine(status_line.to_string()))?
            .to_string();
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| RtspCodecError::InvalidStatusLine(status_line.to_string()))?;
        let reason = parts.next().unwrap_or_default().to_string();

        let mut headers = Headers::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RtspCodecError::InvalidHeader(line.to_string()))?;
            headers.insert(name.trim(), value.trim());
        }

        let content_length = headers.content_length().unwrap_or(0);

        Ok(Head {
            version,
            status: StatusCode(status),
            reason,
            headers,
            content_length,
        })
    }
}

impl Default for RtspCodec {
    fn default() -> Self {
        Self::new()
    }
}
