//! DMAP (Digital Media Access Protocol) encoding

use std::fmt;

/// DMAP content codes (tags)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmapTag {
    /// Item name (track title)
    ItemName,
    /// Song artist
    SongArtist,
    /// Song album
    SongAlbum,
    /// Listing item
    ListingItem,
    /// Unknown tag
    Unknown([u8; 4]),
}

impl DmapTag {
    /// Get 4-character code for tag
    #[must_use]
    pub fn code(&self) -> [u8; 4] {
        match self {
            Self::ItemName => *b"minm",
            Self::SongArtist => *b"asar",
            Self::SongAlbum => *b"asal",
            Self::ListingItem => *b"mlit",
            Self::Unknown(code) => *code,
        }
    }

    /// Create tag from bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"minm" => Self::ItemName,
            b"asar" => Self::SongArtist,
            b"asal" => Self::SongAlbum,
            b"mlit" => Self::ListingItem,
            _ => Self::Unknown(bytes),
        }
    }
}

impl fmt::Display for DmapTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        let s = std::str::from_utf8(&code).unwrap_or("????");
        write!(f, "{s}")
    }
}

/// DMAP value types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmapValue {
    /// NUL-terminated string; the length field counts the terminator
    CString(String),
    /// Container (nested DMAP)
    Container(Vec<(DmapTag, DmapValue)>),
    /// Raw bytes
    Raw(Vec<u8>),
}

/// DMAP encoder
pub struct DmapEncoder {
    buffer: Vec<u8>,
}

impl DmapEncoder {
    /// Create new encoder
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn put_len(&mut self, len: usize) {
        #[allow(clippy::cast_possible_truncation)]
        self.buffer.extend_from_slice(&(len as u32).to_be_bytes());
    }

    /// Encode a tag-value pair
    pub fn encode_tag(&mut self, tag: DmapTag, value: &DmapValue) {
        self.buffer.extend_from_slice(&tag.code());

        match value {
            DmapValue::CString(s) => {
                self.put_len(s.len() + 1);
                self.buffer.extend_from_slice(s.as_bytes());
                self.buffer.push(0);
            }
            DmapValue::Container(items) => {
                let mut inner = DmapEncoder::new();
                for (inner_tag, inner_value) in items {
                    inner.encode_tag(*inner_tag, inner_value);
                }
                let inner_data = inner.finish();

                self.put_len(inner_data.len());
                self.buffer.extend_from_slice(&inner_data);
            }
            DmapValue::Raw(data) => {
                self.put_len(data.len());
                self.buffer.extend_from_slice(data);
            }
        }
    }

    /// Add string tag
    pub fn cstring(&mut self, tag: DmapTag, value: &str) {
        self.encode_tag(tag, &DmapValue::CString(value.to_string()));
    }

    /// Finish encoding and return bytes
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for DmapEncoder {
    fn default() -> Self {
        Self::new()
    }
}
