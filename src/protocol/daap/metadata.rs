//! Track metadata for RAOP

use super::dmap::{DmapEncoder, DmapTag, DmapValue};

/// Track metadata pushed with `SET_PARAMETER`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Track title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Album name
    pub album: String,
}

impl TrackMetadata {
    /// Create metadata for one track
    #[must_use]
    pub fn new(title: &str, artist: &str, album: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        }
    }

    /// Encode as an `mlit` container holding `minm`, `asar` and `asal`
    ///
    /// All three items are always present, empty strings included.
    #[must_use]
    pub fn encode_dmap(&self) -> Vec<u8> {
        let items = vec![
            (DmapTag::ItemName, DmapValue::CString(self.title.clone())),
            (DmapTag::SongArtist, DmapValue::CString(self.artist.clone())),
            (DmapTag::SongAlbum, DmapValue::CString(self.album.clone())),
        ];

        let mut encoder = DmapEncoder::new();
        encoder.encode_tag(DmapTag::ListingItem, &DmapValue::Container(items));
        encoder.finish()
    }
}
