//! DAAP/DMAP metadata protocol for RAOP

mod dmap;
mod metadata;


pub use dmap::{DmapEncoder, DmapTag, DmapValue};
pub use metadata::TrackMetadata;
