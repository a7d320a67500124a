//! Reversible compression: markers, manifests, the compressor and expander,
//! and disk-backed persistence

mod compressor;
mod expander;
mod manifest;
pub mod marker;
mod storage;

pub use compressor::{CompressionResult, Compressor};
pub use expander::{ExpansionResult, Expander};
pub use manifest::{CompressionManifest, ManifestEntry, ManifestRecord};
pub use marker::{find_markers, Marker, MarkerSpan};
pub use storage::DiskStore;
