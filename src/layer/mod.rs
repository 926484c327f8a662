//! Layer content handling
//!
//! Archives move layer data in and out of the cache, the hash store tells
//! whether on-disk data still matches what was cached, and the metadata
//! restorer recreates layer descriptors from earlier builds.

pub mod archive;
pub mod metadata_restorer;
pub mod sha_store;

pub use archive::{digest_layer_dir, extract_layer, write_layer_tar};
pub use metadata_restorer::{LayerMetadataRestorer, MetadataRestorer};
pub use sha_store::LayerShaStore;
