//! Buildpack group and on-disk layer discovery
//!
//! Each buildpack in the group owns `<layers_dir>/<escaped id>/`, which
//! holds one `<layer>.toml` descriptor plus a `<layer>/` directory per layer.

pub mod group;
pub mod layers;

pub use group::{escape_id, read_group, BuildpackGroup, GroupBuildpack};
pub use layers::{BuildpackLayersDir, CacheClassifier, Layer, LayerDescriptor, LayerTypes};
