//! Documents exchanged with the platform and earlier lifecycle phases

pub mod metadata;
pub mod stack;

pub use metadata::{
    read_analyzed, AnalyzedMetadata, BuildpackLayerMetadata, BuildpackLayersMetadata,
    CacheMetadata, LayerMetadataMap, LayersMetadata,
};
pub use stack::{
    read_stack_metadata, registry_of, BuildImageMetadata, RunImageMetadata, StackMetadata,
    STACK_ID_LABEL,
};
