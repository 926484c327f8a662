//! Restore phase: layer reconciliation and SBOM relocation

mod restorer;
pub mod sbom;

pub use restorer::Restorer;
pub use sbom::SbomRelocator;
