//! Kiln - buildpack layer cache restorer
//!
//! Reconciles a buildpack layers directory with a content-addressed layer
//! cache and validates run image stack compatibility.

pub mod api;
pub mod buildpack;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod layer;
pub mod log;
pub mod platform;
pub mod restore;
pub mod stack;

pub use error::{KilnError, KilnResult};
