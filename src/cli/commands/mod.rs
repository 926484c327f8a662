//! CLI command implementations

pub mod restore;
pub mod validate_stack;

pub use restore::execute as restore;
pub use validate_stack::execute as validate_stack;
