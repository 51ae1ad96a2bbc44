//! CLI command implementations

pub mod artifacts;
pub mod invoke;
pub mod list;
