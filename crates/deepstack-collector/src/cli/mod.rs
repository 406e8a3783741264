//! CLI command implementations for the `deepstack` binary.

pub mod collect;
pub mod summary;
