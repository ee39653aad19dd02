//! CLI command implementations.

pub mod inspect;
pub mod settings;
pub mod sweep;
