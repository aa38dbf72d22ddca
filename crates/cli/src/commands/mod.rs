//! Subcommand implementations

pub mod load;
pub mod status;
pub mod submit;
