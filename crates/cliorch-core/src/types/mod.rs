//! Type definitions for commands and runtime configuration

mod command_types;
mod runtime_config;

pub use command_types::*;
pub use runtime_config::*;
