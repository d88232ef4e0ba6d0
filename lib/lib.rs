//! `ext-forge` library.

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod negotiate;
pub mod pack;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod prompt;
pub mod publish;
pub mod report;
pub mod source;
pub mod styles;
pub mod toolchain;
pub mod workdir;

//--------------------------------------------------------------------------------------------------
// Re-Exports
//--------------------------------------------------------------------------------------------------

pub use commands::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use manifest::*;
pub use pack::*;
pub use pipeline::*;
pub use platform::*;
pub use toolchain::*;
