//! Command handlers.

mod build_cmd;
mod list_cmd;
mod probe_cmd;

//--------------------------------------------------------------------------------------------------
// Re-Exports
//--------------------------------------------------------------------------------------------------

pub use build_cmd::build_extension;
pub use list_cmd::list_bundle;
pub use probe_cmd::{list_platforms, probe_sdks};
