//! Tool sources that feed the registry's available-tool map.
//!
//! - [`assembler`]: statically declared tools from a directory, filtered by
//!   the document's admin include/exclude lists
//! - [`manifest`]: plugin descriptors from the manifest file
//! - [`auth`]: the plugin authentication filter

pub mod assembler;
pub mod auth;
pub mod manifest;

pub use assembler::{StaticTool, ToolAssembler};
pub use auth::{EnvPluginAuth, PluginAuth, authenticate_plugins};
pub use manifest::{FileManifestLoader, ManifestLoader, PluginDescriptor};
