//! label-mod core - foundational types shared by the runtime and CLI.
//!
//! Holds the error taxonomy every operation reports through and the
//! configuration model loaded from files, environment and flags.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{AuthConfig, EngineConfig, LabelModConfig, RegistryConfig};
pub use error::{LabelModError, Result};

/// label-mod version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
