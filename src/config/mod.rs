//! Livedesk configuration module
//! Handles loading, saving, and managing the config file

#[allow(clippy::module_inception)]
pub mod config;

pub use config::{ArtworkSettings, Config, MonitorSettings};
