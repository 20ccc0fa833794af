//! Session monitoring module
//! Watches hosted sessions for new events and injects follow-up messages

pub mod analyzer;
#[allow(clippy::module_inception)]
pub mod monitor;
pub mod registry;
pub mod state;

pub use analyzer::{EventAnalyzer, ToolEventEcho};
pub use monitor::SessionMonitor;
pub use registry::MonitorRegistry;
pub use state::{MonitorConfig, MonitorError, MonitorExit, MonitorSnapshot};
