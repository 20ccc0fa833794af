//! Agent definition and tools

pub mod artwork;
pub mod definition;
pub mod tools;

pub use artwork::{ArticClient, ArtworkSource};
pub use definition::{live_agent, AgentDefinition, ToolSpec};
pub use tools::{date_time_tool, live_agent_transfer, ArtworkToolSettings, Toolbox};
