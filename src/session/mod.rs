//! Session model and backends

pub mod local;
pub mod memory;
pub mod model;
pub mod provider;
pub mod vertex;

pub use local::LocalEngine;
pub use memory::InMemorySessionStore;
pub use model::{Content, Event, EventActions, Part, Session, SessionRef};
pub use provider::{ChunkStream, MessageSender, SessionStore};
pub use vertex::AgentEngineClient;
