//! Vertex AI Agent Engine backend

pub mod client;
pub mod ndjson;

pub use client::AgentEngineClient;
