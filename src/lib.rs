//! Livedesk - session monitoring and message injection for a hosted live agent transfer bot

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod monitor;
pub mod session;
