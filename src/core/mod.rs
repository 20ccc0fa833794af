//! Application wiring

pub mod state;
pub mod supervisor;

pub use state::AppState;
pub use supervisor::TaskSupervisor;
