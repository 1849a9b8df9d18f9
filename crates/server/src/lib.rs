//! Freeroam relay server library.

pub mod config;
pub mod interest;
pub mod pool;
pub mod server;
pub mod spatial;
pub mod spectator;

// Re-export commonly used types
pub use config::Config;
pub use server::{PacketOutcome, Server, ServerState, SharedState, run};
