//! Worker WebSocket infrastructure.
//!
//! Provides the HTTP upgrade handler that turns each accepted socket into a
//! registered client, plus the heartbeat that keeps idle sockets alive.

mod handler;
mod heartbeat;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
