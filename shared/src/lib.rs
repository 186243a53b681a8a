//! Cross-lambda plumbing: configuration, logging, sessions, websocket
//! view-sessions and the process-wide [`AppState`].

pub mod auth;
pub mod config;
pub mod logging;
pub mod sockets;
pub mod state;

pub use config::{AppConfig, ConfigError};
pub use logging::init_tracing;
pub use state::AppState;
