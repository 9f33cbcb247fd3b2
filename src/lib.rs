#![forbid(unsafe_code)]

//! `code-relay`: compiles and runs submitted programs and relays their
//! console over WebSocket.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod runner;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
