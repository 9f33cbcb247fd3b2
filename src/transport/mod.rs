//! Client-facing transport.
//!
//! One axum router carries the WebSocket endpoint (`/ws`) and a liveness
//! probe (`/health`). Each accepted socket becomes one [`Connection`] of the
//! [`SessionCoordinator`].
//!
//! [`Connection`]: crate::orchestrator::Connection
//! [`SessionCoordinator`]: crate::orchestrator::SessionCoordinator

pub mod ws;

pub use ws::{decode_frame, encode_event, router, serve, serve_on};
