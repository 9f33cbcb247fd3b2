//! Run orchestration.
//!
//! Covers process spawning and supervision, prompt detection, the session
//! registry, resource cleanup, and the coordinator that ties them together.

pub mod cleanup;
pub mod codec;
pub mod coordinator;
pub mod process;
pub mod prompt_detector;
pub mod registry;

pub use coordinator::{Connection, RunOutcome, RunReport, SessionCoordinator};
