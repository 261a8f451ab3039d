//! Client for an interactive remote code execution service.
//!
//! [`CompileSession`] streams one program run at a time over a WebSocket:
//! it sends the source, relays stdin, and records stdout, stderr and exit
//! status in an ordered output log that observers read through snapshots.
//! [`learning_api::LearningApi`] talks to the REST side of the same service.

pub mod config;
pub mod learning_api;
pub mod logging;
pub mod output_log;
pub mod paths;
pub mod protocol;
pub mod session;
pub mod state_machine;
pub mod structured_logger;

pub use output_log::{OutputEvent, OutputKind, RunSummary};
pub use session::CompileSession;
pub use state_machine::{RunId, SessionSnapshot, SessionStatus};

/// Git commit this binary was built from, or `unknown`.
pub const BUILD_SHA: &str = env!("COMPILE_SESSION_GIT_SHA");
