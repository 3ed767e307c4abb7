//! Build agent for Gantry CD.
//!
//! Polls the server for work, runs build assignments on a blocking thread
//! and reports job state, console output and artifacts back.

pub mod build_work;
pub mod config;
pub mod controller;
pub mod http;
pub mod remote;
pub mod work;

pub use build_work::BuildWork;
pub use config::AgentConfig;
pub use controller::AgentController;
pub use remote::{AgentInstruction, BuildRepositoryRemote, WorkPayload};
pub use work::{SharedRuntimeInfo, Work, WorkContext};
