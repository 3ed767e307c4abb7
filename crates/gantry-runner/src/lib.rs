//! Build execution for Gantry CD agents.
//!
//! Runs a job's builders on the calling thread, matches and publishes
//! artifacts, and ships console output to the server in the background.

pub mod archiver;
pub mod artifacts;
pub mod builders;
pub mod console;
pub mod exec;
pub mod publisher;

pub use artifacts::{ArtifactUpload, match_plan};
pub use builders::{BuildContext, Builders, CancelFlag};
pub use console::{ConsoleTransmitter, MaskingConsole};
pub use publisher::ArtifactsPublisher;
