//! Gantry CD Core
//!
//! Domain types, collaborator ports and error handling shared by the
//! scheduler, the runner and the agent. Scheduling produces the job plans
//! defined here, assignment wraps them for transport, and the agent
//! executes them.

pub mod agent;
pub mod assignment;
pub mod builder;
pub mod config;
pub mod env;
pub mod error;
pub mod ids;
pub mod job;
pub mod material;
pub mod plan;
pub mod ports;
pub mod stage;
pub mod system;

pub use error::{Error, Result};
pub use ids::*;
