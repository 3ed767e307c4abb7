//! Scheduling for Gantry CD.
//!
//! Everything here is a synchronous, pure function of its inputs: stage and
//! job configuration plus a [`SchedulingContext`] go in, unpersisted job
//! instances and build assignments come out.

pub mod agents;
pub mod assignment;
pub mod builders;
pub mod context;
pub mod factory;
pub mod naming;

pub use assignment::BuildAssignmentAssembler;
pub use builders::BuilderFactory;
pub use context::SchedulingContext;
pub use factory::{InstanceFactory, PipelineIdentity};
