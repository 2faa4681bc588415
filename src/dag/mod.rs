// src/dag/mod.rs

//! Step graph, partitioning and scheduling.
//!
//! - [`registry`] is the append-only table of declared steps.
//! - [`graph`] compiles a registry into a validated DAG with a deterministic
//!   execution order.
//! - [`partition`] splits a step into per-task contexts.
//! - [`scheduler`] is the per-run state machine deciding which steps are
//!   ready, and when dependents can start or must be blocked.
//! - [`step_info`] / [`scheduler_step`] / [`state_manager`] support the
//!   scheduler.

pub mod graph;
pub mod partition;
pub mod registry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod step_info;

pub use graph::DagGraph;
pub use partition::{partition, partition_step};
pub use registry::{StepDef, StepName, StepRegistry};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use step_info::{ScheduledStep, StepRunState};
