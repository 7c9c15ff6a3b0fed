//! Core execution engine for Sloth-Runner: DAG scheduling, per-task
//! retries with backoff, local and agent-delegated execution, artifact
//! hand-off between tasks, and panic-safe orchestration.
//!
//! The crate is layered master-down:
//! - [`concurrency`] and [`reliability`] are dependency-free primitives.
//! - [`domain`] is the data model and the port traits task bodies and
//!   agent resolvers implement.
//! - [`dag`], [`transport`] and [`agent`] are the scheduling, workspace
//!   shipping and remote-execution seams built on top of the domain model.
//! - [`core`] composes all of the above into the process-wide [`core::GlobalCore`].
//! - [`runner`] drives an actual run: schedule a group, retry, dispatch
//!   local or remote, collect artifacts, and render a summary.
//! - [`infrastructure`] is the ambient configuration and logging setup.

pub mod agent;
pub mod concurrency;
pub mod core;
pub mod dag;
pub mod domain;
pub mod infrastructure;
pub mod reliability;
pub mod runner;
pub mod transport;
