//! Workspace transport: directory archive/extract for shipping a task's
//! working directory to and from a remote agent.

mod workspace;

pub use workspace::{archive, extract};
