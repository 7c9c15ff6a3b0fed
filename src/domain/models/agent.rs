//! Agent descriptor, as exposed by the external resolver/registry. The core
//! reads these but never mutates them.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Liveness status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Unknown,
}

/// A remote agent the core may delegate task execution to.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub address: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status: AgentStatus,
    pub version: String,
}
