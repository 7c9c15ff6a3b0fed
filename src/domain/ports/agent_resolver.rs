//! Name-to-address resolution for remote agents, injected by the host
//! application. The core reads this capability; it never mutates the
//! underlying registry.

use crate::domain::error::StructuredError;

/// Resolves an agent name to a reachable `host:port` address.
pub trait AgentResolver: Send + Sync {
    fn get_agent_address(&self, name: &str) -> Result<String, StructuredError>;
}
