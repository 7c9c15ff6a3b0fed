//! Agent client: name/address resolution, connection, and the
//! `ExecuteTask` round trip.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout as tokio_timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::domain::error::{Severity, StructuredError};
use crate::domain::ports::AgentResolver;
use crate::transport;

use super::protocol::{decode_reply, encode_request, ExecuteTaskRequest};

/// Box-drawing characters that signal `output` is already formatted as a
/// box (e.g. produced by a prior local error render) rather than raw text.
const BOX_DRAWING_CHARS: &[char] = &['│', '┃', '┌', '┐', '└', '┘', '─', '━'];

/// Everything needed to ship a single task attempt to a remote agent.
pub struct AgentPayload {
    pub task_name: String,
    pub group_name: String,
    pub serialized_script: String,
    pub workspace: Vec<u8>,
    pub effective_user: String,
}

/// Resolves agent names to addresses and drives the `ExecuteTask` RPC.
pub struct AgentClient {
    resolver: Option<Arc<dyn AgentResolver>>,
}

impl AgentClient {
    #[must_use]
    pub fn new(resolver: Option<Arc<dyn AgentResolver>>) -> Self {
        Self { resolver }
    }

    /// Resolve `name_or_address` to a connectable address. A string
    /// containing `:` is treated as a direct address; otherwise the
    /// injected resolver is consulted.
    pub fn resolve(&self, name_or_address: &str) -> Result<String, StructuredError> {
        if name_or_address.contains(':') {
            return Ok(name_or_address.to_string());
        }
        match &self.resolver {
            Some(resolver) => resolver.get_agent_address(name_or_address),
            None => Err(StructuredError::new(
                "no_agent_resolver",
                format!("no agent resolver installed to resolve '{name_or_address}'"),
                Severity::Medium,
            )
            .with_retryable(false)),
        }
    }

    /// Execute `payload` on the agent at `address`, extracting the
    /// returned workspace into `dest_workdir` on success. Returns the
    /// agent's combined stdout+stderr output.
    pub async fn execute_on_agent(
        &self,
        address: &str,
        payload: &AgentPayload,
        budget: Duration,
        dest_workdir: &Path,
    ) -> Result<String, StructuredError> {
        let connect = tokio_timeout(budget, TcpStream::connect(address)).await;
        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(connect_failed(address, e.to_string())),
            Err(_) => return Err(connect_failed(address, "connection attempt timed out")),
        };

        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        let request = ExecuteTaskRequest {
            task_name: payload.task_name.clone(),
            task_group: payload.group_name.clone(),
            lua_script: payload.serialized_script.clone(),
            workspace: payload.workspace.clone(),
            user: payload.effective_user.clone(),
        };
        let encoded = encode_request(&request)
            .map_err(|e| send_failed(address, e.to_string()))?;

        tokio_timeout(budget, framed.send(Bytes::from(encoded)))
            .await
            .map_err(|_| timed_out(address))?
            .map_err(|e| send_failed(address, e.to_string()))?;

        let frame = tokio_timeout(budget, framed.next())
            .await
            .map_err(|_| timed_out(address))?
            .ok_or_else(|| connect_failed(address, "connection closed before reply"))?
            .map_err(|e| connect_failed(address, e.to_string()))?;

        let reply = decode_reply(&frame).map_err(|e| {
            StructuredError::new("agent_execution_failed", e.to_string(), Severity::High)
                .with_detail("agent_address", address)
        })?;

        if !reply.success {
            let formatted = if reply.output.chars().any(|c| BOX_DRAWING_CHARS.contains(&c)) {
                reply.output.clone()
            } else {
                format!("agent execution failed:\n{}", reply.output)
            };
            return Err(StructuredError::new("agent_execution_failed", formatted, Severity::High)
                .with_detail("agent_address", address));
        }

        transport::extract(&reply.workspace, dest_workdir).map_err(|e| {
            StructuredError::new("workspace_extract_failed", e.message, Severity::High)
                .with_retryable(true)
                .with_detail("agent_address", address)
        })?;

        Ok(reply.output)
    }
}

fn connect_failed(address: &str, detail: impl Into<String>) -> StructuredError {
    StructuredError::new("agent_connect_failed", detail.into(), Severity::High)
        .with_retryable(true)
        .with_detail("agent_address", address)
}

fn send_failed(address: &str, detail: impl Into<String>) -> StructuredError {
    StructuredError::new("agent_send_failed", detail.into(), Severity::High)
        .with_retryable(true)
        .with_detail("agent_address", address)
}

fn timed_out(address: &str) -> StructuredError {
    StructuredError::new("agent_timeout", format!("timed out waiting on agent '{address}'"), Severity::High)
        .with_retryable(true)
        .with_detail("agent_address", address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::protocol::{encode_reply, ExecuteTaskReply};
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    struct StaticResolver(Result<String, StructuredError>);
    impl AgentResolver for StaticResolver {
        fn get_agent_address(&self, _name: &str) -> Result<String, StructuredError> {
            self.0.clone()
        }
    }

    #[test]
    fn direct_address_bypasses_resolver() {
        let client = AgentClient::new(None);
        assert_eq!(client.resolve("10.0.0.5:50051").unwrap(), "10.0.0.5:50051");
    }

    #[test]
    fn bare_name_without_resolver_fails() {
        let client = AgentClient::new(None);
        let err = client.resolve("agent-1").unwrap_err();
        assert_eq!(err.code, "no_agent_resolver");
    }

    #[test]
    fn bare_name_delegates_to_resolver() {
        let resolver = Arc::new(StaticResolver(Ok("10.0.0.9:9000".to_string())));
        let client = AgentClient::new(Some(resolver));
        assert_eq!(client.resolve("agent-1").unwrap(), "10.0.0.9:9000");
    }

    #[tokio::test]
    async fn round_trip_against_a_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
            let _request = framed.next().await.unwrap().unwrap();
            let reply = ExecuteTaskReply { success: true, output: "done".to_string(), workspace: Vec::new() };
            let encoded = encode_reply(&reply).unwrap();
            framed.send(Bytes::from(encoded)).await.unwrap();
        });

        let client = AgentClient::new(None);
        let dest = tempdir().unwrap();
        let payload = AgentPayload {
            task_name: "t".to_string(),
            group_name: "g".to_string(),
            serialized_script: String::new(),
            workspace: Vec::new(),
            effective_user: String::new(),
        };
        let output = client
            .execute_on_agent(&addr.to_string(), &payload, Duration::from_secs(5), dest.path())
            .await
            .unwrap();
        assert_eq!(output, "done");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_maps_to_agent_connect_failed() {
        let client = AgentClient::new(None);
        let dest = tempdir().unwrap();
        let payload = AgentPayload {
            task_name: "t".to_string(),
            group_name: "g".to_string(),
            serialized_script: String::new(),
            workspace: Vec::new(),
            effective_user: String::new(),
        };
        // Port 1 is reserved and should refuse immediately.
        let err = client
            .execute_on_agent("127.0.0.1:1", &payload, Duration::from_secs(2), dest.path())
            .await
            .unwrap_err();
        assert_eq!(err.code, "agent_connect_failed");
        assert!(err.is_retryable());
    }
}
