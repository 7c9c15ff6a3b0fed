//! The master-to-agent execution transport: wire protocol plus client.

mod client;
mod protocol;

pub use client::{AgentClient, AgentPayload};
pub use protocol::{decode_reply, decode_request, encode_reply, encode_request, ExecuteTaskReply, ExecuteTaskRequest};
