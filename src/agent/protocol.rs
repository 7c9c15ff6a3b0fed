//! Wire types for the `ExecuteTask` RPC. Framing is length-delimited;
//! payloads are `bincode`-encoded.

use serde::{Deserialize, Serialize};

/// Request sent to an agent to run a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    pub task_name: String,
    pub task_group: String,
    pub lua_script: String,
    pub workspace: Vec<u8>,
    pub user: String,
}

/// Reply from an agent after running a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskReply {
    pub success: bool,
    pub output: String,
    pub workspace: Vec<u8>,
}

/// Encode a request for the wire.
///
/// # Errors
/// Returns an error if the value cannot be bincode-encoded (never happens
/// for this plain-data type, but the caller's codec still surfaces it).
pub fn encode_request(request: &ExecuteTaskRequest) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(request)
}

/// # Errors
/// Returns an error if `bytes` is not a valid encoded `ExecuteTaskRequest`.
pub fn decode_request(bytes: &[u8]) -> Result<ExecuteTaskRequest, bincode::Error> {
    bincode::deserialize(bytes)
}

/// # Errors
/// Returns an error if the value cannot be bincode-encoded.
pub fn encode_reply(reply: &ExecuteTaskReply) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(reply)
}

/// # Errors
/// Returns an error if `bytes` is not a valid encoded `ExecuteTaskReply`.
pub fn decode_reply(bytes: &[u8]) -> Result<ExecuteTaskReply, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let request = ExecuteTaskRequest {
            task_name: "t".to_string(),
            task_group: "g".to_string(),
            lua_script: "print('hi')".to_string(),
            workspace: vec![1, 2, 3],
            user: String::new(),
        };
        let bytes = encode_request(&request).unwrap();
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded.task_name, "t");
        assert_eq!(decoded.workspace, vec![1, 2, 3]);
    }

    #[test]
    fn reply_round_trips() {
        let reply = ExecuteTaskReply {
            success: true,
            output: "ok".to_string(),
            workspace: vec![9],
        };
        let bytes = encode_reply(&reply).unwrap();
        let decoded = decode_reply(&bytes).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.output, "ok");
    }
}
