use crate::jsonrpc::JsonRpcMessage;

/// `mcp` message: a JSON-RPC 2.0 payload tunnelled through the session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct McpMessage {
    #[serde(default)]
    session_id: String,

    payload: JsonRpcMessage,
}

impl McpMessage {
    pub fn new(session_id: &str, payload: JsonRpcMessage) -> Self {
        Self {
            session_id: session_id.to_string(),
            payload,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn payload(&self) -> &JsonRpcMessage {
        &self.payload
    }

    pub fn into_payload(self) -> JsonRpcMessage {
        self.payload
    }
}
