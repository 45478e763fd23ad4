use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC request id. Locally issued ids are always unsigned numbers; the
/// peer may use strings or any other number, which is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
    /// Negative or fractional ids.
    Other(serde_json::Number),
}

impl RequestId {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            RequestId::Number(n) => Some(*n),
            RequestId::Text(_) | RequestId::Other(_) => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => write!(f, "{}", s),
            RequestId::Other(n) => write!(f, "{}", n),
        }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("json-rpc error {code}: {message}")]
pub struct RpcError {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, &format!("method not found: {}", method))
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::new(INVALID_PARAMS, &format!("invalid params: {}", message))
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn invalid_request(message: &str) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// Shape of a JSON-RPC payload, derived from which members are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcKind {
    Request,
    Notification,
    Response,
    ErrorResponse,
    Invalid,
}

/// A JSON-RPC 2.0 object. Requests, notifications and responses share one
/// struct so that inbound payloads can be classified after a single parse.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcMessage {
    jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
}

impl JsonRpcMessage {
    fn empty() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: None,
            params: None,
            result: None,
            error: None,
            id: None,
        }
    }

    pub fn request(id: RequestId, method: &str, params: Value) -> Self {
        Self {
            method: Some(method.to_string()),
            params: Some(params),
            id: Some(id),
            ..Self::empty()
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            method: Some(method.to_string()),
            params,
            ..Self::empty()
        }
    }

    pub fn response(id: RequestId, result: Value) -> Self {
        Self {
            result: Some(result),
            id: Some(id),
            ..Self::empty()
        }
    }

    pub fn error_response(id: RequestId, error: RpcError) -> Self {
        Self {
            error: Some(error),
            id: Some(id),
            ..Self::empty()
        }
    }

    pub fn kind(&self) -> JsonRpcKind {
        match (&self.method, &self.id, &self.error) {
            (Some(_), Some(_), _) => JsonRpcKind::Request,
            (Some(_), None, _) => JsonRpcKind::Notification,
            (None, Some(_), Some(_)) => JsonRpcKind::ErrorResponse,
            (None, Some(_), None) => JsonRpcKind::Response,
            (None, None, _) => JsonRpcKind::Invalid,
        }
    }

    pub fn jsonrpc(&self) -> &str {
        &self.jsonrpc
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// The result member. A response carrying `"result": null` parses with no
    /// result, so this falls back to `Value::Null` for plain responses.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn into_result(self) -> Value {
        self.result.unwrap_or(Value::Null)
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }
}
