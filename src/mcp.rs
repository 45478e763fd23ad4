//! Tool invocation over the session's `mcp` envelope.
//!
//! [`McpCorrelator`] plays both JSON-RPC roles: as a client it calls the
//! remote tool catalog and matches responses to waiters by id, as a server it
//! answers `initialize`, `tools/list` and `tools/call` for the local
//! [`ToolRegistry`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use serde_json::{json, Value};
use voicelink_types::events::McpMessage;
use voicelink_types::jsonrpc::JsonRpcKind;
use voicelink_types::{JsonRpcMessage, ProtocolMessage, RequestId, RpcError};

use crate::error::{Error, Result};
use crate::transport::Transport;

mod mirror;
mod pending;
mod tools;

pub use mirror::DeviceMirror;
pub use tools::{handler_fn, Arguments, ParameterType, ToolDescriptor, ToolHandler, ToolParameter, ToolRegistry};
use pending::PendingRequests;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INITIALIZE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAGE_SIZE: usize = 32;
pub const DEFAULT_MAX_PAGES: usize = 64;

#[derive(Debug, Clone)]
pub struct McpConfig {
    request_timeout: Duration,
    initialize_timeout: Duration,
    page_size: usize,
    max_pages: usize,
    client_name: String,
    client_version: String,
}

impl McpConfig {
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            initialize_timeout: DEFAULT_INITIALIZE_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_initialize_timeout(mut self, timeout: Duration) -> Self {
        self.initialize_timeout = timeout;
        self
    }

    /// Page size when serving our own `tools/list`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Upper bound on `tools/list` pages fetched from the remote catalog.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_client_info(mut self, name: &str, version: &str) -> Self {
        self.client_name = name.to_string();
        self.client_version = version.to_string();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn initialize_timeout(&self) -> Duration {
        self.initialize_timeout
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    fn client_info(&self) -> Value {
        json!({ "name": self.client_name, "version": self.client_version })
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool offered by the remote side, as listed by its `tools/list`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RemoteTool {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "inputSchema", default)]
    input_schema: Value,
}

impl RemoteTool {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// What [`McpCorrelator::handle_inbound`] did with a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Completed the local request with this id.
    Resolved(u64),
    /// A remote request for us; the reply is sent from a spawned task.
    Dispatched,
    /// A notification or a response nobody is waiting for.
    Informational(JsonRpcMessage),
}

pub struct McpCorrelator {
    transport: Arc<dyn Transport>,
    config: McpConfig,
    tools: ToolRegistry,
    pending: PendingRequests,
    next_id: AtomicU64,
    initialized: AtomicBool,
    remote_tools: Mutex<Vec<RemoteTool>>,
    mirror: Mutex<DeviceMirror>,
}

impl McpCorrelator {
    pub fn new(transport: Arc<dyn Transport>, tools: ToolRegistry, config: McpConfig) -> Self {
        Self {
            transport,
            config,
            tools,
            pending: PendingRequests::default(),
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            remote_tools: Mutex::new(vec![]),
            mirror: Mutex::new(DeviceMirror::default()),
        }
    }

    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// The remote catalog fetched by the last successful [`initialize`](Self::initialize).
    pub fn list_tools(&self) -> Vec<RemoteTool> {
        lock(&self.remote_tools).clone()
    }

    pub fn mirror(&self) -> DeviceMirror {
        lock(&self.mirror).clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    async fn send_payload(&self, payload: JsonRpcMessage) -> Result<()> {
        let session_id = self.transport.session_id().unwrap_or_default();
        self.transport
            .send(ProtocolMessage::Mcp(McpMessage::new(&session_id, payload)))
            .await
    }

    /// Sends a request and waits for the matching response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.request_with_timeout(method, params, self.config.request_timeout)
            .await
    }

    async fn request_with_timeout(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (mut rx, deadline) = self.pending.register(id, timeout);

        tracing::debug!("mcp request {}: {}", id, method);
        if let Err(e) = self
            .send_payload(JsonRpcMessage::request(RequestId::Number(id), method, params))
            .await
        {
            self.pending.remove(id);
            return Err(e);
        }

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                if self.pending.remove(id) {
                    tracing::warn!("mcp request {} ({}) timed out after {:?}", id, method, timeout);
                    return Err(Error::RequestTimeout {
                        id: RequestId::Number(id),
                    });
                }
                // resolved right at the deadline
                rx.try_recv().unwrap_or(Err(Error::ConnectionLost))
            }
        }
    }

    /// Runs the client handshake: `initialize`, `notifications/initialized`,
    /// then the paginated `tools/list`. Leaves the correlator uninitialized on
    /// any failure.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);

        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": self.config.client_info(),
        });
        let result = self
            .request_with_timeout("initialize", params, self.config.initialize_timeout)
            .await?;
        if !result.is_object() {
            return Err(Error::MalformedResponse(format!("initialize result: {}", result)));
        }
        let protocol = result.get("protocolVersion").and_then(Value::as_str).unwrap_or("unknown");
        let server = result.pointer("/serverInfo/name").and_then(Value::as_str).unwrap_or("unknown");
        tracing::info!("mcp peer initialized: protocol={}, server={}", protocol, server);

        self.send_payload(JsonRpcMessage::notification("notifications/initialized", None))
            .await?;

        let catalog = self.fetch_remote_tools().await?;
        tracing::info!("mcp remote catalog: {} tools", catalog.len());
        *lock(&self.remote_tools) = catalog;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_remote_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut catalog = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.config.max_pages {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let mut result = self.request("tools/list", params).await?;
            let tools = result
                .get_mut("tools")
                .map(Value::take)
                .ok_or_else(|| Error::MalformedResponse("tools/list without tools".to_string()))?;
            let page: Vec<RemoteTool> = serde_json::from_value(tools)
                .map_err(|e| Error::MalformedResponse(format!("tools/list: {}", e)))?;
            catalog.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(catalog);
            }
        }

        tracing::warn!("mcp catalog truncated after {} pages", self.config.max_pages);
        Ok(catalog)
    }

    /// Calls a remote tool. The raw result also feeds the advisory [`DeviceMirror`].
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        if result.get("isError").and_then(Value::as_bool) != Some(true) {
            lock(&self.mirror).observe(name, &arguments, &result);
        }
        Ok(result)
    }

    /// Routes one inbound payload: responses go to their waiters, requests are
    /// answered on a spawned task, everything else is handed back.
    pub fn handle_inbound(self: &Arc<Self>, payload: JsonRpcMessage) -> InboundOutcome {
        match payload.kind() {
            JsonRpcKind::Response | JsonRpcKind::ErrorResponse => {
                let Some(id) = payload.id().and_then(RequestId::as_number) else {
                    return InboundOutcome::Informational(payload);
                };
                let outcome = match payload.error() {
                    Some(error) => Err(Error::Rpc {
                        code: error.code(),
                        message: error.message().to_string(),
                    }),
                    None => Ok(payload.result().cloned().unwrap_or(Value::Null)),
                };
                if self.pending.resolve(id, outcome) {
                    InboundOutcome::Resolved(id)
                } else {
                    tracing::debug!("mcp response {} matches no pending request", id);
                    InboundOutcome::Informational(payload)
                }
            }
            JsonRpcKind::Request => {
                self.dispatch(payload);
                InboundOutcome::Dispatched
            }
            JsonRpcKind::Notification | JsonRpcKind::Invalid => InboundOutcome::Informational(payload),
        }
    }

    fn dispatch(self: &Arc<Self>, request: JsonRpcMessage) {
        let this = self.clone();
        tokio::spawn(async move {
            let Some(id) = request.id().cloned() else {
                return;
            };
            let method = request.method().unwrap_or_default().to_string();
            let reply = match this.answer(&method, request.params()).await {
                Ok(result) => JsonRpcMessage::response(id.clone(), result),
                Err(error) => {
                    tracing::warn!("mcp {} (id {}) failed: {}", method, id, error);
                    JsonRpcMessage::error_response(id.clone(), error)
                }
            };
            if let Err(e) = this.send_payload(reply).await {
                tracing::error!("failed to answer mcp request {}: {}", id, e);
            }
        });
    }

    async fn answer(&self, method: &str, params: Option<&Value>) -> std::result::Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": self.config.client_info(),
            })),
            "tools/list" => {
                let cursor = params.and_then(|p| p.get("cursor")).and_then(Value::as_str);
                let (tools, next) = self
                    .tools
                    .page(cursor, self.config.page_size)
                    .map_err(|e| RpcError::invalid_params(&e))?;
                let mut result = json!({ "tools": tools });
                if let Some(next) = next {
                    result["nextCursor"] = json!(next);
                }
                Ok(result)
            }
            "tools/call" => self.call_local_tool(params).await,
            "ping" => Ok(json!({})),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn call_local_tool(&self, params: Option<&Value>) -> std::result::Result<Value, RpcError> {
        let name = params
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing tool name"))?;
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RpcError::method_not_found(name))?;
        let arguments = tool
            .prepare_arguments(params.and_then(|p| p.get("arguments")))
            .map_err(|e| RpcError::invalid_params(&e))?;

        tracing::info!("running tool {}", name);
        let handler = tool.handler();
        // a panicking handler must not take the dispatcher down with it
        let outcome = tokio::spawn(async move { handler.call(arguments).await }).await;
        match outcome {
            Ok(Ok(value)) => Ok(text_content(value)),
            Ok(Err(e)) => Err(RpcError::internal_error(&e.to_string())),
            Err(e) => Err(RpcError::internal_error(&format!("tool {} aborted: {}", name, e))),
        }
    }

    /// Fails every pending request with [`Error::ConnectionLost`] and drops
    /// the initialized flag. Called when the transport goes away.
    pub fn fail_all(&self) -> usize {
        self.initialized.store(false, Ordering::SeqCst);
        let failed = self.pending.fail_all(|| Error::ConnectionLost);
        if failed > 0 {
            tracing::warn!("failed {} pending mcp requests", failed);
        }
        failed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn text_content(value: Value) -> Value {
    let text = match value {
        Value::String(text) => text,
        other => other.to_string(),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeTransport;
    use voicelink_types::jsonrpc::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};

    fn registry() -> ToolRegistry {
        ToolRegistry::new()
            .with(
                ToolDescriptor::new(
                    "self.lamp.turn_on",
                    "Turn the lamp on",
                    handler_fn(|_| async { Ok(json!(true)) }),
                ),
            )
            .with(
                ToolDescriptor::new(
                    "self.lamp.set_brightness",
                    "Set lamp brightness",
                    handler_fn(|args| async move { Ok(json!(format!("brightness {}", args["level"]))) }),
                )
                .with_parameter(ToolParameter::integer("level").with_range(0, 100)),
            )
            .with(ToolDescriptor::new(
                "self.lamp.broken",
                "Always fails",
                handler_fn(|_| async { Err(anyhow::anyhow!("bulb burnt out")) }),
            ))
    }

    fn correlator(transport: &Arc<FakeTransport>, config: McpConfig) -> Arc<McpCorrelator> {
        Arc::new(McpCorrelator::new(transport.clone(), registry(), config))
    }

    fn request_id(message: &JsonRpcMessage) -> u64 {
        message.id().and_then(RequestId::as_number).unwrap()
    }

    #[tokio::test]
    async fn responses_in_reverse_order_reach_their_waiters() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        let first = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.request("tools/call", json!({ "name": "a" })).await }
        });
        let first_id = request_id(&transport.next_mcp().await);
        let second = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.request("tools/call", json!({ "name": "b" })).await }
        });
        let second_id = request_id(&transport.next_mcp().await);
        assert_eq!((first_id, second_id), (1, 2));

        assert_eq!(
            mcp.handle_inbound(JsonRpcMessage::response(RequestId::Number(2), json!("two"))),
            InboundOutcome::Resolved(2)
        );
        assert_eq!(
            mcp.handle_inbound(JsonRpcMessage::response(RequestId::Number(1), json!("one"))),
            InboundOutcome::Resolved(1)
        );

        assert_eq!(first.await.unwrap().unwrap(), json!("one"));
        assert_eq!(second.await.unwrap().unwrap(), json!("two"));
        assert_eq!(mcp.pending_requests(), 0);
    }

    #[tokio::test]
    async fn unanswered_request_times_out_and_late_response_is_ignored() {
        let transport = FakeTransport::connected();
        let mcp = correlator(
            &transport,
            McpConfig::default().with_request_timeout(Duration::from_millis(50)),
        );

        let started = tokio::time::Instant::now();
        let err = mcp.request("tools/call", json!({})).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(matches!(err, Error::RequestTimeout { id: RequestId::Number(1) }));
        assert_eq!(mcp.pending_requests(), 0);

        let late = JsonRpcMessage::response(RequestId::Number(1), json!("late"));
        assert_eq!(mcp.handle_inbound(late.clone()), InboundOutcome::Informational(late));
    }

    #[tokio::test]
    async fn error_response_becomes_rpc_error() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        let call = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.request("tools/call", json!({})).await }
        });
        let id = request_id(&transport.next_mcp().await);
        mcp.handle_inbound(JsonRpcMessage::error_response(
            RequestId::Number(id),
            RpcError::method_not_found("x"),
        ));

        match call.await.unwrap() {
            Err(Error::Rpc { code, .. }) => assert_eq!(code, METHOD_NOT_FOUND),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_loss_fails_every_pending_call() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let mcp = mcp.clone();
                tokio::spawn(async move { mcp.request("tools/call", json!({})).await })
            })
            .collect();
        transport.next_mcp().await;
        transport.next_mcp().await;

        assert_eq!(mcp.fail_all(), 2);
        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(Error::ConnectionLost)));
        }
    }

    #[tokio::test]
    async fn send_failure_does_not_leak_a_pending_record() {
        let transport = FakeTransport::disconnected();
        let mcp = correlator(&transport, McpConfig::default());
        assert!(matches!(mcp.request("ping", json!({})).await, Err(Error::NotConnected)));
        assert_eq!(mcp.pending_requests(), 0);
    }

    #[tokio::test]
    async fn initialize_fetches_every_catalog_page() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        let init = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.initialize().await }
        });

        let request = transport.next_mcp().await;
        assert_eq!(request.method(), Some("initialize"));
        assert_eq!(request.params().unwrap()["protocolVersion"], MCP_PROTOCOL_VERSION);
        mcp.handle_inbound(JsonRpcMessage::response(
            request.id().cloned().unwrap(),
            json!({ "protocolVersion": MCP_PROTOCOL_VERSION, "serverInfo": { "name": "assistant" } }),
        ));

        let initialized = transport.next_mcp().await;
        assert_eq!(initialized.method(), Some("notifications/initialized"));
        assert_eq!(initialized.id(), None);

        let page = transport.next_mcp().await;
        assert_eq!(page.method(), Some("tools/list"));
        mcp.handle_inbound(JsonRpcMessage::response(
            page.id().cloned().unwrap(),
            json!({ "tools": [{ "name": "search", "description": "web search" }], "nextCursor": "p2" }),
        ));

        let page = transport.next_mcp().await;
        assert_eq!(page.params().unwrap()["cursor"], "p2");
        mcp.handle_inbound(JsonRpcMessage::response(
            page.id().cloned().unwrap(),
            json!({ "tools": [{ "name": "weather", "inputSchema": { "type": "object" } }] }),
        ));

        init.await.unwrap().unwrap();
        assert!(mcp.is_initialized());
        let names: Vec<_> = mcp.list_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["search", "weather"]);

        mcp.fail_all();
        assert!(!mcp.is_initialized());
    }

    #[tokio::test]
    async fn initialize_timeout_leaves_correlator_uninitialized() {
        let transport = FakeTransport::connected();
        let mcp = correlator(
            &transport,
            McpConfig::default().with_initialize_timeout(Duration::from_millis(30)),
        );
        assert!(matches!(mcp.initialize().await, Err(Error::RequestTimeout { .. })));
        assert!(!mcp.is_initialized());
    }

    #[tokio::test]
    async fn malformed_catalog_fails_initialize() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());
        let init = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.initialize().await }
        });

        let request = transport.next_mcp().await;
        mcp.handle_inbound(JsonRpcMessage::response(request.id().cloned().unwrap(), json!({})));
        transport.next_mcp().await;
        let page = transport.next_mcp().await;
        mcp.handle_inbound(JsonRpcMessage::response(page.id().cloned().unwrap(), json!({ "tools": 3 })));

        assert!(matches!(init.await.unwrap(), Err(Error::MalformedResponse(_))));
        assert!(!mcp.is_initialized());
    }

    #[tokio::test]
    async fn call_requires_initialization_and_updates_the_mirror() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());
        assert!(matches!(
            mcp.call("self.lamp.turn_on", json!({})).await,
            Err(Error::NotInitialized)
        ));

        mcp.initialized.store(true, Ordering::SeqCst);
        let call = tokio::spawn({
            let mcp = mcp.clone();
            async move { mcp.call("self.speaker.set_volume", json!({ "volume": 40 })).await }
        });
        let request = transport.next_mcp().await;
        assert_eq!(request.params().unwrap()["name"], "self.speaker.set_volume");
        mcp.handle_inbound(JsonRpcMessage::response(
            request.id().cloned().unwrap(),
            text_content(json!(true)),
        ));

        call.await.unwrap().unwrap();
        assert_eq!(mcp.mirror().volume(), Some(40));
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found_and_dispatch_continues() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        let unknown = JsonRpcMessage::request(
            RequestId::Number(7),
            "tools/call",
            json!({ "name": "self.toaster.toast", "arguments": {} }),
        );
        assert_eq!(mcp.handle_inbound(unknown), InboundOutcome::Dispatched);
        let reply = transport.next_mcp().await;
        assert_eq!(reply.id(), Some(&RequestId::Number(7)));
        assert_eq!(reply.error().unwrap().code(), METHOD_NOT_FOUND);

        let known = JsonRpcMessage::request(
            RequestId::Text("abc".to_string()),
            "tools/call",
            json!({ "name": "self.lamp.set_brightness", "arguments": { "level": 5 } }),
        );
        mcp.handle_inbound(known);
        let reply = transport.next_mcp().await;
        assert_eq!(reply.id(), Some(&RequestId::Text("abc".to_string())));
        assert_eq!(
            reply.result().unwrap(),
            &json!({ "content": [{ "type": "text", "text": "brightness 5" }], "isError": false })
        );
    }

    #[tokio::test]
    async fn bad_arguments_and_failing_handlers_become_rpc_errors() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        mcp.handle_inbound(JsonRpcMessage::request(
            RequestId::Number(1),
            "tools/call",
            json!({ "name": "self.lamp.set_brightness", "arguments": {} }),
        ));
        let reply = transport.next_mcp().await;
        assert_eq!(reply.error().unwrap().code(), INVALID_PARAMS);

        mcp.handle_inbound(JsonRpcMessage::request(
            RequestId::Number(2),
            "tools/call",
            json!({ "name": "self.lamp.broken" }),
        ));
        let reply = transport.next_mcp().await;
        assert_eq!(reply.error().unwrap().code(), INTERNAL_ERROR);
        assert_eq!(reply.error().unwrap().message(), "bulb burnt out");
    }

    #[tokio::test]
    async fn remote_side_can_list_our_tools_page_by_page() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default().with_page_size(2));

        mcp.handle_inbound(JsonRpcMessage::request(RequestId::Number(1), "tools/list", json!({})));
        let reply = transport.next_mcp().await;
        let result = reply.result().unwrap();
        assert_eq!(result["tools"].as_array().unwrap().len(), 2);
        assert_eq!(result["tools"][0]["name"], "self.lamp.turn_on");
        assert_eq!(result["nextCursor"], "2");

        mcp.handle_inbound(JsonRpcMessage::request(
            RequestId::Number(2),
            "tools/list",
            json!({ "cursor": "2" }),
        ));
        let reply = transport.next_mcp().await;
        let result = reply.result().unwrap();
        assert_eq!(result["tools"][0]["name"], "self.lamp.broken");
        assert!(result.get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn remote_listing_with_a_huge_cursor_is_answered() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        mcp.handle_inbound(JsonRpcMessage::request(
            RequestId::Number(9),
            "tools/list",
            json!({ "cursor": "18446744073709551615" }),
        ));
        let reply = transport.next_mcp().await;
        assert_eq!(reply.id(), Some(&RequestId::Number(9)));
        assert!(reply.result().unwrap()["tools"].as_array().unwrap().is_empty());
        assert!(reply.result().unwrap().get("nextCursor").is_none());
    }

    #[tokio::test]
    async fn requests_with_negative_ids_are_answered() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());
        let request: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"ping","id":-3}"#).unwrap();
        let id = request.id().cloned();

        assert_eq!(mcp.handle_inbound(request), InboundOutcome::Dispatched);
        let reply = transport.next_mcp().await;
        assert_eq!(reply.id().cloned(), id);
        assert_eq!(reply.result(), Some(&json!({})));
    }

    #[tokio::test]
    async fn remote_initialize_and_unknown_methods() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());

        mcp.handle_inbound(JsonRpcMessage::request(RequestId::Number(1), "initialize", json!({})));
        let reply = transport.next_mcp().await;
        assert_eq!(reply.result().unwrap()["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(reply.result().unwrap()["capabilities"]["tools"].is_object());

        mcp.handle_inbound(JsonRpcMessage::request(RequestId::Number(2), "resources/list", json!({})));
        let reply = transport.next_mcp().await;
        assert_eq!(reply.error().unwrap().code(), METHOD_NOT_FOUND);
    }

    #[test]
    fn notifications_are_informational() {
        let transport = FakeTransport::connected();
        let mcp = correlator(&transport, McpConfig::default());
        let note = JsonRpcMessage::notification("notifications/ready", None);
        assert_eq!(mcp.handle_inbound(note.clone()), InboundOutcome::Informational(note));
        assert!(transport.try_sent().is_none());
    }
}
