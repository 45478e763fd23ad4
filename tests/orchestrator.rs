use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use voicelink::peripherals::{DiscardPlayback, ManualKeywordDetector, PcmCodec, SilentCapture};
use voicelink::{
    Client, Config, DeviceState, McpConfig, Orchestrator, OrchestratorConfig, Peripherals, ToolRegistry,
};

async fn wait_for(orchestrator: &Orchestrator, state: DeviceState) {
    for _ in 0..200 {
        if orchestrator.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("still {} instead of {}", orchestrator.state(), state);
}

fn orchestrator(url: &str) -> Orchestrator {
    let config = Config::builder()
        .with_url(url)
        .with_handshake_timeout(Duration::from_millis(300))
        .build();
    Orchestrator::new(
        Arc::new(Client::new(config)),
        ToolRegistry::new(),
        Peripherals {
            capture: Arc::new(SilentCapture),
            playback: Arc::new(DiscardPlayback),
            codec: Arc::new(PcmCodec),
            detector: Arc::new(ManualKeywordDetector),
        },
        OrchestratorConfig::default(),
        McpConfig::default(),
    )
}

#[tokio::test]
async fn socket_lost_during_the_handshake_does_not_strand_the_device() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        // first connection: read the hello, then vanish
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        socket.next().await;
        drop(socket);

        // second connection: a normal session
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        socket.next().await;
        let hello = json!({ "type": "hello", "transport": "websocket", "session_id": "again" });
        socket.send(Message::Text(hello.to_string())).await.unwrap();
        while let Some(Ok(_)) = socket.next().await {}
    });

    let orchestrator = orchestrator(&url);
    orchestrator.start().await.unwrap();
    assert!(orchestrator.start_conversation(false));
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_for(&orchestrator, DeviceState::Idle).await;

    assert!(orchestrator.start_conversation(false));
    wait_for(&orchestrator, DeviceState::Listening).await;

    orchestrator.shutdown().await;
    server.await.unwrap();
}
