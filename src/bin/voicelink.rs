use std::sync::{Arc, Mutex};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;
use voicelink::mcp::handler_fn;
use voicelink::peripherals::{DeviceEvent, DiscardPlayback, ManualKeywordDetector, PcmCodec, SilentCapture};
use voicelink::{
    Client, Config, McpConfig, Orchestrator, OrchestratorConfig, OrchestratorEvent, Peripherals, ToolDescriptor,
    ToolParameter, ToolRegistry,
};

#[derive(Parser)]
#[command(version, about = "Talk to a voice assistant backend from the console")]
struct Cli {
    /// Websocket url of the assistant backend
    #[arg(long)]
    url: Option<String>,
    /// Device id sent in the connection headers
    #[arg(long)]
    device_id: Option<String>,
    /// Client id sent in the connection headers
    #[arg(long)]
    client_id: Option<String>,
    /// Bearer token
    #[arg(long)]
    token: Option<String>,
    /// Use realtime listening in continuous conversations
    #[arg(long)]
    realtime: bool,
}

#[derive(Debug)]
struct Lamp {
    on: bool,
    brightness: i64,
}

fn lamp_tools() -> ToolRegistry {
    let lamp = Arc::new(Mutex::new(Lamp {
        on: false,
        brightness: 50,
    }));

    let turn_on = {
        let lamp = lamp.clone();
        handler_fn(move |_| {
            let lamp = lamp.clone();
            async move {
                let mut lamp = lamp.lock().map_err(|_| anyhow::anyhow!("lamp state poisoned"))?;
                lamp.on = true;
                Ok::<_, anyhow::Error>(json!({ "on": true, "brightness": lamp.brightness }))
            }
        })
    };
    let turn_off = {
        let lamp = lamp.clone();
        handler_fn(move |_| {
            let lamp = lamp.clone();
            async move {
                let mut lamp = lamp.lock().map_err(|_| anyhow::anyhow!("lamp state poisoned"))?;
                lamp.on = false;
                Ok::<_, anyhow::Error>(json!({ "on": false }))
            }
        })
    };
    let set_brightness = {
        let lamp = lamp.clone();
        handler_fn(move |args| {
            let lamp = lamp.clone();
            async move {
                let level = args
                    .get("level")
                    .and_then(|v| v.as_i64())
                    .context("level is required")?;
                let mut lamp = lamp.lock().map_err(|_| anyhow::anyhow!("lamp state poisoned"))?;
                lamp.brightness = level;
                Ok::<_, anyhow::Error>(json!({ "on": lamp.on, "brightness": level }))
            }
        })
    };
    let get_state = handler_fn(move |_| {
        let lamp = lamp.clone();
        async move {
            let lamp = lamp.lock().map_err(|_| anyhow::anyhow!("lamp state poisoned"))?;
            Ok::<_, anyhow::Error>(json!({ "on": lamp.on, "brightness": lamp.brightness }))
        }
    });

    ToolRegistry::new()
        .with(ToolDescriptor::new("self.lamp.get_state", "Current power and brightness of the lamp", get_state))
        .with(ToolDescriptor::new("self.lamp.turn_on", "Turn the lamp on", turn_on))
        .with(ToolDescriptor::new("self.lamp.turn_off", "Turn the lamp off", turn_off))
        .with(
            ToolDescriptor::new("self.lamp.set_brightness", "Set the lamp brightness", set_brightness)
                .with_parameter(
                    ToolParameter::integer("level")
                        .with_range(0, 100)
                        .with_description("Brightness in percent"),
                ),
        )
}

fn log_events(orchestrator: &Orchestrator) {
    let mut events = orchestrator.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(transition) => {
                    tracing::info!("[{}] -> [{}]", transition.from_state(), transition.to_state())
                }
                OrchestratorEvent::Transcript(text) => tracing::info!("you: {}", text),
                OrchestratorEvent::AssistantText(text) => tracing::info!("assistant: {}", text),
                OrchestratorEvent::Emotion(emotion) => tracing::debug!("emotion: {}", emotion),
                OrchestratorEvent::McpNotification(payload) => tracing::debug!("mcp: {:?}", payload),
                OrchestratorEvent::ToolsReady(count) => tracing::info!("{} remote tools available", count),
            }
        }
    });
}

async fn run_command(orchestrator: &Orchestrator, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("start") => {
            let keep_listening = words.next() == Some("auto");
            orchestrator.start_conversation(keep_listening);
        }
        Some("stop") => {
            orchestrator.stop_conversation();
        }
        Some("abort") => {
            orchestrator.interrupt().await;
        }
        Some("wake") => {
            let wake_word = words.collect::<Vec<_>>().join(" ");
            let wake_word = if wake_word.is_empty() { "hello".to_string() } else { wake_word };
            orchestrator
                .device_events()
                .send(DeviceEvent::KeywordDetected(wake_word))
                .context("orchestrator is gone")?;
        }
        Some("tools") => {
            let mcp = orchestrator.mcp();
            for name in mcp.tools().names() {
                tracing::info!("local: {}", name);
            }
            for tool in mcp.list_tools() {
                tracing::info!("remote: {} - {}", tool.name(), tool.description());
            }
        }
        Some("state") => tracing::info!("state: {}", orchestrator.state()),
        Some("quit") | Some("exit") => return Ok(false),
        Some(other) => tracing::warn!("unknown command {:?}; try start [auto], stop, abort, wake, tools, quit", other),
        None => {}
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();

    let mut builder = Config::builder();
    if let Some(url) = &cli.url {
        builder = builder.with_url(url);
    }
    if let Some(device_id) = &cli.device_id {
        builder = builder.with_device_id(device_id);
    }
    if let Some(client_id) = &cli.client_id {
        builder = builder.with_client_id(client_id);
    }
    if let Some(token) = &cli.token {
        builder = builder.with_access_token(token);
    }
    let config = builder.build();
    tracing::info!("server: {}, device: {}", config.url(), config.device_id());

    let peripherals = Peripherals {
        capture: Arc::new(SilentCapture),
        playback: Arc::new(DiscardPlayback),
        codec: Arc::new(PcmCodec),
        detector: Arc::new(ManualKeywordDetector),
    };
    let orchestrator = Orchestrator::new(
        Arc::new(Client::new(config)),
        lamp_tools(),
        peripherals,
        OrchestratorConfig::default().with_realtime(cli.realtime),
        McpConfig::default(),
    );
    log_events(&orchestrator);
    orchestrator
        .start()
        .await
        .context("Failed to start the orchestrator")?;
    orchestrator.connect();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };
        if !run_command(&orchestrator, line.trim()).await? {
            break;
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
