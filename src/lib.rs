pub mod client;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod peripherals;
pub mod state_machine;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use voicelink_types as types;
pub use client::{Client, Config, ConfigBuilder, EventRx};
pub use error::{Error, Result};
pub use mcp::{McpConfig, McpCorrelator, ToolDescriptor, ToolParameter, ToolRegistry};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorEvent, Peripherals};
pub use state_machine::{ConversationTrigger, DeviceState, StateMachine, StateTransition};
pub use transport::{Transport, TransportEvent};
