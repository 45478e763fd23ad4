pub mod audio;
pub mod codec;
pub mod events;
pub mod jsonrpc;

pub use events::ProtocolMessage;
pub use jsonrpc::{JsonRpcMessage, RequestId, RpcError};
