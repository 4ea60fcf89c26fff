//! Byte-stream transports
//!
//! The runtime only needs a duplex channel of whole messages; framing lives here.

use async_trait::async_trait;

use crate::{errors::RpcError, mcp::rpc::Message};

pub mod line;

pub use line::LineTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Blocks until the next message arrives. Any error ends the listen loop.
    async fn recv(&self) -> Result<Message, RpcError>;

    async fn send(&self, message: Message) -> Result<(), RpcError>;
}
