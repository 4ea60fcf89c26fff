//! Newline-delimited JSON over any async reader/writer pair.

use async_trait::async_trait;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines},
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::{errors::RpcError, mcp::rpc::Message, transport::Transport};

pub struct LineTransport<R, W> {
    reader: Mutex<Lines<BufReader<R>>>,
    writer: Mutex<W>,
}

impl LineTransport<io::Stdin, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader).lines()),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&self) -> Result<Message, RpcError> {
        let mut reader = self.reader.lock().await;
        loop {
            let Some(line) = reader.next_line().await? else {
                return Err(RpcError::Closed);
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Message>(line) {
                Ok(message) => return Ok(message),
                Err(err) => warn!(error = %err, "skipping line that is not a json-rpc message"),
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), RpcError> {
        let mut line = serde_json::to_vec(&message).map_err(RpcError::Encode)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        debug!(bytes = line.len(), "line transport wrote message");
        Ok(())
    }
}

/// Two connected in-memory line transports.
#[cfg(test)]
pub(crate) fn pipe() -> (
    std::sync::Arc<dyn Transport>,
    std::sync::Arc<dyn Transport>,
) {
    let (left, right) = io::duplex(64 * 1024);
    let (left_read, left_write) = io::split(left);
    let (right_read, right_write) = io::split(right);
    (
        std::sync::Arc::new(LineTransport::new(left_read, left_write)),
        std::sync::Arc::new(LineTransport::new(right_read, right_write)),
    )
}
