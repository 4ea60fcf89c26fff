//! Per-connection state shared by both roles, and the duplex listen loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::RpcError;
use crate::mcp::{
    context::Context,
    intercept::{Chain, Interceptor},
    router::Router,
    rpc::Message,
};
use crate::transport::Transport;

/// Construction-time settings applied to a client or server.
#[derive(Clone, Default)]
pub struct Options {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>,
    ) -> Self {
        self.interceptors.extend(interceptors);
        self
    }
}

/// Handles one inbound request or notification, returning the reply to send, if any.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn serve(&self, ctx: &Context, message: Message) -> Option<Message>;
}

pub struct Base {
    pub(crate) router: Router,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) interceptors: Chain,
}

impl Base {
    pub fn new(transport: Arc<dyn Transport>, options: Options) -> Self {
        Self {
            router: Router::new(),
            transport,
            interceptors: Chain::new(options.interceptors),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Reads until the transport fails or `ctx` is cancelled. Requests are served on their
    /// own tasks; replies are handed to the waiting call.
    pub async fn listen<D>(&self, ctx: &Context, dispatcher: Arc<D>) -> Result<(), RpcError>
    where
        D: Dispatcher + ?Sized + 'static,
    {
        loop {
            let message = tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                message = self.transport.recv() => message?,
            };

            if message.is_request() {
                let dispatcher = Arc::clone(&dispatcher);
                let transport = Arc::clone(&self.transport);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let method = message.method.clone().unwrap_or_default();
                    let Some(reply) = dispatcher.serve(&ctx, message).await else {
                        return;
                    };
                    if let Err(err) = transport.send(reply).await {
                        warn!(method = %method, error = %err, "failed to send reply");
                    }
                });
            } else {
                self.route_reply(message);
            }
        }
    }

    /// Delivers a reply to the call that allocated its id. Unknown, duplicate and
    /// abandoned ids are dropped.
    pub fn route_reply(&self, message: Message) {
        let Some(id) = message.id.as_ref().and_then(|id| id.as_u64()) else {
            debug!(id = ?message.id, "discarding reply without a routable id");
            return;
        };

        match self.router.remove(id) {
            Some(slot) => {
                if slot.send(message).is_err() {
                    debug!(id, "caller stopped waiting before the reply arrived");
                }
            }
            None => debug!(id, "discarding reply for unknown call"),
        }
    }
}
