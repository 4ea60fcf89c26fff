//! Initiator role
//!
//! A [`Client`] calls every server method and answers the few the server may send back
//! (`ping`, `roots/list`, `notifications/message`) through a [`ClientHandler`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::RpcError;
use crate::mcp::{
    base::{Base, Dispatcher, Options},
    context::Context,
    method::{ClientMethod, ServerMethod},
    process::{route, route_notification, unknown_method},
    request::{Request, Response},
    router::Router,
    rpc::Message,
    schema::{
        CallToolRequest, CallToolResponse, CompletionRequest, CompletionResponse,
        GetPromptRequest, GetPromptResponse, InitializeRequest, InitializeResponse,
        InitializedNotification, ListPromptsRequest, ListPromptsResponse,
        ListResourceTemplatesRequest, ListResourceTemplatesResponse, ListResourcesRequest,
        ListResourcesResponse, ListRootsRequest, ListRootsResponse, ListToolsRequest,
        ListToolsResponse, LogMessageRequest, PingRequest, PingResponse, ReadResourceRequest,
        ReadResourceResponse, SetLogLevelRequest, SetLogLevelResponse,
    },
};
use crate::transport::Transport;

#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    async fn ping(
        &self,
        _ctx: &Context,
        _request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, RpcError> {
        Ok(Response::new(PingResponse::default()))
    }

    async fn list_roots(
        &self,
        _ctx: &Context,
        _request: Request<ListRootsRequest>,
    ) -> Result<Response<ListRootsResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn log_message(
        &self,
        _ctx: &Context,
        _request: Request<LogMessageRequest>,
    ) -> Result<(), RpcError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientHandler;

#[async_trait]
impl ClientHandler for DefaultClientHandler {}

struct ClientInner<H> {
    base: Base,
    handler: Arc<H>,
}

pub struct Client<H> {
    inner: Arc<ClientInner<H>>,
}

impl<H> Clone for Client<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// One outbound unary method per server method.
macro_rules! server_calls {
    ($($(#[$doc:meta])* $name:ident($method:ident, $params:ty) -> $result:ty;)*) => {
        $(
            $(#[$doc])*
            pub async fn $name(
                &self,
                ctx: &Context,
                request: Request<$params>,
            ) -> Result<Response<$result>, RpcError> {
                self.inner
                    .base
                    .call(ctx, ServerMethod::$method.as_str(), request)
                    .await
            }
        )*
    };
}

impl<H: ClientHandler> Client<H> {
    pub fn new(transport: Arc<dyn Transport>, handler: H, options: Options) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                base: Base::new(transport, options),
                handler: Arc::new(handler),
            }),
        }
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    pub fn router(&self) -> &Router {
        self.inner.base.router()
    }

    pub async fn listen(&self, ctx: &Context) -> Result<(), RpcError> {
        self.inner.base.listen(ctx, Arc::clone(&self.inner)).await
    }

    pub async fn serve(&self, ctx: &Context, message: Message) -> Option<Message> {
        self.inner.dispatch(ctx, message).await
    }

    server_calls! {
        /// Opens the session; the server answers with its capabilities.
        initialize(Initialize, InitializeRequest) -> InitializeResponse;
        ping(Ping, PingRequest) -> PingResponse;
        list_tools(ListTools, ListToolsRequest) -> ListToolsResponse;
        call_tool(CallTool, CallToolRequest) -> CallToolResponse;
        list_prompts(ListPrompts, ListPromptsRequest) -> ListPromptsResponse;
        get_prompt(GetPrompt, GetPromptRequest) -> GetPromptResponse;
        list_resources(ListResources, ListResourcesRequest) -> ListResourcesResponse;
        read_resource(ReadResource, ReadResourceRequest) -> ReadResourceResponse;
        list_resource_templates(ListResourceTemplates, ListResourceTemplatesRequest)
            -> ListResourceTemplatesResponse;
        complete(Completion, CompletionRequest) -> CompletionResponse;
        set_log_level(SetLogLevel, SetLogLevelRequest) -> SetLogLevelResponse;
    }

    pub async fn notify_initialized(
        &self,
        ctx: &Context,
        request: Request<InitializedNotification>,
    ) -> Result<(), RpcError> {
        self.inner
            .base
            .notify(ctx, ServerMethod::Initialized.as_str(), request)
            .await
    }
}

#[async_trait]
impl<H: ClientHandler> Dispatcher for ClientInner<H> {
    async fn serve(&self, ctx: &Context, message: Message) -> Option<Message> {
        self.dispatch(ctx, message).await
    }
}

impl<H: ClientHandler> ClientInner<H> {
    async fn dispatch(&self, ctx: &Context, message: Message) -> Option<Message> {
        let method = match message.method.as_deref().unwrap_or_default().parse::<ClientMethod>() {
            Ok(method) => method,
            Err(err) => return unknown_method(&message, &err),
        };

        match method {
            ClientMethod::Ping => route!(self, ctx, message, ping),
            ClientMethod::ListRoots => route!(self, ctx, message, list_roots),
            ClientMethod::LogMessage => route_notification!(self, ctx, message, log_message),
        }
    }
}
