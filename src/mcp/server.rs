//! Responder role
//!
//! A [`Server`] answers the tool/resource/prompt methods through a [`ServerHandler`] and can
//! call back into the client (`ping`, `roots/list`, log notifications) over the same stream.

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

/// Server-side method implementations. Every method has a default, so implementors only
/// override what they serve: `ping` answers `{}`, other requests fail with `unimplemented`,
/// notifications are ignored.
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    async fn initialize(
        &self,
        _ctx: &Context,
        _request: Request<InitializeRequest>,
    ) -> Result<Response<InitializeResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn ping(
        &self,
        _ctx: &Context,
        _request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, RpcError> {
        Ok(Response::new(PingResponse::default()))
    }

    async fn list_tools(
        &self,
        _ctx: &Context,
        _request: Request<ListToolsRequest>,
    ) -> Result<Response<ListToolsResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn call_tool(
        &self,
        _ctx: &Context,
        _request: Request<CallToolRequest>,
    ) -> Result<Response<CallToolResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn list_prompts(
        &self,
        _ctx: &Context,
        _request: Request<ListPromptsRequest>,
    ) -> Result<Response<ListPromptsResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn get_prompt(
        &self,
        _ctx: &Context,
        _request: Request<GetPromptRequest>,
    ) -> Result<Response<GetPromptResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn list_resources(
        &self,
        _ctx: &Context,
        _request: Request<ListResourcesRequest>,
    ) -> Result<Response<ListResourcesResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn read_resource(
        &self,
        _ctx: &Context,
        _request: Request<ReadResourceRequest>,
    ) -> Result<Response<ReadResourceResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn list_resource_templates(
        &self,
        _ctx: &Context,
        _request: Request<ListResourceTemplatesRequest>,
    ) -> Result<Response<ListResourceTemplatesResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn complete(
        &self,
        _ctx: &Context,
        _request: Request<CompletionRequest>,
    ) -> Result<Response<CompletionResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn set_log_level(
        &self,
        _ctx: &Context,
        _request: Request<SetLogLevelRequest>,
    ) -> Result<Response<SetLogLevelResponse>, RpcError> {
        Err(RpcError::unimplemented())
    }

    async fn initialized(
        &self,
        _ctx: &Context,
        _request: Request<InitializedNotification>,
    ) -> Result<(), RpcError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultServerHandler;

#[async_trait]
impl ServerHandler for DefaultServerHandler {}

struct ServerInner<H> {
    base: Base,
    handler: Arc<H>,
}

/// Cheap to clone; clones share the connection, its router and the handler.
pub struct Server<H> {
    inner: Arc<ServerInner<H>>,
}

impl<H> Clone for Server<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: ServerHandler> Server<H> {
    pub fn new(transport: Arc<dyn Transport>, handler: H, options: Options) -> Self {
        Self {
            inner: Arc::new(ServerInner {
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

    /// Runs the duplex loop until the transport fails or `ctx` is cancelled.
    pub async fn listen(&self, ctx: &Context) -> Result<(), RpcError> {
        self.inner.base.listen(ctx, Arc::clone(&self.inner)).await
    }

    /// Dispatches a single inbound message without a loop.
    pub async fn serve(&self, ctx: &Context, message: Message) -> Option<Message> {
        self.inner.dispatch(ctx, message).await
    }

    pub async fn ping(
        &self,
        ctx: &Context,
        request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, RpcError> {
        self.inner
            .base
            .call(ctx, ClientMethod::Ping.as_str(), request)
            .await
    }

    pub async fn list_roots(
        &self,
        ctx: &Context,
        request: Request<ListRootsRequest>,
    ) -> Result<Response<ListRootsResponse>, RpcError> {
        self.inner
            .base
            .call(ctx, ClientMethod::ListRoots.as_str(), request)
            .await
    }

    /// Sends a `notifications/message` log record to the client.
    pub async fn log_message(
        &self,
        ctx: &Context,
        request: Request<LogMessageRequest>,
    ) -> Result<(), RpcError> {
        self.inner
            .base
            .notify(ctx, ClientMethod::LogMessage.as_str(), request)
            .await
    }
}

#[async_trait]
impl<H: ServerHandler> Dispatcher for ServerInner<H> {
    async fn serve(&self, ctx: &Context, message: Message) -> Option<Message> {
        self.dispatch(ctx, message).await
    }
}

impl<H: ServerHandler> ServerInner<H> {
    async fn dispatch(&self, ctx: &Context, message: Message) -> Option<Message> {
        let method = match message.method.as_deref().unwrap_or_default().parse::<ServerMethod>() {
            Ok(method) => method,
            Err(err) => return unknown_method(&message, &err),
        };

        match method {
            ServerMethod::Initialize => route!(self, ctx, message, initialize),
            ServerMethod::Ping => route!(self, ctx, message, ping),
            ServerMethod::ListTools => route!(self, ctx, message, list_tools),
            ServerMethod::CallTool => route!(self, ctx, message, call_tool),
            ServerMethod::ListPrompts => route!(self, ctx, message, list_prompts),
            ServerMethod::GetPrompt => route!(self, ctx, message, get_prompt),
            ServerMethod::ListResources => route!(self, ctx, message, list_resources),
            ServerMethod::ReadResource => route!(self, ctx, message, read_resource),
            ServerMethod::ListResourceTemplates => {
                route!(self, ctx, message, list_resource_templates)
            }
            ServerMethod::Completion => route!(self, ctx, message, complete),
            ServerMethod::SetLogLevel => route!(self, ctx, message, set_log_level),
            ServerMethod::Initialized => route_notification!(self, ctx, message, initialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::errors::{HANDLER_FAILED, METHOD_NOT_FOUND};
    use crate::mcp::{rpc::MessageId, schema::Content};
    use crate::transport::line::pipe;

    #[derive(Default)]
    struct Tools {
        initialized: AtomicUsize,
    }

    #[async_trait]
    impl ServerHandler for Tools {
        async fn call_tool(
            &self,
            _ctx: &Context,
            request: Request<CallToolRequest>,
        ) -> Result<Response<CallToolResponse>, RpcError> {
            Ok(Response::new(CallToolResponse {
                content: vec![Content::text(request.params.name)],
                is_error: false,
            }))
        }

        async fn initialized(
            &self,
            _ctx: &Context,
            _request: Request<InitializedNotification>,
        ) -> Result<(), RpcError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn server<H: ServerHandler>(handler: H) -> Server<H> {
        let (transport, _peer) = pipe();
        Server::new(transport, handler, Options::new())
    }

    fn inbound(raw: &str) -> Message {
        serde_json::from_str(raw).expect("valid inbound message")
    }

    #[tokio::test]
    async fn default_handler_answers_ping_with_empty_object() {
        let server = server(DefaultServerHandler);

        let reply = server
            .serve(&Context::new(), inbound(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#))
            .await
            .expect("ping reply");

        assert_eq!(reply.id.and_then(|id| id.as_u64()), Some(2));
        assert_eq!(reply.result, Some(json!({})));
        assert!(reply.error.is_none());
    }

    #[tokio::test]
    async fn default_handler_reports_unimplemented() {
        let server = server(DefaultServerHandler);

        let reply = server
            .serve(
                &Context::new(),
                inbound(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list","params":{}}"#),
            )
            .await
            .expect("error reply");

        let error = reply.error.expect("error");
        assert_eq!(error.code, HANDLER_FAILED);
        assert_eq!(error.message, "unimplemented");
    }

    #[tokio::test]
    async fn overridden_method_is_served() {
        let server = server(Tools::default());

        let reply = server
            .serve(
                &Context::new(),
                inbound(
                    r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"echo","arguments":{}}}"#,
                ),
            )
            .await
            .expect("tool reply");

        let result = reply.result.expect("result");
        assert_eq!(result["content"][0]["text"], json!("echo"));
        assert_eq!(result["isError"], json!(false));
    }

    #[tokio::test]
    async fn unknown_method_is_answered_only_for_requests() {
        let server = server(DefaultServerHandler);

        let reply = server
            .serve(
                &Context::new(),
                inbound(r#"{"jsonrpc":"2.0","id":"q","method":"roots/list"}"#),
            )
            .await
            .expect("error reply");
        assert_eq!(reply.id, Some(MessageId::from("q")));
        assert_eq!(reply.error.expect("error").code, METHOD_NOT_FOUND);

        assert!(server
            .serve(
                &Context::new(),
                inbound(r#"{"jsonrpc":"2.0","method":"roots/list"}"#)
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn initialized_notification_runs_handler_without_reply() {
        let server = server(Tools::default());

        let reply = server
            .serve(
                &Context::new(),
                inbound(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
            )
            .await;

        assert!(reply.is_none());
        assert_eq!(server.handler().initialized.load(Ordering::SeqCst), 1);
    }
}
