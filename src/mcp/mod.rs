//! Duplex JSON-RPC runtime for the Model Context Protocol
//!
//! Both roles share the same machinery: a [`Router`] correlating outbound calls with their
//! replies, an interceptor [`Chain`] around every unary call, and one listen loop per stream
//! that serves inbound requests concurrently.

pub mod base;
pub mod call;
pub mod client;
pub mod context;
pub mod intercept;
pub mod method;
pub mod process;
pub mod request;
pub mod router;
pub mod rpc;
pub mod schema;
pub mod server;

pub use base::{Base, Dispatcher, Options};
pub use client::{Client, ClientHandler, DefaultClientHandler};
pub use context::Context;
pub use intercept::{unary_fn, unary_interceptor_fn, Chain, Interceptor, UnaryFunc};
pub use method::{ClientMethod, ServerMethod};
pub use request::{AnyRequest, AnyResponse, Request, Response};
pub use router::Router;
pub use rpc::{ErrorDetail, Message, MessageId};
pub use server::{DefaultServerHandler, Server, ServerHandler};

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::{
        io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
        sync::mpsc,
        time::timeout,
    };

    use super::*;
    use crate::errors::{RpcError, METHOD_NOT_FOUND};
    use crate::mcp::schema::{
        CallToolRequest, CallToolResponse, Content, InitializeRequest, InitializeResponse,
        Level, ListPromptsRequest, ListRootsRequest, LogMessageRequest, PingRequest,
    };
    use crate::transport::{line::pipe, LineTransport, Transport};

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct EchoServer;

    #[async_trait]
    impl ServerHandler for EchoServer {
        async fn initialize(
            &self,
            _ctx: &Context,
            request: Request<InitializeRequest>,
        ) -> Result<Response<InitializeResponse>, RpcError> {
            Ok(Response::new(InitializeResponse {
                protocol_version: request.params.protocol_version,
                ..InitializeResponse::default()
            }))
        }

        async fn call_tool(
            &self,
            _ctx: &Context,
            request: Request<CallToolRequest>,
        ) -> Result<Response<CallToolResponse>, RpcError> {
            if request.params.name == "hang" {
                std::future::pending::<()>().await;
            }

            let marker = request.params.arguments["marker"].as_u64().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(32 - marker % 32)).await;
            Ok(Response::new(CallToolResponse {
                content: vec![Content::text(marker.to_string())],
                is_error: false,
            }))
        }
    }

    struct LogSink {
        records: mpsc::UnboundedSender<LogMessageRequest>,
    }

    #[async_trait]
    impl ClientHandler for LogSink {
        async fn log_message(
            &self,
            _ctx: &Context,
            request: Request<LogMessageRequest>,
        ) -> Result<(), RpcError> {
            self.records
                .send(request.params)
                .map_err(|_| RpcError::handler("log sink closed"))
        }
    }

    struct Session<C> {
        server: Server<EchoServer>,
        client: Client<C>,
        ctx: Context,
    }

    impl<C> Drop for Session<C> {
        fn drop(&mut self) {
            self.ctx.cancel();
        }
    }

    fn connect<C: ClientHandler>(client_handler: C, options: Options) -> Session<C> {
        let (server_side, client_side) = pipe();
        let server = Server::new(server_side, EchoServer, options.clone());
        let client = Client::new(client_side, client_handler, options);
        let ctx = Context::new();

        let listener = server.clone();
        let listen_ctx = ctx.clone();
        tokio::spawn(async move { listener.listen(&listen_ctx).await });
        let listener = client.clone();
        let listen_ctx = ctx.clone();
        tokio::spawn(async move { listener.listen(&listen_ctx).await });

        Session {
            server,
            client,
            ctx,
        }
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let session = connect(DefaultClientHandler, Options::new());

        let response = session
            .client
            .initialize(
                &Context::new(),
                Request::new(InitializeRequest {
                    protocol_version: "1.0.0".to_string(),
                    ..InitializeRequest::default()
                }),
            )
            .await
            .expect("initialize succeeds");

        assert_eq!(response.result.protocol_version, "1.0.0");
        assert_eq!(response.id(), Some("1"));
    }

    #[tokio::test]
    async fn both_sides_can_ping() {
        let session = connect(DefaultClientHandler, Options::new());

        session
            .client
            .ping(&Context::new(), Request::new(PingRequest::default()))
            .await
            .expect("client ping");
        session
            .server
            .ping(&Context::new(), Request::new(PingRequest::default()))
            .await
            .expect("server ping");

        assert_eq!(session.client.router().pending(), 0);
        assert_eq!(session.server.router().pending(), 0);
    }

    #[tokio::test]
    async fn server_log_message_reaches_client_handler() {
        let (records, mut received) = mpsc::unbounded_channel();
        let session = connect(LogSink { records }, Options::new());

        session
            .server
            .log_message(
                &Context::new(),
                Request::new(LogMessageRequest {
                    level: Level::Error,
                    logger: Some("disk".to_string()),
                    data: json!("almost full"),
                }),
            )
            .await
            .expect("notification sent");

        let record = timeout(WAIT, received.recv())
            .await
            .expect("record within timeout")
            .expect("record");
        assert_eq!(record.level, Level::Error);
        assert_eq!(record.data, json!("almost full"));
    }

    #[tokio::test]
    async fn unimplemented_methods_fail_with_handler_code() {
        let session = connect(DefaultClientHandler, Options::new());

        let err = session
            .client
            .list_prompts(&Context::new(), Request::new(ListPromptsRequest::default()))
            .await
            .expect_err("server does not serve prompts");
        assert!(matches!(err, RpcError::Protocol { code: 9, ref message, .. } if message == "unimplemented"));

        let err = session
            .server
            .list_roots(&Context::new(), Request::new(ListRootsRequest::default()))
            .await
            .expect_err("client does not serve roots");
        assert_eq!(err.code(), 9);
    }

    #[tokio::test]
    async fn concurrent_calls_receive_their_own_results() {
        let session = connect(DefaultClientHandler, Options::new());

        let calls: Vec<_> = (0..32u64)
            .map(|marker| {
                let client = session.client.clone();
                tokio::spawn(async move {
                    let response = client
                        .call_tool(
                            &Context::new(),
                            Request::new(CallToolRequest {
                                name: "echo".to_string(),
                                arguments: json!({"marker": marker}),
                            }),
                        )
                        .await
                        .expect("call succeeds");
                    (marker, response.result)
                })
            })
            .collect();

        for call in calls {
            let (marker, result) = call.await.expect("task");
            assert_eq!(result.content[0].text.as_deref(), Some(marker.to_string().as_str()));
        }
        assert_eq!(session.client.router().pending(), 0);
    }

    #[tokio::test]
    async fn cancelled_call_returns_without_a_result() {
        let session = connect(DefaultClientHandler, Options::new());
        let call_ctx = Context::new();
        let canceller = call_ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = timeout(
            WAIT,
            session.client.call_tool(
                &call_ctx,
                Request::new(CallToolRequest {
                    name: "hang".to_string(),
                    arguments: Value::Null,
                }),
            ),
        )
        .await
        .expect("call returns after cancellation")
        .expect_err("cancelled");

        assert!(err.is_cancelled());
        assert_eq!(session.client.router().pending(), 0);

        // The connection keeps working for later calls.
        session
            .client
            .ping(&Context::new(), Request::new(PingRequest::default()))
            .await
            .expect("ping after cancellation");
    }

    #[tokio::test]
    async fn interceptors_wrap_outbound_and_inbound_calls() {
        let trace: Arc<Mutex<Vec<String>>> = Arc::default();
        let tracer = |name: &'static str, trace: Arc<Mutex<Vec<String>>>| {
            unary_interceptor_fn(move |next: UnaryFunc| {
                let trace = Arc::clone(&trace);
                unary_fn(move |ctx, request| {
                    let next = Arc::clone(&next);
                    let trace = Arc::clone(&trace);
                    async move {
                        let method = request.method().to_string();
                        trace.lock().expect("trace lock").push(format!("{name}-before {method}"));
                        let response = next(ctx, request).await;
                        trace.lock().expect("trace lock").push(format!("{name}-after {method}"));
                        response
                    }
                })
            })
        };
        let options = Options::new()
            .with_interceptor(tracer("a", Arc::clone(&trace)))
            .with_interceptor(tracer("b", Arc::clone(&trace)));
        let (server_side, client_side) = pipe();
        let server = Server::new(server_side, EchoServer, Options::new());
        let client = Client::new(client_side, DefaultClientHandler, options);
        let ctx = Context::new();
        let listen_ctx = ctx.clone();
        tokio::spawn(async move { server.listen(&listen_ctx).await });
        let listener = client.clone();
        let listen_ctx = ctx.clone();
        tokio::spawn(async move { listener.listen(&listen_ctx).await });

        client
            .ping(&Context::new(), Request::new(PingRequest::default()))
            .await
            .expect("ping");
        ctx.cancel();

        assert_eq!(
            *trace.lock().expect("trace lock"),
            vec!["a-before ping", "b-before ping", "b-after ping", "a-after ping"]
        );
    }

    async fn next_line<R>(lines: &mut io::Lines<R>) -> Value
    where
        R: io::AsyncBufRead + Unpin,
    {
        let line = timeout(WAIT, lines.next_line())
            .await
            .expect("line within timeout")
            .expect("read line")
            .expect("stream open");
        serde_json::from_str(&line).expect("reply is json")
    }

    #[tokio::test]
    async fn raw_wire_exchange_matches_protocol() {
        let (local, remote) = io::duplex(64 * 1024);
        let (read_half, write_half) = io::split(local);
        let transport: Arc<dyn Transport> = Arc::new(LineTransport::new(read_half, write_half));
        let server = Server::new(transport, EchoServer, Options::new());
        let ctx = Context::new();
        let listen_ctx = ctx.clone();
        let listening = tokio::spawn(async move { server.listen(&listen_ctx).await });

        let (remote_read, mut remote_write) = io::split(remote);
        let mut lines = BufReader::new(remote_read).lines();

        remote_write
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"method\":\"tools/explode\"}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":41,\"method\":\"tools/explode\"}\n",
            )
            .await
            .expect("write unknown methods");
        let reply = next_line(&mut lines).await;
        assert_eq!(reply["id"], json!(41));
        assert_eq!(reply["error"]["code"], json!(METHOD_NOT_FOUND));

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{\"protocolVersion\":\"1.0.0\"}}\n")
            .await
            .expect("write initialize");
        let reply = next_line(&mut lines).await;
        assert_eq!(reply["id"], json!(1));
        assert_eq!(reply["result"]["protocolVersion"], json!("1.0.0"));

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .await
            .expect("write ping");
        let reply = next_line(&mut lines).await;
        assert_eq!(reply, json!({"id": 2, "jsonrpc": "2.0", "result": {}}));

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .expect("write initialized notification");
        assert!(
            timeout(Duration::from_millis(100), lines.next_line())
                .await
                .is_err(),
            "notifications get no reply"
        );

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n")
            .await
            .expect("write second ping");
        let reply = next_line(&mut lines).await;
        assert_eq!(reply["id"], json!(3));

        ctx.cancel();
        listening
            .await
            .expect("listen task")
            .expect("cancellation ends listen cleanly");
    }

    #[tokio::test]
    async fn listen_fails_when_peer_hangs_up() {
        let (server_side, client_side) = pipe();
        let server = Server::new(server_side, EchoServer, Options::new());
        drop(client_side);

        let err = timeout(WAIT, server.listen(&Context::new()))
            .await
            .expect("listen returns")
            .expect_err("peer gone");
        assert!(matches!(err, RpcError::Closed));
    }
}
