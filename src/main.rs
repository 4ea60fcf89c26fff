use std::sync::Arc;

use async_trait::async_trait;
use mcp_duplex::{
    build_app,
    config::{Config, TransportKind},
    errors::RpcError,
    http::SseTransport,
    logging::{self, LoggingInterceptor},
    mcp::{
        schema::{Implementation, InitializeRequest, InitializeResponse, ServerCapabilities},
        Context, Options, Request, Response, Server, ServerHandler,
    },
    transport::{LineTransport, Transport},
    AppState,
};
use tracing::{info, warn};

/// Answers `initialize` with the offered version; everything else stays at the defaults.
struct RuntimeServer;

#[async_trait]
impl ServerHandler for RuntimeServer {
    async fn initialize(
        &self,
        _ctx: &Context,
        request: Request<InitializeRequest>,
    ) -> Result<Response<InitializeResponse>, RpcError> {
        info!(
            client = %request.params.client_info.name,
            protocol_version = %request.params.protocol_version,
            "client initialized"
        );
        Ok(Response::new(InitializeResponse {
            protocol_version: request.params.protocol_version,
            capabilities: ServerCapabilities::default(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let ctx = Context::new();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });

    let options = Options::new().with_interceptor(LoggingInterceptor);
    match config.transport {
        TransportKind::Stdio => {
            info!("serving over stdio");
            let transport: Arc<dyn Transport> = Arc::new(LineTransport::stdio());
            Server::new(transport, RuntimeServer, options)
                .listen(&ctx)
                .await?;
        }
        TransportKind::Sse => {
            let bind_socket = config.bind_socket()?;
            let transport = Arc::new(SseTransport::new());
            let server = Server::new(
                Arc::clone(&transport) as Arc<dyn Transport>,
                RuntimeServer,
                options,
            );
            let app = build_app(AppState::new(
                transport,
                &config.sse_path,
                &config.messages_path,
            ));
            let listener = tokio::net::TcpListener::bind(bind_socket).await?;

            info!(
                bind_addr = %config.bind_addr,
                bind_port = config.bind_port,
                sse_path = %config.sse_path,
                messages_path = %config.messages_path,
                "server starting"
            );

            let http_ctx = ctx.clone();
            let http = tokio::spawn(async move {
                axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(async move { http_ctx.cancelled().await })
                    .await
            });

            server.listen(&ctx).await?;
            http.await??;
        }
    }

    info!("server stopped");
    Ok(())
}
