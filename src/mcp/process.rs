//! Inbound dispatch: decode params, run the handler through the interceptor chain, build
//! the reply.

use std::{future::Future, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::RpcError;
use crate::mcp::{
    base::Base,
    context::Context,
    intercept::{unary_fn, Interceptor},
    request::{downcast_request, AnyResponse, Request, Response},
    rpc::Message,
};

impl Base {
    /// Serves one inbound request or notification with `handler`. Returns the reply for
    /// requests and `None` for notifications, whatever the outcome.
    pub async fn process<T, V, F, Fut>(
        &self,
        ctx: &Context,
        message: &Message,
        handler: F,
    ) -> Option<Message>
    where
        T: DeserializeOwned + Default + Serialize + Send + Sync + 'static,
        V: Serialize + Send + Sync + 'static,
        F: Fn(Context, Request<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<V>, RpcError>> + Send + 'static,
    {
        let method = message.method.as_deref().unwrap_or_default();
        let params = match decode_params::<T>(message.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                warn!(method, id = ?message.id, error = %err, "rejecting malformed params");
                return message.id.as_ref().map(|_| message.reply_with_rpc_error(&err));
            }
        };

        let mut request = Request::new(params).with_metadata(message.metadata.clone());
        request.stamp(message.id.as_ref().map(ToString::to_string), method);

        let handler = Arc::new(handler);
        let inner = unary_fn(move |ctx, request| {
            let handler = Arc::clone(&handler);
            async move {
                let request = downcast_request::<T>(request)?;
                let id = request.id().map(str::to_owned);
                let response = handler(ctx, request).await?;
                Ok(Box::new(response.with_id(id)) as Box<dyn AnyResponse>)
            }
        });

        let outcome = self.interceptors.wrap_unary(inner)(ctx.clone(), Box::new(request)).await;
        if message.id.is_none() {
            if let Err(err) = outcome {
                debug!(method, error = %err, "notification handler failed");
            }
            return None;
        }

        let reply = match outcome.and_then(|response| response.raw_payload()) {
            Ok(result) => message.reply_with_result(result),
            Err(err) => {
                debug!(method, id = ?message.id, error = %err, "request handler failed");
                message.reply_with_rpc_error(&err)
            }
        };
        Some(reply)
    }
}

/// Error reply for a method this role does not serve. Notifications get nothing.
pub fn unknown_method(message: &Message, err: &RpcError) -> Option<Message> {
    match message.id {
        Some(_) => Some(message.reply_with_rpc_error(err)),
        None => {
            debug!(error = %err, "ignoring notification for unknown method");
            None
        }
    }
}

fn decode_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, RpcError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => serde_json::from_value(params).map_err(RpcError::InvalidParams),
    }
}

/// Dispatches `$message` to `$role.handler.$method` through [`Base::process`].
macro_rules! route {
    ($role:expr, $ctx:expr, $message:expr, $method:ident) => {{
        let handler = ::std::sync::Arc::clone(&$role.handler);
        $role
            .base
            .process($ctx, &$message, move |ctx, request| {
                let handler = ::std::sync::Arc::clone(&handler);
                async move { handler.$method(&ctx, request).await }
            })
            .await
    }};
}

/// Like [`route!`] for handlers that return `()`.
macro_rules! route_notification {
    ($role:expr, $ctx:expr, $message:expr, $method:ident) => {{
        let handler = ::std::sync::Arc::clone(&$role.handler);
        $role
            .base
            .process($ctx, &$message, move |ctx, request| {
                let handler = ::std::sync::Arc::clone(&handler);
                async move {
                    handler
                        .$method(&ctx, request)
                        .await
                        .map($crate::mcp::request::Response::new)
                }
            })
            .await
    }};
}

pub(crate) use route;
pub(crate) use route_notification;
