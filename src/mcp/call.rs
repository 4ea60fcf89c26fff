//! Outbound unary calls and notifications.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::RpcError;
use crate::mcp::{
    base::Base,
    context::Context,
    intercept::{unary_fn, Interceptor},
    request::{downcast_response, AnyResponse, Request, Response},
    router::Router,
    rpc::Message,
};

/// Releases a call's router entry however the call ends.
struct PendingCall<'a> {
    router: &'a Router,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.router.remove(self.id);
    }
}

impl Base {
    /// Sends `request` as `method` and waits for the correlated reply or for `ctx` to be
    /// cancelled, whichever comes first.
    pub async fn call<P, R>(
        &self,
        ctx: &Context,
        method: &str,
        mut request: Request<P>,
    ) -> Result<Response<R>, RpcError>
    where
        P: Serialize + Send + Sync + 'static,
        R: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let (id, inbox) = self.router.add();
        let _pending = PendingCall {
            router: &self.router,
            id,
        };
        request.stamp(Some(id.to_string()), method);

        let transport = Arc::clone(&self.transport);
        let inbox = Arc::new(Mutex::new(Some(inbox)));
        let inner = unary_fn(move |ctx, request| {
            let transport = Arc::clone(&transport);
            let inbox = Arc::clone(&inbox);
            async move {
                if inbox.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
                    return Err(RpcError::handler("call was already answered"));
                }

                let mut outbound = Message::request(id, request.method(), request.raw_payload()?);
                outbound.metadata = request.metadata().clone();
                transport.send(outbound).await?;

                // A failed send leaves the reply slot for a retried `next`.
                let inbox = inbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| RpcError::handler("call was already answered"))?;

                let reply = tokio::select! {
                    biased;
                    reply = inbox => reply.map_err(|_| RpcError::Closed)?,
                    _ = ctx.cancelled() => return Err(RpcError::Cancelled),
                };

                let result: R = decode_reply(reply)?;
                let id = request.id().map(str::to_owned);
                Ok(Box::new(Response::new(result).with_id(id)) as Box<dyn AnyResponse>)
            }
        });

        let response = self.interceptors.wrap_unary(inner)(ctx.clone(), Box::new(request)).await?;
        downcast_response(response)
    }

    /// Sends `request` as a notification. Returns once the transport accepted it.
    pub async fn notify<P>(
        &self,
        ctx: &Context,
        method: &str,
        mut request: Request<P>,
    ) -> Result<(), RpcError>
    where
        P: Serialize + Send + Sync + 'static,
    {
        request.stamp(None, method);

        let transport = Arc::clone(&self.transport);
        let inner = unary_fn(move |_ctx, request| {
            let transport = Arc::clone(&transport);
            async move {
                let mut outbound = Message::notification(request.method(), request.raw_payload()?);
                outbound.metadata = request.metadata().clone();
                transport.send(outbound).await?;
                Ok(Box::new(Response::new(())) as Box<dyn AnyResponse>)
            }
        });

        self.interceptors.wrap_unary(inner)(ctx.clone(), Box::new(request)).await?;
        Ok(())
    }
}

fn decode_reply<R: DeserializeOwned>(reply: Message) -> Result<R, RpcError> {
    if let Some(error) = reply.error {
        return Err(RpcError::Protocol {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }

    let result = reply.result.ok_or(RpcError::NoResult)?;
    serde_json::from_value(result).map_err(RpcError::Decode)
}
