//! Typed request/response wrappers and their type-erased views
//!
//! Interceptors and the dispatch machinery only ever see `Box<dyn AnyRequest>` /
//! `Box<dyn AnyResponse>`; the typed call sites downcast back on the way out.

use std::{any::Any, collections::HashMap, fmt};

use serde::Serialize;
use serde_json::Value;

use crate::errors::RpcError;

pub trait AnyRequest: Send + Sync + 'static {
    fn id(&self) -> Option<&str>;
    fn method(&self) -> &str;
    fn metadata(&self) -> &HashMap<String, String>;
    fn raw_payload(&self) -> Result<Value, RpcError>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

pub trait AnyResponse: Send + Sync + 'static {
    fn id(&self) -> Option<&str>;
    fn raw_payload(&self) -> Result<Value, RpcError>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl fmt::Debug for dyn AnyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyRequest")
            .field("id", &self.id())
            .field("method", &self.method())
            .finish()
    }
}

impl fmt::Debug for dyn AnyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyResponse")
            .field("id", &self.id())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request<T> {
    pub params: T,
    id: Option<String>,
    method: String,
    metadata: HashMap<String, String>,
}

impl<T> Request<T> {
    pub fn new(params: T) -> Self {
        Self {
            params,
            id: None,
            method: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub(crate) fn stamp(&mut self, id: Option<String>, method: impl Into<String>) {
        self.id = id;
        self.method = method.into();
    }

    /// Attaches transport routing data, e.g. the SSE session a server-initiated call targets.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl<T> AnyRequest for Request<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    fn raw_payload(&self) -> Result<Value, RpcError> {
        serde_json::to_value(&self.params).map_err(RpcError::Encode)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Response<T> {
    pub result: T,
    id: Option<String>,
}

impl<T> Response<T> {
    pub fn new(result: T) -> Self {
        Self { result, id: None }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

impl<T> AnyResponse for Response<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn raw_payload(&self) -> Result<Value, RpcError> {
        serde_json::to_value(&self.result).map_err(RpcError::Encode)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

pub(crate) fn downcast_request<T: 'static>(
    request: Box<dyn AnyRequest>,
) -> Result<Request<T>, RpcError> {
    request
        .into_any()
        .downcast::<Request<T>>()
        .map(|request| *request)
        .map_err(|_| RpcError::handler("interceptor replaced the request with an incompatible type"))
}

pub(crate) fn downcast_response<T: 'static>(
    response: Box<dyn AnyResponse>,
) -> Result<Response<T>, RpcError> {
    response
        .into_any()
        .downcast::<Response<T>>()
        .map(|response| *response)
        .map_err(|_| {
            RpcError::handler("interceptor replaced the response with an incompatible type")
        })
}
