//! JSON-RPC wire envelope
//!
//! A single [`Message`] type covers requests, notifications and replies; which one it is
//! depends on whether `method` and `id` are present.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation token. Kept as the raw JSON value so a responder echoes it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Value);

impl MessageId {
    /// Numeric view used for reply routing; accepts numbers and decimal strings.
    pub fn as_u64(&self) -> Option<u64> {
        match &self.0 {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(Value::Number(id.into()))
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(Value::String(id.to_string()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(text) => f.write_str(text),
            other => write!(f, "{other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Transport routing data (e.g. the SSE session). Never on the wire.
    #[serde(skip)]
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn request(id: impl Into<MessageId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: Some(method.into()),
            params: Some(params),
            ..Self::default()
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            method: Some(method.into()),
            params: Some(params),
            ..Self::default()
        }
    }

    /// Requests and notifications carry a method; replies never do.
    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn reply_with_result(&self, result: Value) -> Self {
        Self {
            result: Some(result),
            ..self.reply_envelope()
        }
    }

    pub fn reply_with_error(&self, code: i64, message: impl Into<String>) -> Self {
        Self {
            error: Some(ErrorDetail {
                code,
                message: message.into(),
                data: None,
            }),
            ..self.reply_envelope()
        }
    }

    pub fn reply_with_rpc_error(&self, err: &RpcError) -> Self {
        let mut reply = self.reply_with_error(err.code(), err.to_string());
        if let (RpcError::Protocol { data, .. }, Some(detail)) = (err, reply.error.as_mut()) {
            detail.data = data.clone();
        }
        reply
    }

    fn reply_envelope(&self) -> Self {
        Self {
            id: self.id.clone(),
            jsonrpc: Some(
                self.jsonrpc
                    .clone()
                    .unwrap_or_else(|| JSONRPC_VERSION.to_string()),
            ),
            metadata: self.metadata.clone(),
            ..Self::default()
        }
    }
}
