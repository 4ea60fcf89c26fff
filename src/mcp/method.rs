//! Method names each role serves.

use std::{fmt, str::FromStr};

use crate::errors::RpcError;

/// Methods a server answers (and a client calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerMethod {
    Initialize,
    Ping,
    ListTools,
    CallTool,
    ListPrompts,
    GetPrompt,
    ListResources,
    ReadResource,
    ListResourceTemplates,
    Completion,
    SetLogLevel,
    Initialized,
}

impl ServerMethod {
    pub const ALL: [Self; 12] = [
        Self::Initialize,
        Self::Ping,
        Self::ListTools,
        Self::CallTool,
        Self::ListPrompts,
        Self::GetPrompt,
        Self::ListResources,
        Self::ReadResource,
        Self::ListResourceTemplates,
        Self::Completion,
        Self::SetLogLevel,
        Self::Initialized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ListTools => "tools/list",
            Self::CallTool => "tools/call",
            Self::ListPrompts => "prompts/list",
            Self::GetPrompt => "prompts/get",
            Self::ListResources => "resources/list",
            Self::ReadResource => "resources/read",
            Self::ListResourceTemplates => "resources/templates/list",
            Self::Completion => "completion/complete",
            Self::SetLogLevel => "logging/setLevel",
            Self::Initialized => "notifications/initialized",
        }
    }
}

/// Methods a client answers (and a server calls).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMethod {
    Ping,
    ListRoots,
    LogMessage,
}

impl ClientMethod {
    pub const ALL: [Self; 3] = [Self::Ping, Self::ListRoots, Self::LogMessage];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ListRoots => "roots/list",
            Self::LogMessage => "notifications/message",
        }
    }
}

macro_rules! method_name_impls {
    ($method:ty) => {
        impl FromStr for $method {
            type Err = RpcError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|method| method.as_str() == name)
                    .ok_or_else(|| RpcError::MethodNotFound(name.to_string()))
            }
        }

        impl fmt::Display for $method {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

method_name_impls!(ServerMethod);
method_name_impls!(ClientMethod);
