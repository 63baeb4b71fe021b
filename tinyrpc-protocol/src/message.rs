//! Request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which envelope a payload is expected to hold.
///
/// Serves as the type hint handed to a [`PayloadSerializer`](crate::PayloadSerializer):
/// servers decode requests, clients decode responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
        }
    }
}

/// Request message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation key, unique among the connection's outstanding calls.
    pub call_id: u64,

    /// Method or route selecting the handler.
    pub route: String,

    /// Handler argument.
    #[serde(default)]
    pub argument: Value,
}

impl Request {
    pub fn new(call_id: u64, route: impl Into<String>) -> Self {
        Self {
            call_id,
            route: route.into(),
            argument: Value::Null,
        }
    }

    pub fn with_argument(mut self, argument: Value) -> Self {
        self.argument = argument;
        self
    }
}

/// Response message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Call id of the request this response answers.
    pub call_id: u64,

    /// Error reported by the remote side, if the call failed.
    #[serde(default)]
    pub error: Option<String>,

    /// Result payload (`null` for error responses).
    #[serde(default)]
    pub result: Value,
}

impl Response {
    pub fn ok(call_id: u64, result: Value) -> Self {
        Self {
            call_id,
            error: None,
            result,
        }
    }

    pub fn error(call_id: u64, error: impl Into<String>) -> Self {
        Self {
            call_id,
            error: Some(error.into()),
            result: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the response into its result or the remote error message.
    pub fn into_result(self) -> Result<Value, String> {
        match self.error {
            Some(message) => Err(message),
            None => Ok(self.result),
        }
    }
}

/// Either envelope, as produced by a serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
        }
    }

    pub fn call_id(&self) -> u64 {
        match self {
            Message::Request(r) => r.call_id,
            Message::Response(r) => r.call_id,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}
