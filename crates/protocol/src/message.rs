//! Request/response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target of requests that are not addressed to a particular object.
pub const ROOT_TARGET: &str = "";

/// Method names understood by a bridge server.
pub mod method {
	/// Liveness check, answered with `"pong"`.
	pub const PING: &str = "ping";
	/// Resolve a module or package by dotted name. Root target only.
	pub const IMPORT: &str = "import";
	/// Read an attribute of the target object.
	pub const GET_ATTR: &str = "getattr";
	/// Invoke a method on the target object.
	pub const CALL: &str = "call";
	/// Evaluate an expression in the host with named bindings. Root target only.
	pub const EVAL: &str = "eval";
	/// Drop the server's reference to the target object.
	pub const RELEASE: &str = "release";
	/// Stop the server after answering. Root target only.
	pub const SHUTDOWN: &str = "shutdown";
}

/// Request sent from a bridge client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id, echoed back in the response.
	pub id: u32,
	/// Guid of the target object, or [`ROOT_TARGET`].
	#[serde(default)]
	pub target: String,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Response to a single [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

impl Response {
	pub fn ok(id: u32, result: Value) -> Self {
		Self {
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn err(id: u32, error: ErrorPayload) -> Self {
		Self {
			id,
			result: None,
			error: Some(error),
		}
	}
}

/// Error details carried by a failed [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error class, e.g. `AttributeError`, `ImportError`, `TimeoutError`.
	pub name: String,
	pub message: String,
}

impl ErrorPayload {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
		}
	}
}

/// Anything a client may read off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
