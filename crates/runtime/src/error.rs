//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bridge runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// Could not bind the listening socket.
	#[error("Failed to bind bridge server on {addr}: {source}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	/// Failed to establish connection with the server.
	#[error("Failed to connect to bridge server: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (framing).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (malformed or uncorrelated messages).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error raised by the host while serving a request.
	#[error("{name}: {message}")]
	Remote {
		/// Error class (e.g., "AttributeError", "ImportError", "TimeoutError")
		name: String,
		message: String,
	},

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// No response within the configured response timeout.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Connection closed while a request was outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Invalid argument or configuration value.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// A remote value had a different shape than the caller expected.
	#[error("Unexpected remote value: {0}")]
	UnexpectedValue(String),
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns true for client-side and host-side timeouts alike.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}
}
