//! Error types for the bridge orchestration layer.

use thiserror::Error;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening sessions or driving the bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// The session could not bind its listening address.
	///
	/// Fatal to the call that opened the session; nothing is left running.
	#[error("Failed to open bridge session on {addr}: {source}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	/// Another orchestration already holds the process-wide context slot.
	#[error("An orchestration is already running in this process")]
	OrchestrationInProgress,

	/// The remote side has no host context to hand out.
	#[error("Host context unavailable: {0}")]
	ContextUnavailable(String),

	/// The serve loop task ended abnormally.
	#[error("Bridge server task failed: {0}")]
	ServerTask(String),

	/// Error from the bridge transport.
	#[error(transparent)]
	Runtime(hostbridge_runtime::Error),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl From<hostbridge_runtime::Error> for Error {
	fn from(err: hostbridge_runtime::Error) -> Self {
		match err {
			hostbridge_runtime::Error::Bind { addr, source } => Error::Bind { addr, source },
			other => Error::Runtime(other),
		}
	}
}

impl Error {
	/// Returns the remote error name, if the host raised this error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Runtime(err) => err.error_name(),
			_ => None,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Runtime(err) if err.is_timeout())
	}
}
