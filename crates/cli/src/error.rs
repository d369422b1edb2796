use hostbridge::runtime;
use serde_json::json;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	Bridge(#[from] hostbridge::Error),

	#[error(transparent)]
	Transport(#[from] runtime::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = self.classify();
		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}

	fn classify(&self) -> (ErrorCode, Option<serde_json::Value>) {
		match self {
			CliError::Config(_) => (ErrorCode::InvalidInput, None),
			CliError::Bridge(err) => classify_bridge(err),
			CliError::Transport(err) => classify_transport(err),
			CliError::Anyhow(err) => {
				// Context layers wrap the original error; classify the innermost one we know.
				for cause in err.chain() {
					if let Some(err) = cause.downcast_ref::<hostbridge::Error>() {
						return classify_bridge(err);
					}
					if let Some(err) = cause.downcast_ref::<runtime::Error>() {
						return classify_transport(err);
					}
				}
				(ErrorCode::InternalError, None)
			}
		}
	}
}

fn classify_bridge(err: &hostbridge::Error) -> (ErrorCode, Option<serde_json::Value>) {
	match err {
		hostbridge::Error::Runtime(err) => classify_transport(err),
		hostbridge::Error::ContextUnavailable(_) => (ErrorCode::ContextUnavailable, None),
		_ => (ErrorCode::InternalError, None),
	}
}

fn classify_transport(err: &runtime::Error) -> (ErrorCode, Option<serde_json::Value>) {
	if err.is_timeout() {
		return (ErrorCode::Timeout, None);
	}
	match err {
		runtime::Error::ConnectionFailed(_) | runtime::Error::ChannelClosed => {
			(ErrorCode::ConnectionFailed, None)
		}
		runtime::Error::Remote { name, .. } => {
			(ErrorCode::RemoteError, Some(json!({ "name": name })))
		}
		runtime::Error::InvalidArgument(_) => (ErrorCode::InvalidInput, None),
		_ => (ErrorCode::InternalError, None),
	}
}
