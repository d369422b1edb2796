//! Connection parameters shared by bridge servers and clients.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Loopback address bridge servers listen on unless told otherwise.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port a long-running bridge server listens on by convention.
pub const DEFAULT_SERVER_PORT: u16 = 4768;

/// How long a caller waits for any single response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

const ENV_HOST: &str = "HOSTBRIDGE_HOST";
const ENV_PORT: &str = "HOSTBRIDGE_PORT";
const ENV_RESPONSE_TIMEOUT_MS: &str = "HOSTBRIDGE_RESPONSE_TIMEOUT_MS";
const ENV_LOG_LEVEL: &str = "HOSTBRIDGE_LOG_LEVEL";

/// Verbosity of the bridge's own traffic logging.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	/// Whether messages at `level` should be emitted under this setting.
	pub fn allows(self, level: LogLevel) -> bool {
		level <= self
	}

	pub fn as_str(self) -> &'static str {
		match self {
			LogLevel::Error => "error",
			LogLevel::Warn => "warn",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"error" => Ok(LogLevel::Error),
			"warn" | "warning" => Ok(LogLevel::Warn),
			"info" => Ok(LogLevel::Info),
			"debug" => Ok(LogLevel::Debug),
			"trace" => Ok(LogLevel::Trace),
			other => Err(format!("unknown log level '{other}'")),
		}
	}
}

impl From<LogLevel> for tracing::level_filters::LevelFilter {
	fn from(level: LogLevel) -> Self {
		match level {
			LogLevel::Error => Self::ERROR,
			LogLevel::Warn => Self::WARN,
			LogLevel::Info => Self::INFO,
			LogLevel::Debug => Self::DEBUG,
			LogLevel::Trace => Self::TRACE,
		}
	}
}

/// Where a bridge server listens, or where a client connects.
///
/// `port == 0` asks the OS to assign a port at bind time; the server then
/// reports parameters carrying the concrete port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
	pub host: String,
	pub port: u16,
	pub response_timeout: Duration,
	pub log_level: LogLevel,
}

impl Default for ConnectionParameters {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_SERVER_PORT,
			response_timeout: DEFAULT_RESPONSE_TIMEOUT,
			log_level: LogLevel::default(),
		}
	}
}

impl ConnectionParameters {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			..Self::default()
		}
	}

	/// Loopback parameters with an OS-assigned port.
	pub fn ephemeral() -> Self {
		Self::new(DEFAULT_HOST, 0)
	}

	pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
		self.response_timeout = timeout;
		self
	}

	pub fn with_log_level(mut self, level: LogLevel) -> Self {
		self.log_level = level;
		self
	}

	/// Defaults overridden by `HOSTBRIDGE_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut params = Self::default();

		if let Some(host) = lookup(ENV_HOST) {
			params.host = host;
		}
		if let Some(port) = lookup(ENV_PORT) {
			params.port = port
				.trim()
				.parse()
				.map_err(|_| Error::InvalidArgument(format!("{ENV_PORT}={port} is not a port")))?;
		}
		if let Some(ms) = lookup(ENV_RESPONSE_TIMEOUT_MS) {
			let ms: u64 = ms.trim().parse().map_err(|_| {
				Error::InvalidArgument(format!("{ENV_RESPONSE_TIMEOUT_MS}={ms} is not a number"))
			})?;
			params.response_timeout = Duration::from_millis(ms);
		}
		if let Some(level) = lookup(ENV_LOG_LEVEL) {
			params.log_level = level.parse().map_err(Error::InvalidArgument)?;
		}

		Ok(params)
	}

	/// `host:port` form used in logs and error messages.
	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	/// True until a server has bound these parameters to a concrete port.
	pub fn is_unassigned(&self) -> bool {
		self.port == 0
	}

	pub(crate) fn bound_to(&self, port: u16) -> Self {
		Self {
			port,
			..self.clone()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key: &str| map.get(key).cloned()
	}

	#[test]
	fn defaults_match_conventional_server() {
		let params = ConnectionParameters::default();
		assert_eq!(params.address(), "127.0.0.1:4768");
		assert_eq!(params.response_timeout, Duration::from_secs(2));
		assert_eq!(params.log_level, LogLevel::Info);
		assert!(ConnectionParameters::ephemeral().is_unassigned());
	}

	#[test]
	fn env_overrides_apply() {
		let params = ConnectionParameters::from_lookup(lookup_from(&[
			("HOSTBRIDGE_HOST", "10.0.0.2"),
			("HOSTBRIDGE_PORT", "5000"),
			("HOSTBRIDGE_RESPONSE_TIMEOUT_MS", "250"),
			("HOSTBRIDGE_LOG_LEVEL", "DEBUG"),
		]))
		.unwrap();

		assert_eq!(params.host, "10.0.0.2");
		assert_eq!(params.port, 5000);
		assert_eq!(params.response_timeout, Duration::from_millis(250));
		assert_eq!(params.log_level, LogLevel::Debug);
	}

	#[test]
	fn bad_port_is_rejected() {
		let err =
			ConnectionParameters::from_lookup(lookup_from(&[("HOSTBRIDGE_PORT", "70000")]))
				.unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");
	}

	#[test]
	fn log_level_ordering() {
		assert!(LogLevel::Debug.allows(LogLevel::Info));
		assert!(!LogLevel::Warn.allows(LogLevel::Info));
		assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
		assert!("loud".parse::<LogLevel>().is_err());
	}
}
