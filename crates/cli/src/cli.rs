use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hostbridge::{ConnectionParameters, LogLevel};

use crate::error::{CliError, Result};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hostbridge")]
#[command(about = "Reach a host application's context over a bridge connection")]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Log level for the bridge (overrides -v): error, warn, info, debug, trace
	#[arg(long, global = true, value_name = "LEVEL")]
	pub log_level: Option<LogLevel>,

	/// Output format: text (default), json, or ndjson
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Resolve the host context and API roots and print what was found
	///
	/// Accepts the flags an orchestrated worker is started with, so it can be
	/// used as a worker directly.
	#[command(args_override_self = true)]
	Probe {
		#[command(flatten)]
		connect: ConnectArgs,
	},

	/// Check that a bridge server answers
	#[command(args_override_self = true)]
	Ping {
		#[command(flatten)]
		connect: ConnectArgs,
	},

	/// Ask a long-running bridge server to stop
	#[command(args_override_self = true)]
	Shutdown {
		#[command(flatten)]
		connect: ConnectArgs,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Probe { .. } => "probe",
			Commands::Ping { .. } => "ping",
			Commands::Shutdown { .. } => "shutdown",
		}
	}
}

/// Where the bridge server is. Unset flags fall back to `HOSTBRIDGE_*`
/// environment variables, then to the conventional defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
	/// Bridge server host
	#[arg(long = "connect_to_host", value_name = "HOST")]
	pub host: Option<String>,

	/// Bridge server port
	#[arg(long = "connect_to_port", value_name = "PORT")]
	pub port: Option<u16>,

	/// How long to wait for each response
	#[arg(long, value_name = "MS")]
	pub response_timeout_ms: Option<u64>,
}

impl ConnectArgs {
	pub fn parameters(&self, log_level: Option<LogLevel>) -> Result<ConnectionParameters> {
		let base = ConnectionParameters::from_env().map_err(|e| CliError::Config(e.to_string()))?;
		Ok(self.apply(base, log_level))
	}

	/// Overrides `base` with whatever was given on the command line.
	pub fn apply(
		&self,
		mut base: ConnectionParameters,
		log_level: Option<LogLevel>,
	) -> ConnectionParameters {
		if let Some(host) = &self.host {
			base.host = host.clone();
		}
		if let Some(port) = self.port {
			base.port = port;
		}
		if let Some(ms) = self.response_timeout_ms {
			base.response_timeout = Duration::from_millis(ms);
		}
		if let Some(level) = log_level {
			base.log_level = level;
		}
		base
	}
}
