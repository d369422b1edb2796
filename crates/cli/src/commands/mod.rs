mod ping;
mod probe;
mod shutdown;

use serde::Serialize;

use crate::cli::{Cli, Commands};
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	let log_level = cli.log_level;

	match cli.command {
		Commands::Probe { connect } => probe::execute(&connect.parameters(log_level)?, format).await,
		Commands::Ping { connect } => ping::execute(&connect.parameters(log_level)?, format).await,
		Commands::Shutdown { connect } => {
			shutdown::execute(&connect.parameters(log_level)?, format).await
		}
	}
}

/// A remote object as shown in command output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
	pub guid: String,
	#[serde(rename = "type")]
	pub type_name: String,
}

impl From<&hostbridge::RemoteObject> for RemoteRef {
	fn from(object: &hostbridge::RemoteObject) -> Self {
		Self {
			guid: object.guid().to_string(),
			type_name: object.type_name().to_string(),
		}
	}
}

impl std::fmt::Display for RemoteRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.type_name, self.guid)
	}
}
