use hostbridge::{ClientFacade, ConnectionParameters, runtime};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownData {
	pub address: String,
	pub stopped: bool,
}

pub async fn execute(parameters: &ConnectionParameters, format: OutputFormat) -> Result<()> {
	let facade = ClientFacade::connect(parameters).await?;
	runtime::remote_shutdown(facade.connection()).await?;
	info!(target = "hostbridge.cli", addr = %parameters.address(), "server asked to stop");

	let result = ResultBuilder::new("shutdown")
		.data(ShutdownData {
			address: parameters.address(),
			stopped: true,
		})
		.build();
	print_result(&result, format);
	Ok(())
}
