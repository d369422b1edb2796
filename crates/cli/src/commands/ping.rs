use std::time::Instant;

use hostbridge::{ClientFacade, ConnectionParameters, runtime};
use serde::Serialize;

use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingData {
	pub address: String,
	pub round_trip_ms: u64,
}

pub async fn execute(parameters: &ConnectionParameters, format: OutputFormat) -> Result<()> {
	let facade = ClientFacade::connect(parameters).await?;

	let started = Instant::now();
	runtime::ping(facade.connection()).await?;
	let elapsed = started.elapsed();

	let result = ResultBuilder::new("ping")
		.data(PingData {
			address: parameters.address(),
			round_trip_ms: elapsed.as_millis() as u64,
		})
		.duration(elapsed)
		.build();
	print_result(&result, format);
	Ok(())
}
