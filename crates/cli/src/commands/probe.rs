//! Probe command.

use std::time::Instant;

use anyhow::Context;
use hostbridge::{ClientFacade, ConnectionParameters, HOST_API_ROOT, RUNTIME_API_ROOT};
use serde::Serialize;
use tracing::info;

use super::RemoteRef;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeData {
	pub address: String,
	pub context: String,
	pub host_api: String,
	pub runtime_api: String,
}

pub async fn execute(parameters: &ConnectionParameters, format: OutputFormat) -> Result<()> {
	let started = Instant::now();
	info!(target = "hostbridge.cli", addr = %parameters.address(), "probe");

	let facade = ClientFacade::connect(parameters).await?;
	let context = RemoteRef::from(&facade.get_context().await?);
	let host_api = RemoteRef::from(
		facade
			.get_host_api()
			.await
			.with_context(|| format!("resolving {HOST_API_ROOT}"))?,
	);
	let runtime_api = RemoteRef::from(
		facade
			.get_runtime_api()
			.await
			.with_context(|| format!("resolving {RUNTIME_API_ROOT}"))?,
	);

	let result = ResultBuilder::new("probe")
		.data(ProbeData {
			address: parameters.address(),
			context: context.to_string(),
			host_api: host_api.to_string(),
			runtime_api: runtime_api.to_string(),
		})
		.duration(started.elapsed())
		.build();
	print_result(&result, format);
	Ok(())
}
