//! Client-side entry point for workers.

use std::sync::Arc;

use hostbridge_runtime::{
	Connection, ConnectionLike, ConnectionParameters, RemoteObject, RemoteValue, remote_eval,
	remote_import,
};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::{
	CONTEXT_ATTRIBUTE, CONTEXT_MODULE, CONTEXT_UNAVAILABLE, HOST_API_ROOT, RUNTIME_API_ROOT,
};

/// Remote view of a host, as seen from a worker.
///
/// The host and runtime API roots are resolved on first use and cached for
/// the life of the facade. The context is looked up on every call, since the
/// host may have rebound it.
pub struct ClientFacade {
	connection: Arc<dyn ConnectionLike>,
	host_api: OnceCell<RemoteObject>,
	runtime_api: OnceCell<RemoteObject>,
}

impl ClientFacade {
	/// Connects to the bridge server described by `parameters`.
	pub async fn connect(parameters: &ConnectionParameters) -> Result<Self> {
		let connection = Connection::connect(parameters).await?;
		Ok(Self::with_connection(connection))
	}

	/// Wraps an existing connection.
	pub fn with_connection(connection: Arc<dyn ConnectionLike>) -> Self {
		Self {
			connection,
			host_api: OnceCell::new(),
			runtime_api: OnceCell::new(),
		}
	}

	/// The underlying connection, for requests the facade does not cover.
	pub fn connection(&self) -> &Arc<dyn ConnectionLike> {
		&self.connection
	}

	/// Fetches the host context. Not cached.
	pub async fn get_context(&self) -> Result<RemoteObject> {
		let module = remote_import(&self.connection, CONTEXT_MODULE).await?;
		let value = module.get_attr(CONTEXT_ATTRIBUTE).await.map_err(|err| {
			if err.error_name() == Some(CONTEXT_UNAVAILABLE) {
				Error::ContextUnavailable(err.to_string())
			} else {
				Error::from(err)
			}
		})?;
		Ok(value.into_object()?)
	}

	/// Root package of the host API, resolved once.
	pub async fn get_host_api(&self) -> Result<&RemoteObject> {
		self.cached(&self.host_api, HOST_API_ROOT).await
	}

	/// Root package of the managed runtime, resolved once.
	pub async fn get_runtime_api(&self) -> Result<&RemoteObject> {
		self.cached(&self.runtime_api, RUNTIME_API_ROOT).await
	}

	/// Imports any module or loaded package by dotted name. Not cached.
	pub async fn remote_import(&self, name: &str) -> Result<RemoteObject> {
		Ok(remote_import(&self.connection, name).await?)
	}

	/// Evaluates `expression` in the host with `bindings` in scope. Not cached.
	///
	/// ```ignore
	/// let classes = facade
	///     .remote_eval("dex.getClasses()", &[("dex", dex.as_arg())])
	///     .await?;
	/// ```
	pub async fn remote_eval(
		&self,
		expression: &str,
		bindings: &[(&str, Value)],
	) -> Result<RemoteValue> {
		Ok(remote_eval(&self.connection, expression, bindings).await?)
	}

	async fn cached<'a>(&'a self, slot: &'a OnceCell<RemoteObject>, name: &str) -> Result<&'a RemoteObject> {
		let connection = &self.connection;
		slot.get_or_try_init(move || async move {
			debug!(target = "hostbridge.client", namespace = name, "resolving namespace root");
			remote_import(connection, name).await.map_err(Error::from)
		})
		.await
	}
}
