//! Host entry point for the long-running server mode.
//!
//! The host calls a script's `run` with its context and expects it to return
//! promptly. [`BridgeServerScript`] records the context, preloads the host
//! packages, and leaves a bridge server running on a thread of its own.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use hostbridge_runtime::{ConnectionParameters, HostObject, Namespace, ShutdownHandle};
use tracing::{error, info};

use crate::context::ContextRegistry;
use crate::error::{Error, Result};
use crate::preload::NamespacePreloader;
use crate::session::Session;

/// A script the host invokes with its context.
pub trait HostScript {
	fn run(&self, context: Arc<dyn HostObject>);
}

/// Serves the host context until a client asks the server to stop.
pub struct BridgeServerScript {
	namespace: Arc<dyn Namespace>,
	registry: Arc<ContextRegistry>,
	preloader: NamespacePreloader,
	parameters: ConnectionParameters,
}

impl BridgeServerScript {
	/// Script on the conventional address, using the process-wide registry.
	pub fn new(namespace: Arc<dyn Namespace>) -> Self {
		Self {
			namespace,
			registry: ContextRegistry::global(),
			preloader: NamespacePreloader::default(),
			parameters: ConnectionParameters::default(),
		}
	}

	pub fn with_registry(mut self, registry: Arc<ContextRegistry>) -> Self {
		self.registry = registry;
		self
	}

	pub fn with_preloader(mut self, preloader: NamespacePreloader) -> Self {
		self.preloader = preloader;
		self
	}

	pub fn with_parameters(mut self, parameters: ConnectionParameters) -> Self {
		self.parameters = parameters;
		self
	}

	/// Publishes `context`, then starts the server thread and returns once the
	/// listener is bound.
	///
	/// The context is published even if binding fails, so running again while
	/// an earlier server still listens rebinds what that server hands out.
	pub fn launch(&self, context: Arc<dyn HostObject>) -> Result<BackgroundServer> {
		self.registry.publish(&context)?;
		self.preloader.preload(self.namespace.as_ref());

		let (ready_tx, ready_rx) = mpsc::channel();
		let namespace = Arc::clone(&self.namespace);
		let registry = Arc::clone(&self.registry);
		let parameters = self.parameters.clone();

		let thread = thread::Builder::new()
			.name("hostbridge-server".to_string())
			.spawn(move || -> Result<()> {
				let runtime = match tokio::runtime::Builder::new_current_thread()
					.enable_all()
					.build()
				{
					Ok(runtime) => runtime,
					Err(err) => {
						let _ = ready_tx.send(Err(Error::Io(err)));
						return Ok(());
					}
				};

				runtime.block_on(async move {
					let session = match Session::bind(&parameters, namespace, &registry).await {
						Ok(session) => session,
						Err(err) => {
							let _ = ready_tx.send(Err(err));
							return Ok(());
						}
					};
					let _ = ready_tx.send(Ok((
						session.parameters().clone(),
						session.shutdown_handle(),
					)));
					session.run_foreground().await
				})
			})?;

		let (parameters, shutdown) = ready_rx
			.recv()
			.map_err(|_| Error::ServerTask("server thread exited before binding".to_string()))??;

		Ok(BackgroundServer {
			parameters,
			shutdown,
			thread,
		})
	}
}

impl HostScript for BridgeServerScript {
	fn run(&self, context: Arc<dyn HostObject>) {
		match self.launch(context) {
			Ok(server) => info!(
				target = "hostbridge",
				host = %server.parameters.host,
				port = server.parameters.port,
				"bridge server running in background; it keeps serving after this script returns"
			),
			Err(err) => error!(target = "hostbridge", error = %err, "failed to launch bridge server"),
		}
	}
}

/// A server started by [`BridgeServerScript::launch`].
///
/// Dropping it leaves the server running.
pub struct BackgroundServer {
	parameters: ConnectionParameters,
	shutdown: ShutdownHandle,
	thread: thread::JoinHandle<Result<()>>,
}

impl BackgroundServer {
	pub fn parameters(&self) -> &ConnectionParameters {
		&self.parameters
	}

	pub fn address(&self) -> (&str, u16) {
		(self.parameters.host.as_str(), self.parameters.port)
	}

	pub fn shutdown_handle(&self) -> ShutdownHandle {
		self.shutdown.clone()
	}

	/// Blocks until the server thread ends.
	pub fn join(self) -> Result<()> {
		self.thread
			.join()
			.map_err(|_| Error::ServerTask("server thread panicked".to_string()))?
	}
}

#[cfg(test)]
mod tests {
	use hostbridge_runtime::{ModuleRegistry, ping, remote_shutdown};

	use super::*;
	use crate::facade::ClientFacade;

	struct Ctx(&'static str);

	impl HostObject for Ctx {
		fn type_name(&self) -> &str {
			self.0
		}
	}

	fn script(registry: &Arc<ContextRegistry>) -> BridgeServerScript {
		BridgeServerScript::new(Arc::new(ModuleRegistry::new()))
			.with_registry(Arc::clone(registry))
			.with_preloader(NamespacePreloader::empty())
			.with_parameters(ConnectionParameters::ephemeral())
	}

	#[tokio::test]
	async fn serves_in_background_until_remote_shutdown() {
		let registry = Arc::new(ContextRegistry::new());
		let context: Arc<dyn HostObject> = Arc::new(Ctx("ClientContext"));

		let server = script(&registry).launch(Arc::clone(&context)).unwrap();
		assert_ne!(server.address().1, 0);
		assert!(Arc::ptr_eq(&registry.current().unwrap(), &context));

		let facade = ClientFacade::connect(server.parameters()).await.unwrap();
		ping(facade.connection()).await.unwrap();
		let remote = facade.get_context().await.unwrap();
		assert_eq!(remote.type_name(), "ClientContext");

		remote_shutdown(facade.connection()).await.unwrap();
		tokio::task::spawn_blocking(move || server.join())
			.await
			.unwrap()
			.unwrap();
	}

	#[tokio::test]
	async fn keeps_context_alive_while_serving() {
		let registry = Arc::new(ContextRegistry::new());
		let server = script(&registry).launch(Arc::new(Ctx("ClientContext"))).unwrap();

		let facade = ClientFacade::connect(server.parameters()).await.unwrap();
		assert_eq!(facade.get_context().await.unwrap().type_name(), "ClientContext");

		server.shutdown_handle().shutdown();
		tokio::task::spawn_blocking(move || server.join())
			.await
			.unwrap()
			.unwrap();
	}

	#[test]
	fn refuses_to_publish_during_an_orchestration() {
		let registry = Arc::new(ContextRegistry::new());
		let held: Arc<dyn HostObject> = Arc::new(Ctx("ClientContext"));
		let _lease = registry.begin_orchestration(&held).unwrap();

		let err = script(&registry).launch(Arc::new(Ctx("ClientContext"))).err().unwrap();
		assert!(matches!(err, Error::OrchestrationInProgress));
	}

	#[tokio::test]
	async fn running_again_rebinds_the_served_context() {
		let registry = Arc::new(ContextRegistry::new());
		let first: Arc<dyn HostObject> = Arc::new(Ctx("ProjectA"));
		let first_weak = Arc::downgrade(&first);

		let server = script(&registry).launch(first).unwrap();
		let facade = ClientFacade::connect(server.parameters()).await.unwrap();
		assert_eq!(facade.get_context().await.unwrap().type_name(), "ProjectA");

		// Same address: the bind fails, the publish does not.
		let again = script(&registry).with_parameters(server.parameters().clone());
		let err = again.launch(Arc::new(Ctx("ProjectB"))).err().unwrap();
		assert!(matches!(err, Error::Bind { .. }));

		assert_eq!(facade.get_context().await.unwrap().type_name(), "ProjectB");
		// The server drops its handle on the old context once the proxy's release lands.
		let mut released = false;
		for _ in 0..100 {
			if first_weak.upgrade().is_none() {
				released = true;
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
		assert!(released, "old context still reachable");

		server.shutdown_handle().shutdown();
		tokio::task::spawn_blocking(move || server.join())
			.await
			.unwrap()
			.unwrap();
	}
}
