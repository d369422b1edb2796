//! A bridge server bound to one host context.
//!
//! ```text
//! Created ──start──▶ Running ──shutdown──▶ ShuttingDown ──▶ Closed
//!    │                  │
//!    └──run_foreground──┴── serve loop ends on its own ──────▶ Closed
//! ```
//!
//! Binding happens in [`Session::bind`], so the assigned port is known before
//! anything is served. Serving happens on a Tokio task of its own, or on the
//! caller's task with [`Session::run_foreground`].
//!
//! A session serves whatever context its [`ContextRegistry`] currently holds;
//! record the context there before clients ask for it.

use std::sync::Arc;

use hostbridge_runtime::{
	BridgeServer, ConnectionParameters, HostObject, Namespace, ObjectStore, ShutdownHandle,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{ContextRegistry, SessionNamespace};
use crate::error::{Error, Result};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Created,
	Running,
	ShuttingDown,
	Closed,
}

/// A running (or about to run) bridge server plus the context it exposes.
pub struct Session {
	parameters: ConnectionParameters,
	shutdown: ShutdownHandle,
	state: Arc<Mutex<SessionState>>,
	server: Option<BridgeServer>,
	task: Option<JoinHandle<hostbridge_runtime::Result<()>>>,
	registry: Arc<ContextRegistry>,
	objects: Arc<ObjectStore>,
}

impl Session {
	/// Binds a server for the context held by `registry` without serving yet.
	///
	/// `namespace` is what remote `import` requests resolve against; the
	/// context module is layered on top of it. With `parameters.port == 0` the
	/// assigned port is available from [`address`](Self::address) on return.
	pub async fn bind(
		parameters: &ConnectionParameters,
		namespace: Arc<dyn Namespace>,
		registry: &Arc<ContextRegistry>,
	) -> Result<Self> {
		let namespace: Arc<dyn Namespace> =
			Arc::new(SessionNamespace::new(namespace, Arc::clone(registry)));
		let server = BridgeServer::bind(parameters, namespace).await?;

		Ok(Self {
			parameters: server.parameters().clone(),
			shutdown: server.shutdown_handle(),
			state: Arc::new(Mutex::new(SessionState::Created)),
			objects: server.objects(),
			server: Some(server),
			task: None,
			registry: Arc::clone(registry),
		})
	}

	/// Binds and starts serving in the background.
	pub async fn open(
		parameters: &ConnectionParameters,
		namespace: Arc<dyn Namespace>,
		registry: &Arc<ContextRegistry>,
	) -> Result<Self> {
		let mut session = Self::bind(parameters, namespace, registry).await?;
		session.start();
		Ok(session)
	}

	/// Starts the serve loop on a background task. No-op unless `Created`.
	pub fn start(&mut self) {
		let Some(server) = self.server.take() else {
			return;
		};

		*self.state.lock() = SessionState::Running;
		let state = Arc::clone(&self.state);
		let port = self.parameters.port;
		self.task = Some(tokio::spawn(async move {
			let result = server.serve().await;
			*state.lock() = SessionState::Closed;
			debug!(target = "hostbridge.session", port, "serve loop finished");
			result
		}));
	}

	/// Host and concrete port the session listens on.
	pub fn address(&self) -> (&str, u16) {
		(self.parameters.host.as_str(), self.parameters.port)
	}

	/// Bound parameters, for handing to a client.
	pub fn parameters(&self) -> &ConnectionParameters {
		&self.parameters
	}

	pub fn state(&self) -> SessionState {
		*self.state.lock()
	}

	/// The context remote callers currently get from this session.
	pub fn context(&self) -> Option<Arc<dyn HostObject>> {
		self.registry.current()
	}

	/// Number of objects currently held for remote clients.
	pub fn live_handles(&self) -> usize {
		self.objects.len()
	}

	/// Handle that stops the serve loop from elsewhere.
	pub fn shutdown_handle(&self) -> ShutdownHandle {
		self.shutdown.clone()
	}

	/// Stops serving and releases the listening socket.
	///
	/// Safe to call again, and safe after the server stopped on its own. An
	/// error from the serve loop itself is returned once.
	pub async fn shutdown(&mut self) -> Result<()> {
		{
			let mut state = self.state.lock();
			if *state == SessionState::Closed && self.task.is_none() {
				return Ok(());
			}
			if *state != SessionState::Closed {
				*state = SessionState::ShuttingDown;
			}
		}

		self.shutdown.shutdown();
		drop(self.server.take());

		let result = match self.task.take() {
			Some(task) => match task.await {
				Ok(served) => served.map_err(Error::from),
				Err(join) => Err(Error::ServerTask(join.to_string())),
			},
			None => Ok(()),
		};

		*self.state.lock() = SessionState::Closed;
		info!(
			target = "hostbridge.session",
			host = %self.parameters.host,
			port = self.parameters.port,
			"session closed"
		);
		result
	}

	/// Serves on the calling task until the session is stopped.
	///
	/// Stopping is done through a [`ShutdownHandle`] or by a client sending
	/// `shutdown`. A session already started in the background is waited on.
	pub async fn run_foreground(mut self) -> Result<()> {
		let Some(server) = self.server.take() else {
			return self.shutdown_when_done().await;
		};

		*self.state.lock() = SessionState::Running;
		info!(
			target = "hostbridge.session",
			host = %self.parameters.host,
			port = self.parameters.port,
			"serving in foreground"
		);
		let result = server.serve().await;
		*self.state.lock() = SessionState::Closed;
		result.map_err(Error::from)
	}

	async fn shutdown_when_done(&mut self) -> Result<()> {
		let result = match self.task.take() {
			Some(task) => match task.await {
				Ok(served) => served.map_err(Error::from),
				Err(join) => Err(Error::ServerTask(join.to_string())),
			},
			None => Ok(()),
		};
		*self.state.lock() = SessionState::Closed;
		result
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if self.state() == SessionState::Closed && self.task.is_none() {
			return;
		}
		warn!(
			target = "hostbridge.session",
			port = self.parameters.port,
			"session dropped without shutdown; stopping server"
		);
		self.shutdown.shutdown();
	}
}
