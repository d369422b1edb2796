//! Bridge server: accept loop and request dispatch.
//!
//! Binding is done up front by [`BridgeServer::bind`] so the assigned port is
//! known before anything is served; [`BridgeServer::serve`] then runs until a
//! [`ShutdownHandle`] fires or a client sends `shutdown`. When `serve` returns
//! the listener is closed and every client connection has been torn down.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use hostbridge_protocol::{
	ErrorPayload, HandleRef, ROOT_TARGET, Request, Response, decode_handle, encode_handle,
	method,
};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::config::{ConnectionParameters, LogLevel};
use crate::error::{Error, Result};
use crate::host::{HostError, HostObject, HostResult, HostValue};
use crate::namespace::Namespace;
use crate::object_store::{ClientId, ObjectStore};
use crate::transport::{read_frame, write_frame};

/// Signals a running [`BridgeServer`] to stop.
///
/// Cheap to clone; firing it more than once, or after the server has already
/// stopped, has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
	tx: watch::Sender<bool>,
}

impl ShutdownHandle {
	pub fn shutdown(&self) {
		self.tx.send_replace(true);
	}

	pub fn is_shutdown(&self) -> bool {
		*self.tx.borrow()
	}
}

/// A bound, not yet serving, bridge server.
pub struct BridgeServer {
	listener: TcpListener,
	parameters: ConnectionParameters,
	namespace: Arc<dyn Namespace>,
	objects: Arc<ObjectStore>,
	shutdown_tx: watch::Sender<bool>,
}

impl BridgeServer {
	/// Binds the listening socket described by `parameters`.
	///
	/// With `port == 0` the OS picks a port; [`parameters`](Self::parameters)
	/// reports it once this returns.
	pub async fn bind(
		parameters: &ConnectionParameters,
		namespace: Arc<dyn Namespace>,
	) -> Result<Self> {
		let listener = TcpListener::bind((parameters.host.as_str(), parameters.port))
			.await
			.map_err(|source| Error::Bind {
				addr: parameters.address(),
				source,
			})?;
		let local = listener.local_addr()?;
		let parameters = parameters.bound_to(local.port());

		info!(
			target = "hostbridge.server",
			addr = %local,
			response_timeout_ms = parameters.response_timeout.as_millis() as u64,
			"bridge server listening"
		);

		let (shutdown_tx, _) = watch::channel(false);
		Ok(Self {
			listener,
			parameters,
			namespace,
			objects: Arc::new(ObjectStore::new()),
			shutdown_tx,
		})
	}

	/// Parameters with the concrete bound port.
	pub fn parameters(&self) -> &ConnectionParameters {
		&self.parameters
	}

	pub fn local_addr(&self) -> Result<SocketAddr> {
		self.listener.local_addr().map_err(Into::into)
	}

	pub fn shutdown_handle(&self) -> ShutdownHandle {
		ShutdownHandle {
			tx: self.shutdown_tx.clone(),
		}
	}

	/// The handle table shared by every client of this server.
	pub fn objects(&self) -> Arc<ObjectStore> {
		Arc::clone(&self.objects)
	}

	/// Serves clients until shut down.
	pub async fn serve(self) -> Result<()> {
		let Self {
			listener,
			parameters,
			namespace,
			objects,
			shutdown_tx,
		} = self;

		let mut shutdown_rx = shutdown_tx.subscribe();
		let dispatcher = Arc::new(Dispatcher {
			namespace,
			objects,
			parameters: parameters.clone(),
			shutdown: ShutdownHandle { tx: shutdown_tx },
		});
		let mut connections = JoinSet::new();
		let mut next_client: ClientId = 0;

		let result = loop {
			if *shutdown_rx.borrow_and_update() {
				break Ok(());
			}

			tokio::select! {
				changed = shutdown_rx.changed() => {
					if changed.is_err() {
						break Ok(());
					}
				}
				accept = listener.accept() => match accept {
					Ok((stream, peer)) => {
						next_client += 1;
						let client = next_client;
						debug!(target = "hostbridge.server", %peer, client, "client connected");
						let dispatcher = Arc::clone(&dispatcher);
						connections.spawn(async move {
							if let Err(err) = dispatcher.handle_client(client, stream).await {
								warn!(target = "hostbridge.server", %peer, error = %err, "client connection error");
							}
							let released = dispatcher.objects.release_owner(client);
							debug!(target = "hostbridge.server", %peer, client, released, "client disconnected");
						});
					}
					Err(err) => {
						warn!(target = "hostbridge.server", error = %err, "accept failed");
						break Err(Error::Io(err));
					}
				},
				Some(_) = connections.join_next(), if !connections.is_empty() => {}
			}
		};

		drop(listener);
		connections.shutdown().await;
		dispatcher.objects.clear();
		info!(
			target = "hostbridge.server",
			port = parameters.port,
			"bridge server stopped"
		);
		result
	}
}

struct Dispatcher {
	namespace: Arc<dyn Namespace>,
	objects: Arc<ObjectStore>,
	parameters: ConnectionParameters,
	shutdown: ShutdownHandle,
}

impl Dispatcher {
	async fn handle_client(&self, client: ClientId, stream: TcpStream) -> Result<()> {
		stream.set_nodelay(true)?;
		let (mut reader, mut writer) = stream.into_split();

		while let Some(frame) = read_frame(&mut reader).await? {
			let (response, stop) = match serde_json::from_slice::<Request>(&frame) {
				Ok(request) => {
					let stop = request.method == method::SHUTDOWN;
					(self.handle_request(client, request).await, stop)
				}
				Err(err) => {
					let id = serde_json::from_slice::<Value>(&frame)
						.ok()
						.and_then(|v| v.get("id").and_then(Value::as_u64))
						.unwrap_or(0) as u32;
					warn!(target = "hostbridge.server", id, error = %err, "malformed request");
					(
						Response::err(id, ErrorPayload::new("ProtocolError", err.to_string())),
						false,
					)
				}
			};

			write_frame(&mut writer, &response).await?;

			if stop {
				info!(target = "hostbridge.server", "shutdown requested by client");
				self.shutdown.shutdown();
				break;
			}
		}

		Ok(())
	}

	async fn handle_request(&self, client: ClientId, request: Request) -> Response {
		let Request {
			id,
			target,
			method: method_name,
			params,
		} = request;

		if self.parameters.log_level.allows(LogLevel::Debug) {
			debug!(target = "hostbridge.server", id, object = %target, method = %method_name, "request");
		}

		match self.dispatch(client, &target, &method_name, params).await {
			Ok(result) => {
				if self.parameters.log_level.allows(LogLevel::Trace) {
					trace!(target = "hostbridge.server", id, %result, "response");
				}
				Response::ok(id, result)
			}
			Err(err) => {
				debug!(target = "hostbridge.server", id, method = %method_name, error = %err, "request failed");
				Response::err(id, err.into())
			}
		}
	}

	async fn dispatch(
		&self,
		client: ClientId,
		target: &str,
		method_name: &str,
		params: Value,
	) -> HostResult<Value> {
		match method_name {
			method::PING => Ok(Value::from("pong")),
			method::SHUTDOWN => Ok(Value::from("ok")),
			method::IMPORT => {
				let name = string_param(&params, "name")?;
				let module = self
					.namespace
					.lookup(&name)
					.ok_or_else(|| HostError::import(&name))?;
				Ok(self.encode(client, HostValue::Object(module)))
			}
			method::GET_ATTR => {
				let object = self.resolve_target(target)?;
				let name = string_param(&params, "name")?;
				let value = self.run_blocking(move || object.get_attr(&name)).await?;
				Ok(self.encode(client, value))
			}
			method::CALL => {
				let object = self.resolve_target(target)?;
				let name = string_param(&params, "method")?;
				let args = match params.get("args") {
					None | Some(Value::Null) => Vec::new(),
					Some(Value::Array(items)) => items
						.iter()
						.map(|item| self.decode(item))
						.collect::<HostResult<Vec<_>>>()?,
					Some(_) => return Err(HostError::type_error("'args' must be an array")),
				};
				let value = self.run_blocking(move || object.call(&name, args)).await?;
				Ok(self.encode(client, value))
			}
			method::EVAL => {
				let expression = string_param(&params, "expression")?;
				let bindings = match params.get("bindings") {
					None | Some(Value::Null) => HashMap::new(),
					Some(Value::Object(entries)) => entries
						.iter()
						.map(|(name, value)| Ok((name.clone(), self.decode(value)?)))
						.collect::<HostResult<HashMap<_, _>>>()?,
					Some(_) => return Err(HostError::type_error("'bindings' must be an object")),
				};
				let namespace = Arc::clone(&self.namespace);
				let value = self
					.run_blocking(move || namespace.evaluate(&expression, &bindings))
					.await?;
				Ok(self.encode(client, value))
			}
			method::RELEASE => {
				self.objects.remove(target);
				Ok(Value::Null)
			}
			other => Err(HostError::new(
				"ProtocolError",
				format!("unknown method '{other}'"),
			)),
		}
	}

	fn resolve_target(&self, target: &str) -> HostResult<Arc<dyn HostObject>> {
		if target == ROOT_TARGET {
			return Err(HostError::type_error("request needs a target object"));
		}
		self.objects.try_get(target).ok_or_else(|| unknown_handle(target))
	}

	/// Runs a host call on the blocking pool, bounded by the response timeout.
	async fn run_blocking<F>(&self, call: F) -> HostResult<HostValue>
	where
		F: FnOnce() -> HostResult<HostValue> + Send + 'static,
	{
		let timeout = self.parameters.response_timeout;
		match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
			Ok(Ok(result)) => result,
			Ok(Err(join)) => Err(HostError::new(
				"RuntimeError",
				format!("host call panicked: {join}"),
			)),
			Err(_) => Err(HostError::timeout(timeout)),
		}
	}

	fn encode(&self, client: ClientId, value: HostValue) -> Value {
		match value {
			HostValue::Data(data) => data,
			HostValue::Object(object) => encode_handle(&self.objects.insert(client, object)),
			HostValue::List(items) => Value::Array(
				items
					.into_iter()
					.map(|item| self.encode(client, item))
					.collect(),
			),
		}
	}

	fn decode(&self, value: &Value) -> HostResult<HostValue> {
		if let Some(HandleRef { guid, .. }) = decode_handle(value) {
			return self
				.objects
				.try_get(&guid)
				.map(HostValue::Object)
				.ok_or_else(|| unknown_handle(&guid));
		}
		match value {
			Value::Array(items) => items
				.iter()
				.map(|item| self.decode(item))
				.collect::<HostResult<Vec<_>>>()
				.map(HostValue::List),
			other => Ok(HostValue::Data(other.clone())),
		}
	}
}

fn string_param(params: &Value, key: &str) -> HostResult<String> {
	params
		.get(key)
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| HostError::type_error(format!("missing string parameter '{key}'")))
}

fn unknown_handle(guid: &str) -> HostError {
	HostError::new("ReferenceError", format!("unknown or released handle '{guid}'"))
}

#[cfg(test)]
mod tests;
