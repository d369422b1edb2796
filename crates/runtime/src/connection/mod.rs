//! Client side of a bridge connection.
//!
//! Handles request/response correlation on top of the framed transport:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Bounding every request by the configured response timeout
//! - Failing outstanding requests when the server goes away
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with target, method, and params
//! 2. Connection generates an ID and parks a oneshot sender under it
//! 3. The writer task frames the request onto the socket
//! 4. The reader task receives the response and completes the oneshot
//! 5. Caller receives the result, or a timeout after `response_timeout`

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};

use hostbridge_protocol::{Message, Request, Response};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ConnectionParameters, LogLevel};
use crate::error::{Error, Result};
use crate::transport::{read_frame, write_frame};

/// The interface remote proxies need from a connection.
///
/// Object-safe so proxies hold an `Arc<dyn ConnectionLike>` and tests can
/// substitute a scripted connection.
pub trait ConnectionLike: Send + Sync {
	/// Sends a request to `target` and awaits its result.
	fn send_message(
		&self,
		target: &str,
		method: &str,
		params: Value,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>>;
}

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII guard removing a callback whose request future was dropped early.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// TCP connection to a bridge server.
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU32,
	callbacks: CallbackMap,
	/// Set once the reader has seen the stream end
	closed: Arc<AtomicBool>,
	/// Requests queued for the writer task
	outbound_tx: mpsc::UnboundedSender<Request>,
	parameters: ConnectionParameters,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
	/// Connects to the server at `parameters.host:parameters.port`.
	pub async fn connect(parameters: &ConnectionParameters) -> Result<Arc<Self>> {
		let stream = TcpStream::connect((parameters.host.as_str(), parameters.port))
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{}: {e}", parameters.address())))?;
		stream.set_nodelay(true)?;

		tracing::info!(
			target = "hostbridge.client",
			addr = %parameters.address(),
			"connected to bridge server"
		);

		let (reader, writer) = stream.into_split();
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let callbacks = CallbackMap::default();
		let closed = Arc::new(AtomicBool::new(false));

		let reader_task = tokio::spawn(read_loop(
			reader,
			Arc::clone(&callbacks),
			Arc::clone(&closed),
			parameters.log_level,
		));
		let writer_task = tokio::spawn(write_loop(writer, outbound_rx));

		Ok(Arc::new(Self {
			last_id: AtomicU32::new(0),
			callbacks,
			closed,
			outbound_tx,
			parameters: parameters.clone(),
			tasks: Mutex::new(vec![reader_task, writer_task]),
		}))
	}

	pub fn parameters(&self) -> &ConnectionParameters {
		&self.parameters
	}

	/// True once the server side of the stream has closed.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Sends a request and awaits the correlated response.
	pub async fn send_message(&self, target: &str, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		if self.parameters.log_level.allows(LogLevel::Debug) {
			tracing::debug!(target = "hostbridge.client", id, object = target, method, "sending request");
		}

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		// The reader may have drained the callback map between the check above and the insert.
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let request = Request {
			id,
			target: target.to_string(),
			method: method.to_string(),
			params,
		};

		if self.outbound_tx.send(request).is_err() {
			tracing::error!("Failed to queue request: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		let timeout = self.parameters.response_timeout;
		match tokio::time::timeout(timeout, ResponseFuture { rx, guard }).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!(
				"no response to '{method}' within {timeout:?}"
			))),
		}
	}
}

impl ConnectionLike for Connection {
	fn send_message(
		&self,
		target: &str,
		method: &str,
		params: Value,
	) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + '_>> {
		let target = target.to_string();
		let method = method.to_string();
		Box::pin(async move { Connection::send_message(self, &target, &method, params).await })
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
	}
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound_rx: mpsc::UnboundedReceiver<Request>) {
	while let Some(request) = outbound_rx.recv().await {
		if let Err(e) = write_frame(&mut writer, &request).await {
			tracing::error!(target = "hostbridge.client", error = %e, "transport write error");
			break;
		}
	}
}

async fn read_loop(
	mut reader: OwnedReadHalf,
	callbacks: CallbackMap,
	closed: Arc<AtomicBool>,
	log_level: LogLevel,
) {
	loop {
		let frame = match read_frame(&mut reader).await {
			Ok(Some(frame)) => frame,
			Ok(None) => break,
			Err(e) => {
				tracing::error!(target = "hostbridge.client", error = %e, "transport read error");
				break;
			}
		};

		match serde_json::from_slice::<Message>(&frame) {
			Ok(Message::Response(response)) => {
				if let Err(e) = dispatch_response(&callbacks, response) {
					tracing::warn!(target = "hostbridge.client", error = %e, "dropping response");
				}
			}
			Ok(Message::Unknown(value)) => {
				if log_level.allows(LogLevel::Debug) {
					tracing::debug!(
						target = "hostbridge.client",
						%value,
						"Unknown message type (forward-compatible, ignored)"
					);
				}
			}
			Err(e) => tracing::error!(target = "hostbridge.client", error = %e, "Failed to parse message"),
		}
	}

	closed.store(true, Ordering::SeqCst);
	let pending: Vec<_> = callbacks.lock().drain().collect();
	if !pending.is_empty() {
		tracing::warn!(
			target = "hostbridge.client",
			pending = pending.len(),
			"connection closed with requests outstanding"
		);
	}
	for (_, tx) in pending {
		let _ = tx.send(Err(Error::ChannelClosed));
	}
}

/// Completes the callback parked under `response.id`.
fn dispatch_response(callbacks: &CallbackMap, response: Response) -> Result<()> {
	let callback = callbacks.lock().remove(&response.id).ok_or_else(|| {
		Error::ProtocolError(format!(
			"Cannot find request to respond: id={}",
			response.id
		))
	})?;

	let result = match response.error {
		Some(error) => Err(Error::Remote {
			name: error.name,
			message: error.message,
		}),
		None => Ok(response.result.unwrap_or(Value::Null)),
	};

	let _ = callback.send(result);
	Ok(())
}
