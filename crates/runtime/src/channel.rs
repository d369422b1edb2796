//! Channel - typed request proxy for remote objects.
//!
//! A [`Channel`] addresses one remote target over a shared connection.
//! [`RemoteObject`] wraps a channel with the handle the server issued, and
//! [`RemoteValue`] is what attribute reads and calls come back as.
//!
//! The server keeps every object it hands out alive until told otherwise.
//! Dropping the last clone of a [`RemoteObject`] sends that `release` in the
//! background; disconnecting releases whatever the client still held.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hostbridge_protocol::{HandleRef, ROOT_TARGET, decode_handle, encode_handle, method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::trace;

use crate::connection::ConnectionLike;
use crate::error::{Error, Result};

/// Channel provides RPC communication for one remote target.
#[derive(Clone)]
pub struct Channel {
	target: Arc<str>,
	connection: Arc<dyn ConnectionLike>,
}

impl Channel {
	/// Creates a new Channel for the given object guid.
	pub fn new(target: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
		Self { target, connection }
	}

	/// Channel for requests that are not addressed to an object.
	pub fn root(connection: Arc<dyn ConnectionLike>) -> Self {
		Self::new(Arc::from(ROOT_TARGET), connection)
	}

	/// Sends a method call to the server and awaits the response.
	pub async fn send<P: Serialize, R: DeserializeOwned>(
		&self,
		method: &str,
		params: P,
	) -> Result<R> {
		let params_value = serde_json::to_value(params)?;
		let response = self
			.connection
			.send_message(&self.target, method, params_value)
			.await?;
		serde_json::from_value(response).map_err(Into::into)
	}

	/// Sends a method call with no parameters.
	pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
		self.send(method, Value::Null).await
	}

	/// Sends a method call that returns no result (void).
	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		let _: Value = self.send(method, params).await?;
		Ok(())
	}

	pub fn target(&self) -> &str {
		&self.target
	}

	pub fn connection(&self) -> &Arc<dyn ConnectionLike> {
		&self.connection
	}
}

/// Proxy for an object that lives in the host process.
///
/// Clones share one server-side handle.
#[derive(Clone)]
pub struct RemoteObject {
	handle: HandleRef,
	lease: Arc<HandleLease>,
}

/// Releases the server-side handle once the last proxy is gone.
struct HandleLease {
	channel: Channel,
	released: AtomicBool,
}

impl Drop for HandleLease {
	fn drop(&mut self) {
		if self.released.load(Ordering::Acquire) {
			return;
		}
		// Without a runtime the connection is gone too, and its handles with it.
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let channel = self.channel.clone();
		runtime.spawn(async move {
			if let Err(err) = channel.send_no_result(method::RELEASE, Value::Null).await {
				trace!(target = "hostbridge.client", guid = channel.target(), error = %err, "release failed");
			}
		});
	}
}

impl RemoteObject {
	pub fn new(handle: HandleRef, connection: Arc<dyn ConnectionLike>) -> Self {
		let channel = Channel::new(Arc::from(handle.guid.as_str()), connection);
		Self {
			handle,
			lease: Arc::new(HandleLease {
				channel,
				released: AtomicBool::new(false),
			}),
		}
	}

	pub fn guid(&self) -> &str {
		&self.handle.guid
	}

	pub fn type_name(&self) -> &str {
		&self.handle.type_name
	}

	pub fn handle(&self) -> &HandleRef {
		&self.handle
	}

	/// Reads an attribute of the remote object.
	pub async fn get_attr(&self, name: &str) -> Result<RemoteValue> {
		let channel = &self.lease.channel;
		let raw: Value = channel.send(method::GET_ATTR, json!({ "name": name })).await?;
		Ok(RemoteValue::decode(raw, channel.connection()))
	}

	/// Invokes a method on the remote object.
	///
	/// Arguments are plain JSON; pass other remote objects with [`as_arg`](Self::as_arg).
	pub async fn call(&self, method_name: &str, args: Vec<Value>) -> Result<RemoteValue> {
		let channel = &self.lease.channel;
		let raw: Value = channel
			.send(method::CALL, json!({ "method": method_name, "args": args }))
			.await?;
		Ok(RemoteValue::decode(raw, channel.connection()))
	}

	/// Lets the server drop its reference now instead of on drop.
	///
	/// Other clones of this proxy must not be used afterwards.
	pub async fn release(self) -> Result<()> {
		self.lease.released.store(true, Ordering::Release);
		self.lease
			.channel
			.send_no_result(method::RELEASE, Value::Null)
			.await
	}

	/// Encodes this object for use as a call argument.
	pub fn as_arg(&self) -> Value {
		encode_handle(&self.handle)
	}
}

impl fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.handle.guid)
			.field("type", &self.handle.type_name)
			.finish()
	}
}

/// Result of a remote attribute read or call.
#[derive(Debug, Clone)]
pub enum RemoteValue {
	Data(Value),
	Object(RemoteObject),
	List(Vec<RemoteValue>),
}

impl RemoteValue {
	/// Turns wire JSON into proxies bound to `connection`.
	pub fn decode(value: Value, connection: &Arc<dyn ConnectionLike>) -> Self {
		if let Some(handle) = decode_handle(&value) {
			return RemoteValue::Object(RemoteObject::new(handle, Arc::clone(connection)));
		}
		match value {
			Value::Array(items) => RemoteValue::List(
				items
					.into_iter()
					.map(|item| RemoteValue::decode(item, connection))
					.collect(),
			),
			other => RemoteValue::Data(other),
		}
	}

	pub fn as_object(&self) -> Option<&RemoteObject> {
		match self {
			RemoteValue::Object(object) => Some(object),
			_ => None,
		}
	}

	pub fn as_data(&self) -> Option<&Value> {
		match self {
			RemoteValue::Data(value) => Some(value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		self.as_data().and_then(Value::as_str)
	}

	/// Unwraps an object, failing with [`Error::UnexpectedValue`] otherwise.
	pub fn into_object(self) -> Result<RemoteObject> {
		match self {
			RemoteValue::Object(object) => Ok(object),
			RemoteValue::Data(value) => Err(Error::UnexpectedValue(format!(
				"expected a remote object, got {value}"
			))),
			RemoteValue::List(items) => Err(Error::UnexpectedValue(format!(
				"expected a remote object, got a list of {}",
				items.len()
			))),
		}
	}
}

/// Resolves a module or package by dotted name on the server.
pub async fn remote_import(
	connection: &Arc<dyn ConnectionLike>,
	name: &str,
) -> Result<RemoteObject> {
	let raw: Value = Channel::root(Arc::clone(connection))
		.send(method::IMPORT, json!({ "name": name }))
		.await?;
	RemoteValue::decode(raw, connection).into_object()
}

/// Evaluates `expression` in the host.
///
/// `bindings` name values the expression can refer to; pass remote objects
/// with [`RemoteObject::as_arg`].
pub async fn remote_eval(
	connection: &Arc<dyn ConnectionLike>,
	expression: &str,
	bindings: &[(&str, Value)],
) -> Result<RemoteValue> {
	let bindings: Map<String, Value> = bindings
		.iter()
		.map(|(name, value)| (name.to_string(), value.clone()))
		.collect();
	let raw: Value = Channel::root(Arc::clone(connection))
		.send(
			method::EVAL,
			json!({ "expression": expression, "bindings": bindings }),
		)
		.await?;
	Ok(RemoteValue::decode(raw, connection))
}

/// Asks the server to stop serving.
pub async fn remote_shutdown(connection: &Arc<dyn ConnectionLike>) -> Result<()> {
	Channel::root(Arc::clone(connection))
		.send_no_result(method::SHUTDOWN, Value::Null)
		.await
}

/// Round-trips a `ping`.
pub async fn ping(connection: &Arc<dyn ConnectionLike>) -> Result<()> {
	let reply: String = Channel::root(Arc::clone(connection))
		.send_no_params(method::PING)
		.await?;
	if reply == "pong" {
		Ok(())
	} else {
		Err(Error::ProtocolError(format!("unexpected ping reply '{reply}'")))
	}
}
