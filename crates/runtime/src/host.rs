//! Host object model.
//!
//! Objects living in the host process implement [`HostObject`] to become
//! reachable from remote callers. The server hands out handles to them and
//! forwards attribute reads and method calls; everything else about the
//! object stays on the host side.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use downcast_rs::{DowncastSync, impl_downcast};
use hostbridge_protocol::ErrorPayload;
use serde_json::Value;
use thiserror::Error;

/// Result type for host-side operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Failure raised by host code while serving a remote request.
///
/// Crosses the wire as an [`ErrorPayload`] and surfaces on the client as
/// [`Error::Remote`](crate::Error::Remote) with the same name and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct HostError {
	pub name: String,
	pub message: String,
}

impl HostError {
	pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			message: message.into(),
		}
	}

	pub fn attribute(type_name: &str, attr: &str) -> Self {
		Self::new(
			"AttributeError",
			format!("'{type_name}' object has no attribute '{attr}'"),
		)
	}

	pub fn method(type_name: &str, method: &str) -> Self {
		Self::new(
			"AttributeError",
			format!("'{type_name}' object has no method '{method}'"),
		)
	}

	pub fn import(name: &str) -> Self {
		Self::new("ImportError", format!("no module named '{name}'"))
	}

	pub fn type_error(message: impl Into<String>) -> Self {
		Self::new("TypeError", message)
	}

	pub fn timeout(after: Duration) -> Self {
		Self::new(
			"TimeoutError",
			format!("host call did not finish within {after:?}"),
		)
	}
}

impl From<HostError> for ErrorPayload {
	fn from(err: HostError) -> Self {
		ErrorPayload::new(err.name, err.message)
	}
}

/// An object owned by the host that remote callers may reach.
///
/// Both operations default to "no such attribute/method", so simple objects
/// only override what they expose. Implementations must tolerate calls from
/// the blocking thread pool.
pub trait HostObject: DowncastSync {
	/// Type name reported alongside handles, e.g. `"ClientContext"`.
	fn type_name(&self) -> &str;

	fn get_attr(&self, name: &str) -> HostResult<HostValue> {
		Err(HostError::attribute(self.type_name(), name))
	}

	fn call(&self, method: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
		let _ = args;
		Err(HostError::method(self.type_name(), method))
	}
}

impl_downcast!(sync HostObject);

/// Value exchanged with host objects.
#[derive(Clone)]
pub enum HostValue {
	/// Plain JSON data, copied across the bridge.
	Data(Value),
	/// A live object, passed by handle.
	Object(Arc<dyn HostObject>),
	List(Vec<HostValue>),
}

impl HostValue {
	pub fn none() -> Self {
		HostValue::Data(Value::Null)
	}

	pub fn object<T: HostObject>(object: T) -> Self {
		HostValue::Object(Arc::new(object))
	}

	pub fn as_object(&self) -> Option<&Arc<dyn HostObject>> {
		match self {
			HostValue::Object(object) => Some(object),
			_ => None,
		}
	}

	pub fn as_data(&self) -> Option<&Value> {
		match self {
			HostValue::Data(value) => Some(value),
			_ => None,
		}
	}
}

impl fmt::Debug for HostValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HostValue::Data(value) => write!(f, "Data({value})"),
			HostValue::Object(object) => write!(f, "Object(<{}>)", object.type_name()),
			HostValue::List(items) => f.debug_tuple("List").field(items).finish(),
		}
	}
}

impl From<Value> for HostValue {
	fn from(value: Value) -> Self {
		HostValue::Data(value)
	}
}

impl From<&str> for HostValue {
	fn from(value: &str) -> Self {
		HostValue::Data(Value::from(value))
	}
}

impl From<String> for HostValue {
	fn from(value: String) -> Self {
		HostValue::Data(Value::from(value))
	}
}

impl From<i64> for HostValue {
	fn from(value: i64) -> Self {
		HostValue::Data(Value::from(value))
	}
}

impl From<bool> for HostValue {
	fn from(value: bool) -> Self {
		HostValue::Data(Value::from(value))
	}
}

impl From<Arc<dyn HostObject>> for HostValue {
	fn from(object: Arc<dyn HostObject>) -> Self {
		HostValue::Object(object)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Project {
		name: String,
	}

	impl HostObject for Project {
		fn type_name(&self) -> &str {
			"Project"
		}

		fn get_attr(&self, name: &str) -> HostResult<HostValue> {
			match name {
				"name" => Ok(self.name.clone().into()),
				_ => Err(HostError::attribute(self.type_name(), name)),
			}
		}
	}

	#[test]
	fn default_call_reports_missing_method() {
		let project = Project {
			name: "app.apk".into(),
		};
		let err = project.call("close", Vec::new()).unwrap_err();
		assert_eq!(err.name, "AttributeError");
		assert!(err.message.contains("'Project'"));
	}

	#[test]
	fn host_objects_downcast_back() {
		let object: Arc<dyn HostObject> = Arc::new(Project {
			name: "app.apk".into(),
		});
		let project = object.downcast_arc::<Project>().ok().unwrap();
		assert_eq!(project.name, "app.apk");
	}

	#[test]
	fn host_error_maps_to_payload() {
		let payload: ErrorPayload = HostError::import("com.example").into();
		assert_eq!(payload.name, "ImportError");
		assert_eq!(payload.message, "no module named 'com.example'");
	}
}
