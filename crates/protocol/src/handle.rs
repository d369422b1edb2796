//! Remote object handles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope key marking a JSON object as a remote handle.
pub const HANDLE_KEY: &str = "__handle__";

/// Reference to an object that lives in the host process.
///
/// The `guid` is only meaningful to the server that issued it; the `type_name`
/// is informational and mirrors the host object's own type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRef {
	pub guid: String,
	#[serde(rename = "type")]
	pub type_name: String,
}

/// Wraps a handle in its `__handle__` envelope.
pub fn encode_handle(handle: &HandleRef) -> Value {
	serde_json::json!({ HANDLE_KEY: handle })
}

/// Extracts a handle from its envelope, if `value` is one.
///
/// Objects that carry the key alongside other fields are plain data, not handles.
pub fn decode_handle(value: &Value) -> Option<HandleRef> {
	let map = value.as_object()?;
	if map.len() != 1 {
		return None;
	}
	serde_json::from_value(map.get(HANDLE_KEY)?.clone()).ok()
}
