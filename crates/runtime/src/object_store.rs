//! Server-side table of objects handed out to clients.
//!
//! Uses [`DashMap`] so every client connection can insert and resolve handles
//! concurrently. Guids take the form `<type>@<n>` with `n` unique per store.
//! Every entry records the client it was issued to, so a disconnecting client
//! takes its handles with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hostbridge_protocol::HandleRef;

use crate::host::HostObject;

/// Identifies the client connection a handle was issued to.
pub type ClientId = u64;

struct Entry {
	owner: ClientId,
	object: Arc<dyn HostObject>,
}

/// Guid-keyed registry of host objects referenced by remote handles.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Entry>,
	next_id: AtomicU64,
}

impl Default for ObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ObjectStore {
	pub fn new() -> Self {
		Self {
			objects: DashMap::new(),
			next_id: AtomicU64::new(1),
		}
	}

	/// Stores `object` for `owner` under a fresh guid and returns its handle.
	pub fn insert(&self, owner: ClientId, object: Arc<dyn HostObject>) -> HandleRef {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let type_name = object.type_name().to_string();
		let guid = format!("{}@{id}", guid_prefix(&type_name));
		self.objects
			.insert(Arc::from(guid.as_str()), Entry { owner, object });
		HandleRef { guid, type_name }
	}

	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn HostObject>> {
		self.objects.get(guid).map(|r| Arc::clone(&r.value().object))
	}

	/// Forgets a handle. Returns false if it was unknown.
	pub fn remove(&self, guid: &str) -> bool {
		self.objects.remove(guid).is_some()
	}

	/// Forgets every handle issued to `owner` and returns how many there were.
	pub fn release_owner(&self, owner: ClientId) -> usize {
		let mut released = 0;
		self.objects.retain(|_, entry| {
			let keep = entry.owner != owner;
			if !keep {
				released += 1;
			}
			keep
		});
		released
	}

	/// Number of live handles issued to `owner`.
	pub fn owned_by(&self, owner: ClientId) -> usize {
		self.objects
			.iter()
			.filter(|entry| entry.value().owner == owner)
			.count()
	}

	/// Forgets every handle.
	pub fn clear(&self) {
		self.objects.clear();
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}
}

fn guid_prefix(type_name: &str) -> String {
	let prefix: String = type_name
		.chars()
		.filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
		.map(|c| c.to_ascii_lowercase())
		.collect();
	if prefix.is_empty() {
		"object".to_string()
	} else {
		prefix
	}
}
