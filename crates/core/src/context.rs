//! The process-wide host context slot.
//!
//! Remote callers reach "the" host context without it being passed through
//! the transport, so it has to live somewhere shared. [`ContextRegistry`] is
//! that place. It has a single-writer contract: one orchestration at a time
//! holds an [`OrchestrationLease`], and a second one is rejected instead of
//! silently replacing the context of the first.
//!
//! Sessions never capture a context of their own: the context module they
//! serve reads the registry on every lookup, so republishing rebinds what
//! every running session hands out.
//!
//! A published context is owned by the registry, since the long-running server
//! outlives the script call that published it. An orchestrated context is only
//! referenced weakly; the orchestrating caller owns it for the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use hostbridge_runtime::{
	HostError, HostObject, HostResult, HostValue, LoadError, Namespace,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::packages::{CONTEXT_ATTRIBUTE, CONTEXT_MODULE, CONTEXT_UNAVAILABLE};

static GLOBAL: OnceLock<Arc<ContextRegistry>> = OnceLock::new();

/// Holder of the current host context.
#[derive(Default)]
pub struct ContextRegistry {
	current: RwLock<Option<Slot>>,
	orchestrating: AtomicBool,
}

enum Slot {
	Owned(Arc<dyn HostObject>),
	Borrowed(Weak<dyn HostObject>),
}

impl ContextRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// The registry shared by the whole process.
	pub fn global() -> Arc<Self> {
		Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
	}

	/// Records `context` as current and keeps it alive until replaced.
	///
	/// Used by the long-running server mode. The previous context, if the
	/// registry owned it, is released. Fails while an orchestration holds the
	/// slot.
	pub fn publish(&self, context: &Arc<dyn HostObject>) -> Result<()> {
		if self.is_orchestrating() {
			return Err(Error::OrchestrationInProgress);
		}
		self.store(Slot::Owned(Arc::clone(context)), context);
		Ok(())
	}

	/// Claims the slot for one orchestration and records `context` in it.
	///
	/// The claim is released when the returned lease is dropped; the context
	/// stays recorded until replaced or until the caller drops it.
	pub fn begin_orchestration(
		self: &Arc<Self>,
		context: &Arc<dyn HostObject>,
	) -> Result<OrchestrationLease> {
		if self
			.orchestrating
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return Err(Error::OrchestrationInProgress);
		}
		self.store(Slot::Borrowed(Arc::downgrade(context)), context);
		Ok(OrchestrationLease {
			registry: Arc::clone(self),
		})
	}

	pub fn is_orchestrating(&self) -> bool {
		self.orchestrating.load(Ordering::Acquire)
	}

	/// The current context, if one was recorded and is still alive.
	pub fn current(&self) -> Option<Arc<dyn HostObject>> {
		match self.current.read().as_ref()? {
			Slot::Owned(context) => Some(Arc::clone(context)),
			Slot::Borrowed(context) => context.upgrade(),
		}
	}

	pub fn clear(&self) {
		*self.current.write() = None;
	}

	fn store(&self, slot: Slot, context: &Arc<dyn HostObject>) {
		debug!(target = "hostbridge", context_type = context.type_name(), "host context recorded");
		// Dropped outside the lock; a context's teardown may call back in.
		let previous = self.current.write().replace(slot);
		drop(previous);
	}
}

/// Exclusive claim on a [`ContextRegistry`] for one orchestration.
#[must_use = "the claim is released as soon as the lease is dropped"]
pub struct OrchestrationLease {
	registry: Arc<ContextRegistry>,
}

impl Drop for OrchestrationLease {
	fn drop(&mut self) {
		self.registry.orchestrating.store(false, Ordering::Release);
	}
}

/// The module remote callers import to find the context.
struct ContextModule {
	registry: Arc<ContextRegistry>,
}

impl HostObject for ContextModule {
	fn type_name(&self) -> &str {
		"module"
	}

	fn get_attr(&self, name: &str) -> HostResult<HostValue> {
		match name {
			CONTEXT_ATTRIBUTE => self
				.registry
				.current()
				.map(HostValue::Object)
				.ok_or_else(|| {
					HostError::new(CONTEXT_UNAVAILABLE, "no live host context is recorded")
				}),
			"__name__" => Ok(CONTEXT_MODULE.into()),
			_ => Err(HostError::attribute(CONTEXT_MODULE, name)),
		}
	}
}

/// Host namespace plus a context module backed by `registry`.
pub struct SessionNamespace {
	inner: Arc<dyn Namespace>,
	module: Arc<dyn HostObject>,
}

impl SessionNamespace {
	pub fn new(inner: Arc<dyn Namespace>, registry: Arc<ContextRegistry>) -> Self {
		Self {
			inner,
			module: Arc::new(ContextModule { registry }),
		}
	}
}

impl Namespace for SessionNamespace {
	fn load(&self, package: &str) -> std::result::Result<(), LoadError> {
		self.inner.load(package)
	}

	fn is_loaded(&self, package: &str) -> bool {
		self.inner.is_loaded(package)
	}

	fn lookup(&self, name: &str) -> Option<Arc<dyn HostObject>> {
		if name == CONTEXT_MODULE {
			return Some(Arc::clone(&self.module));
		}
		self.inner.lookup(name)
	}
}
