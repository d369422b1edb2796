//! Namespace lookups and package preloading.
//!
//! A remote caller can only reach packages that the host has already
//! materialised: asking for `pkg.unloaded_subpackage` fails even when the
//! package exists, and nothing enumerates packages that were never loaded.
//! [`Namespace::ensure_loaded`] exists so the bridge can force a known list of
//! packages in before any client looks for them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::host::{HostError, HostObject, HostResult, HostValue};

/// A single package that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load package '{package}': {reason}")]
pub struct LoadError {
	pub package: String,
	pub reason: String,
}

impl LoadError {
	pub fn new(package: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			package: package.into(),
			reason: reason.into(),
		}
	}
}

/// Outcome of [`Namespace::ensure_loaded`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
	/// Packages loaded by this call.
	pub loaded: Vec<String>,
	/// Packages that were already present (or repeated in the input).
	pub already_loaded: Vec<String>,
	pub failed: Vec<LoadError>,
}

impl LoadReport {
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty()
	}

	/// Every requested package that is now resolvable.
	pub fn resolved(&self) -> impl Iterator<Item = &str> {
		self.loaded
			.iter()
			.chain(self.already_loaded.iter())
			.map(String::as_str)
	}
}

/// Name resolution for remote `import` requests.
pub trait Namespace: Send + Sync {
	/// Force-loads one package. Loading a package that is already loaded is a no-op.
	fn load(&self, package: &str) -> Result<(), LoadError>;

	fn is_loaded(&self, package: &str) -> bool;

	/// Resolves a dotted module, package, or symbol name.
	fn lookup(&self, name: &str) -> Option<Arc<dyn HostObject>>;

	/// Evaluates a remote `eval` expression with `bindings` in scope.
	///
	/// The default understands attribute paths and zero-argument calls; see
	/// [`crate::eval`].
	fn evaluate(
		&self,
		expression: &str,
		bindings: &HashMap<String, HostValue>,
	) -> HostResult<HostValue> {
		crate::eval::evaluate(self, expression, bindings)
	}

	/// Loads every package in `packages`, in order.
	///
	/// A failure is logged and recorded, and loading continues with the next
	/// package. Packages already loaded are not loaded again.
	fn ensure_loaded(&self, packages: &[&str]) -> LoadReport {
		let mut report = LoadReport::default();
		let mut seen = HashSet::new();

		for &package in packages {
			if !seen.insert(package) || self.is_loaded(package) {
				report.already_loaded.push(package.to_string());
				continue;
			}

			match self.load(package) {
				Ok(()) => {
					debug!(target = "hostbridge.namespace", package, "package loaded");
					report.loaded.push(package.to_string());
				}
				Err(err) => {
					warn!(
						target = "hostbridge.namespace",
						package,
						error = %err.reason,
						"package failed to load; continuing"
					);
					report.failed.push(err);
				}
			}
		}

		report
	}
}

/// Symbols produced by a package loader.
pub type PackageSymbols = Vec<(String, Arc<dyn HostObject>)>;

type PackageLoader = Box<dyn Fn() -> Result<PackageSymbols, String> + Send + Sync>;

/// Process-wide package registry backing a bridge server.
///
/// Hosts register a loader per package and any number of always-visible
/// modules. Packages only become visible to [`lookup`](Namespace::lookup)
/// once loaded; the registry remembers loaded packages for its lifetime.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
	inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
	loaders: RwLock<HashMap<String, PackageLoader>>,
	loaded: RwLock<BTreeMap<String, HashMap<String, Arc<dyn HostObject>>>>,
	modules: RwLock<HashMap<String, Arc<dyn HostObject>>>,
}

impl ModuleRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers how to load `package`. The loader runs at most once.
	pub fn register_package<F>(&self, package: impl Into<String>, loader: F)
	where
		F: Fn() -> Result<PackageSymbols, String> + Send + Sync + 'static,
	{
		self.inner
			.loaders
			.write()
			.insert(package.into(), Box::new(loader));
	}

	/// Registers a module that is visible without loading.
	pub fn register_module(&self, name: impl Into<String>, module: Arc<dyn HostObject>) {
		self.inner.modules.write().insert(name.into(), module);
	}

	pub fn loaded_packages(&self) -> Vec<String> {
		self.inner.loaded.read().keys().cloned().collect()
	}

	fn is_package_prefix(&self, name: &str) -> bool {
		let loaded = self.inner.loaded.read();
		if loaded.contains_key(name) {
			return true;
		}
		let prefix = format!("{name}.");
		loaded
			.range(prefix.clone()..)
			.next()
			.is_some_and(|(key, _)| key.starts_with(&prefix))
	}

	fn symbol(&self, package: &str, name: &str) -> Option<Arc<dyn HostObject>> {
		self.inner
			.loaded
			.read()
			.get(package)
			.and_then(|symbols| symbols.get(name).cloned())
	}

	/// Names directly below `path`: subpackages first, then symbols.
	fn children(&self, path: &str) -> Vec<String> {
		let loaded = self.inner.loaded.read();
		let prefix = format!("{path}.");
		let mut names: Vec<String> = Vec::new();

		for key in loaded.keys().filter(|key| key.starts_with(&prefix)) {
			if let Some(child) = key[prefix.len()..].split('.').next() {
				names.push(child.to_string());
			}
		}
		names.dedup();

		if let Some(symbols) = loaded.get(path) {
			let mut symbol_names: Vec<String> = symbols.keys().cloned().collect();
			symbol_names.sort();
			names.extend(symbol_names);
		}

		names
	}
}

impl Namespace for ModuleRegistry {
	fn load(&self, package: &str) -> Result<(), LoadError> {
		if self.is_loaded(package) {
			return Ok(());
		}

		let symbols = {
			let loaders = self.inner.loaders.read();
			let loader = loaders
				.get(package)
				.ok_or_else(|| LoadError::new(package, "no such package"))?;
			loader().map_err(|reason| LoadError::new(package, reason))?
		};

		self.inner
			.loaded
			.write()
			.entry(package.to_string())
			.or_insert_with(|| symbols.into_iter().collect());
		Ok(())
	}

	fn is_loaded(&self, package: &str) -> bool {
		self.inner.loaded.read().contains_key(package)
	}

	fn lookup(&self, name: &str) -> Option<Arc<dyn HostObject>> {
		if let Some(module) = self.inner.modules.read().get(name) {
			return Some(Arc::clone(module));
		}

		if self.is_package_prefix(name) {
			return Some(Arc::new(PackageNode {
				path: name.to_string(),
				registry: self.clone(),
			}));
		}

		let (package, symbol) = name.rsplit_once('.')?;
		self.symbol(package, symbol)
	}
}

/// A loaded package (or a parent of one) as seen by remote callers.
struct PackageNode {
	path: String,
	registry: ModuleRegistry,
}

impl HostObject for PackageNode {
	fn type_name(&self) -> &str {
		"package"
	}

	fn get_attr(&self, name: &str) -> HostResult<HostValue> {
		if name == "__name__" {
			return Ok(self.path.clone().into());
		}
		self.registry
			.lookup(&format!("{}.{name}", self.path))
			.map(HostValue::Object)
			.ok_or_else(|| HostError::attribute(&self.path, name))
	}

	fn call(&self, method: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
		match method {
			"dir" if args.is_empty() => Ok(HostValue::List(
				self.registry
					.children(&self.path)
					.into_iter()
					.map(HostValue::from)
					.collect(),
			)),
			_ => Err(HostError::method(self.type_name(), method)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Class(&'static str);

	impl HostObject for Class {
		fn type_name(&self) -> &str {
			self.0
		}
	}

	fn class(name: &'static str) -> (String, Arc<dyn HostObject>) {
		(name.to_string(), Arc::new(Class(name)) as Arc<dyn HostObject>)
	}

	fn registry() -> ModuleRegistry {
		let registry = ModuleRegistry::new();
		registry.register_package("com.host.core.units", || Ok(vec![class("IUnit")]));
		registry.register_package("com.host.util.io", || Ok(vec![class("IO")]));
		registry.register_package("com.host.broken", || Err("class init failed".to_string()));
		registry
	}

	#[test]
	fn unloaded_packages_are_invisible() {
		let registry = registry();
		assert!(registry.lookup("com.host.core.units").is_none());
		assert!(registry.lookup("com.host.core.units.IUnit").is_none());

		registry.load("com.host.core.units").unwrap();
		assert!(registry.lookup("com.host.core.units").is_some());
		assert!(registry.lookup("com.host").is_some());
		assert_eq!(
			registry
				.lookup("com.host.core.units.IUnit")
				.unwrap()
				.type_name(),
			"IUnit"
		);
		assert!(registry.lookup("com.host.util").is_none());
	}

	#[test]
	fn ensure_loaded_continues_past_failures() {
		let registry = registry();
		let report = registry.ensure_loaded(&[
			"com.host.core.units",
			"com.host.missing",
			"com.host.broken",
			"com.host.util.io",
		]);

		assert_eq!(report.loaded, vec!["com.host.core.units", "com.host.util.io"]);
		assert_eq!(report.failed.len(), 2);
		assert_eq!(report.failed[0].package, "com.host.missing");
		assert_eq!(report.failed[1].reason, "class init failed");
		assert!(!report.is_complete());
		assert!(registry.lookup("com.host.util.io.IO").is_some());
	}

	#[test]
	fn loaders_run_once() {
		let registry = ModuleRegistry::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		registry.register_package("com.host.events", move || {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(vec![class("IEvent")])
		});

		let first = registry.ensure_loaded(&["com.host.events", "com.host.events"]);
		let second = registry.ensure_loaded(&["com.host.events"]);

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(first.loaded, vec!["com.host.events"]);
		assert_eq!(first.already_loaded, vec!["com.host.events"]);
		assert_eq!(second.already_loaded, vec!["com.host.events"]);
	}

	#[test]
	fn package_nodes_walk_to_symbols() {
		let registry = registry();
		registry.ensure_loaded(&["com.host.core.units", "com.host.util.io"]);

		let root = registry.lookup("com.host").unwrap();
		let core = root.get_attr("core").unwrap();
		let units = core.as_object().unwrap().get_attr("units").unwrap();
		let unit = units.as_object().unwrap().get_attr("IUnit").unwrap();
		assert_eq!(unit.as_object().unwrap().type_name(), "IUnit");

		let err = root.get_attr("nope").err().unwrap();
		assert_eq!(err.name, "AttributeError");

		let listing = root.call("dir", Vec::new()).unwrap();
		let HostValue::List(items) = listing else {
			panic!("expected list");
		};
		let names: Vec<_> = items
			.iter()
			.filter_map(|item| item.as_data()?.as_str().map(str::to_string))
			.collect();
		assert_eq!(names, vec!["core", "util"]);
	}
}
