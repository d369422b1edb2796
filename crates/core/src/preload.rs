//! Namespace preloading.
//!
//! Remote lookups only see packages the host has already loaded, and there
//! is no way to ask for a package that was never referenced. The preloader
//! forces a fixed list in before a session starts serving.

use hostbridge_runtime::{LoadReport, Namespace};
use tracing::{debug, info, warn};

use crate::packages::DEFAULT_HOST_PACKAGES;

/// Loads a fixed, ordered list of packages into a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePreloader {
	packages: Vec<String>,
}

impl Default for NamespacePreloader {
	fn default() -> Self {
		Self::new(DEFAULT_HOST_PACKAGES.iter().copied())
	}
}

impl NamespacePreloader {
	pub fn new<I, S>(packages: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			packages: packages.into_iter().map(Into::into).collect(),
		}
	}

	/// Preloader that loads nothing.
	pub fn empty() -> Self {
		Self {
			packages: Vec::new(),
		}
	}

	/// Appends a package to the list.
	pub fn with_package(mut self, package: impl Into<String>) -> Self {
		self.packages.push(package.into());
		self
	}

	pub fn packages(&self) -> &[String] {
		&self.packages
	}

	/// Loads every package into `namespace`.
	///
	/// A package that fails to load is reported and skipped; the rest are still
	/// loaded. Running it again only loads what is still missing.
	pub fn preload(&self, namespace: &dyn Namespace) -> LoadReport {
		let packages: Vec<&str> = self.packages.iter().map(String::as_str).collect();
		let report = namespace.ensure_loaded(&packages);

		for failure in &report.failed {
			warn!(target = "hostbridge", package = %failure.package, reason = %failure.reason, "package not preloaded");
		}
		if report.is_complete() {
			debug!(
				target = "hostbridge",
				loaded = report.loaded.len(),
				already_loaded = report.already_loaded.len(),
				"namespace preloaded"
			);
		} else {
			info!(
				target = "hostbridge",
				loaded = report.loaded.len(),
				already_loaded = report.already_loaded.len(),
				failed = report.failed.len(),
				"namespace preloaded with failures"
			);
		}

		report
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use hostbridge_runtime::{HostObject, ModuleRegistry};

	use super::*;

	struct Class;

	impl HostObject for Class {
		fn type_name(&self) -> &str {
			"Class"
		}
	}

	fn registry(packages: &[&str]) -> ModuleRegistry {
		let registry = ModuleRegistry::new();
		for &package in packages {
			registry.register_package(package, || {
				Ok(vec![(
					"Class".to_string(),
					Arc::new(Class) as Arc<dyn HostObject>,
				)])
			});
		}
		registry
	}

	#[test]
	fn default_list_is_the_host_package_list() {
		let preloader = NamespacePreloader::default();
		assert_eq!(preloader.packages().len(), DEFAULT_HOST_PACKAGES.len());
		assert_eq!(preloader.packages()[0], DEFAULT_HOST_PACKAGES[0]);
	}

	#[test]
	fn missing_packages_do_not_stop_the_rest() {
		let registry = registry(&["a.one", "a.three"]);
		let preloader = NamespacePreloader::new(["a.one", "a.two", "a.three"]);

		let report = preloader.preload(&registry);

		assert_eq!(report.loaded, vec!["a.one", "a.three"]);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].package, "a.two");
		assert!(registry.lookup("a.three.Class").is_some());
	}

	#[test]
	fn preloading_twice_is_idempotent() {
		let registry = registry(&["a.one"]);
		let preloader = NamespacePreloader::empty().with_package("a.one");

		let first = preloader.preload(&registry);
		let second = preloader.preload(&registry);

		assert_eq!(first.loaded, vec!["a.one"]);
		assert!(second.loaded.is_empty());
		assert_eq!(second.already_loaded, vec!["a.one"]);
		assert_eq!(registry.loaded_packages(), vec!["a.one"]);
	}
}
