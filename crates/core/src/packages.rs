//! Well-known names on the host side of the bridge.

/// Module remote callers import to reach the host context.
pub const CONTEXT_MODULE: &str = "hostbridge_server";

/// Attribute of [`CONTEXT_MODULE`] holding the context object.
pub const CONTEXT_ATTRIBUTE: &str = "context";

/// Error name reported when no context is reachable.
pub const CONTEXT_UNAVAILABLE: &str = "ContextUnavailable";

/// Root package of the host API.
pub const HOST_API_ROOT: &str = "com.pnfsoftware.jeb";

/// Root package of the managed runtime the host runs on.
pub const RUNTIME_API_ROOT: &str = "java";

/// Leaf packages of the host API that must be loaded before clients look them up.
///
/// Parents are materialised along with their leaves, so only leaves are
/// listed. Deprecated packages are left out. Anything missing here can still
/// be reached with [`ClientFacade::remote_import`](crate::ClientFacade::remote_import)
/// once the host has loaded it.
pub const DEFAULT_HOST_PACKAGES: &[&str] = &[
	"com.pnfsoftware.jeb.client.api",
	"com.pnfsoftware.jeb.client.events",
	"com.pnfsoftware.jeb.client.floating",
	"com.pnfsoftware.jeb.client.jebio",
	"com.pnfsoftware.jeb.client.script",
	"com.pnfsoftware.jeb.client.telemetry",
	"com.pnfsoftware.jeb.core.actions",
	"com.pnfsoftware.jeb.core.dao.impl",
	"com.pnfsoftware.jeb.core.events",
	"com.pnfsoftware.jeb.core.exceptions",
	"com.pnfsoftware.jeb.core.input",
	"com.pnfsoftware.jeb.core.output.code.coordinates",
	"com.pnfsoftware.jeb.core.output.table.impl",
	"com.pnfsoftware.jeb.core.output.text.impl",
	"com.pnfsoftware.jeb.core.output.tree.impl",
	"com.pnfsoftware.jeb.core.properties.impl",
	"com.pnfsoftware.jeb.core.units.code.android.controlflow",
	"com.pnfsoftware.jeb.core.units.code.android.dex",
	"com.pnfsoftware.jeb.core.units.code.android.render",
	"com.pnfsoftware.jeb.core.units.code.asm.analyzer",
	"com.pnfsoftware.jeb.core.units.code.asm.cfg",
	"com.pnfsoftware.jeb.core.units.code.asm.decompiler.ast.emulator",
	"com.pnfsoftware.jeb.core.units.code.asm.decompiler.exceptions",
	"com.pnfsoftware.jeb.core.units.code.asm.decompiler.ir.opt.comp",
	"com.pnfsoftware.jeb.core.units.code.asm.decompiler.opt",
	"com.pnfsoftware.jeb.core.units.code.asm.items",
	"com.pnfsoftware.jeb.core.units.code.asm.mangling",
	"com.pnfsoftware.jeb.core.units.code.asm.memory",
	"com.pnfsoftware.jeb.core.units.code.asm.processor.arch",
	"com.pnfsoftware.jeb.core.units.code.asm.processor.memory",
	"com.pnfsoftware.jeb.core.units.code.asm.render",
	"com.pnfsoftware.jeb.core.units.code.asm.sig",
	"com.pnfsoftware.jeb.core.units.code.asm.simulator",
	"com.pnfsoftware.jeb.core.units.code.asm.type",
	"com.pnfsoftware.jeb.core.units.code.debug.impl",
	"com.pnfsoftware.jeb.core.units.code.java",
	"com.pnfsoftware.jeb.core.units.code.wincommon",
	"com.pnfsoftware.jeb.core.units.impl",
	"com.pnfsoftware.jeb.core.util",
	"com.pnfsoftware.jeb.util.base",
	"com.pnfsoftware.jeb.util.collect",
	"com.pnfsoftware.jeb.util.concurrent",
	"com.pnfsoftware.jeb.util.encoding.java",
	"com.pnfsoftware.jeb.util.encoding.jflex",
	"com.pnfsoftware.jeb.util.encoding.json.parser",
	"com.pnfsoftware.jeb.util.encoding.zip.fsr",
	"com.pnfsoftware.jeb.util.events",
	"com.pnfsoftware.jeb.util.format",
	"com.pnfsoftware.jeb.util.interpreter",
	"com.pnfsoftware.jeb.util.io",
	"com.pnfsoftware.jeb.util.logging",
	"com.pnfsoftware.jeb.util.math",
	"com.pnfsoftware.jeb.util.net",
	"com.pnfsoftware.jeb.util.primitives",
	"com.pnfsoftware.jeb.util.reflect",
	"com.pnfsoftware.jeb.util.serialization.objects",
];

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn host_packages_are_unique_leaves_under_the_api_root() {
		let unique: HashSet<_> = DEFAULT_HOST_PACKAGES.iter().collect();
		assert_eq!(unique.len(), DEFAULT_HOST_PACKAGES.len());

		for package in DEFAULT_HOST_PACKAGES {
			assert!(package.starts_with(HOST_API_ROOT), "{package}");
			let prefix = format!("{package}.");
			assert!(
				!DEFAULT_HOST_PACKAGES.iter().any(|other| other.starts_with(&prefix)),
				"{package} is a parent of another listed package"
			);
		}
	}
}
