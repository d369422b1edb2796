use hostbridge::LogLevel;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter for a `-v` count when no `--log-level` is given.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only (keep worker stdout clean for the orchestrator)
	// 1 (-v) = info for the bridge crates
	// 2+ (-vv) = debug for everything
	match verbosity {
		0 => "warn",
		1 => "warn,hostbridge=info,hostbridge_runtime=info,hostbridge_cli=info",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8, level: Option<LogLevel>) {
	let filter = match level {
		Some(level) => level.as_str(),
		None => default_filter(verbosity),
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
