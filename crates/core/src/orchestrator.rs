//! Ephemeral sessions around an external worker process.
//!
//! [`Orchestrator::run_worker_across_bridge`] opens a session on a fresh
//! loopback port, runs a worker that connects back to it, waits for the worker
//! to exit and closes the session again. The worker is started as
//!
//! ```text
//! <runner> <script> --connect_to_host=<host> --connect_to_port=<port> <extra args...>
//! ```
//!
//! and its stdout and stderr are captured together, in arrival order.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use hostbridge_runtime::{ConnectionParameters, HostObject, Namespace};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::context::ContextRegistry;
use crate::error::{Error, Result};
use crate::preload::NamespacePreloader;
use crate::session::Session;

/// Interpreter used when a [`WorkerRequest`] does not name one.
#[cfg(windows)]
pub const DEFAULT_RUNNER: &str = "python";
/// Interpreter used when a [`WorkerRequest`] does not name one.
#[cfg(not(windows))]
pub const DEFAULT_RUNNER: &str = "python3";

/// What to run on the far side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
	script: PathBuf,
	runner: PathBuf,
	extra_args: Vec<String>,
	current_dir: Option<PathBuf>,
}

impl WorkerRequest {
	pub fn new(script: impl Into<PathBuf>) -> Self {
		Self {
			script: script.into(),
			runner: PathBuf::from(DEFAULT_RUNNER),
			extra_args: Vec::new(),
			current_dir: None,
		}
	}

	/// Executable that runs the script. Resolved through `PATH` like a shell would.
	pub fn runner(mut self, runner: impl Into<PathBuf>) -> Self {
		self.runner = runner.into();
		self
	}

	/// Appends an argument passed after the connection flags, verbatim.
	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.extra_args.push(arg.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extra_args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.current_dir = Some(dir.into());
		self
	}

	pub fn script(&self) -> &Path {
		&self.script
	}

	pub fn runner_path(&self) -> &Path {
		&self.runner
	}

	pub fn extra_args(&self) -> &[String] {
		&self.extra_args
	}

	/// Arguments handed to the runner for a session at `host:port`.
	pub fn command_args(&self, host: &str, port: u16) -> Vec<OsString> {
		let mut args = Vec::with_capacity(self.extra_args.len() + 3);
		args.push(self.script.clone().into_os_string());
		args.push(format!("--connect_to_host={host}").into());
		args.push(format!("--connect_to_port={port}").into());
		args.extend(self.extra_args.iter().map(OsString::from));
		args
	}
}

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
	/// The process exited with a status code.
	Exited { code: i32 },
	/// The process was killed by a signal.
	Terminated { signal: Option<i32> },
	/// The process could not be started.
	SpawnFailed { message: String },
	/// The process started but waiting on it failed.
	WaitFailed { message: String },
}

impl WorkerStatus {
	fn from_exit(status: ExitStatus) -> Self {
		match status.code() {
			Some(code) => WorkerStatus::Exited { code },
			None => WorkerStatus::Terminated {
				signal: exit_signal(status),
			},
		}
	}
}

impl fmt::Display for WorkerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WorkerStatus::Exited { code } => write!(f, "exited with code {code}"),
			WorkerStatus::Terminated { signal: Some(signal) } => {
				write!(f, "terminated by signal {signal}")
			}
			WorkerStatus::Terminated { signal: None } => write!(f, "terminated"),
			WorkerStatus::SpawnFailed { message } => write!(f, "failed to start: {message}"),
			WorkerStatus::WaitFailed { message } => write!(f, "failed to wait: {message}"),
		}
	}
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
	use std::os::unix::process::ExitStatusExt;
	status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
	None
}

/// Outcome of one orchestrated worker run.
///
/// A failing worker is reported here, not as an `Err`.
#[derive(Debug)]
pub struct WorkerInvocation {
	pub executable: PathBuf,
	pub script: PathBuf,
	pub extra_args: Vec<String>,
	pub status: WorkerStatus,
	/// Combined stdout and stderr.
	pub output: Vec<u8>,
	/// Set when closing the session failed after the worker finished.
	pub teardown_error: Option<Error>,
}

impl WorkerInvocation {
	/// Exit code, if the process ran and exited normally.
	pub fn exit_code(&self) -> Option<i32> {
		match self.status {
			WorkerStatus::Exited { code } => Some(code),
			_ => None,
		}
	}

	pub fn success(&self) -> bool {
		self.exit_code() == Some(0)
	}

	pub fn output_lossy(&self) -> String {
		String::from_utf8_lossy(&self.output).into_owned()
	}
}

/// Runs workers against short-lived sessions bound to a host context.
pub struct Orchestrator {
	namespace: Arc<dyn Namespace>,
	registry: Arc<ContextRegistry>,
	preloader: NamespacePreloader,
	parameters: ConnectionParameters,
}

impl Orchestrator {
	/// Orchestrator over `namespace` using the process-wide context registry,
	/// the default package list, and an ephemeral loopback port.
	pub fn new(namespace: Arc<dyn Namespace>) -> Self {
		Self {
			namespace,
			registry: ContextRegistry::global(),
			preloader: NamespacePreloader::default(),
			parameters: ConnectionParameters::ephemeral(),
		}
	}

	pub fn with_registry(mut self, registry: Arc<ContextRegistry>) -> Self {
		self.registry = registry;
		self
	}

	pub fn with_preloader(mut self, preloader: NamespacePreloader) -> Self {
		self.preloader = preloader;
		self
	}

	/// Parameters sessions are bound with. Port `0` picks a fresh port per run.
	pub fn with_session_parameters(mut self, parameters: ConnectionParameters) -> Self {
		self.parameters = parameters;
		self
	}

	pub fn registry(&self) -> &Arc<ContextRegistry> {
		&self.registry
	}

	/// Runs `request` against a fresh session exposing `context`.
	///
	/// Returns `Err` only when no session could be set up: another orchestration
	/// holds the context slot, or binding failed. Every other outcome, including
	/// a worker that could not be spawned, comes back as a [`WorkerInvocation`].
	/// The session is closed before this returns, and if the future is dropped
	/// early the session and the worker are stopped as well.
	pub async fn run_worker_across_bridge(
		&self,
		request: &WorkerRequest,
		context: &Arc<dyn HostObject>,
	) -> Result<WorkerInvocation> {
		let _lease = self.registry.begin_orchestration(context)?;
		self.preloader.preload(self.namespace.as_ref());

		let mut session =
			Session::open(&self.parameters, Arc::clone(&self.namespace), &self.registry).await?;
		let (host, port) = session.address();
		let (host, port) = (host.to_string(), port);

		info!(
			target = "hostbridge.orchestrator",
			script = %request.script.display(),
			runner = %request.runner.display(),
			%host,
			port,
			"running worker"
		);
		let (status, output) = launch_worker(request, &host, port).await;

		let teardown_error = session.shutdown().await.err();
		if let Some(err) = &teardown_error {
			warn!(target = "hostbridge.orchestrator", error = %err, "session teardown failed");
		}

		if matches!(status, WorkerStatus::Exited { code: 0 }) {
			info!(target = "hostbridge.orchestrator", script = %request.script.display(), "worker completed");
		} else {
			warn!(
				target = "hostbridge.orchestrator",
				script = %request.script.display(),
				%status,
				output = %String::from_utf8_lossy(&output),
				"worker failed"
			);
		}

		Ok(WorkerInvocation {
			executable: request.runner.clone(),
			script: request.script.clone(),
			extra_args: request.extra_args.clone(),
			status,
			output,
			teardown_error,
		})
	}
}

async fn launch_worker(request: &WorkerRequest, host: &str, port: u16) -> (WorkerStatus, Vec<u8>) {
	let mut command = Command::new(&request.runner);
	command
		.args(request.command_args(host, port))
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	if let Some(dir) = &request.current_dir {
		command.current_dir(dir);
	}

	let mut child = match command.spawn() {
		Ok(child) => child,
		Err(err) => {
			warn!(
				target = "hostbridge.orchestrator",
				runner = %request.runner.display(),
				error = %err,
				"failed to spawn worker"
			);
			return (
				WorkerStatus::SpawnFailed {
					message: format!("{}: {err}", request.runner.display()),
				},
				Vec::new(),
			);
		}
	};
	debug!(target = "hostbridge.orchestrator", pid = child.id(), "worker spawned");

	let sink = Mutex::new(Vec::new());
	let stdout = child.stdout.take();
	let stderr = child.stderr.take();
	let (_, _, waited) = tokio::join!(pump(stdout, &sink), pump(stderr, &sink), child.wait());

	let status = match waited {
		Ok(status) => WorkerStatus::from_exit(status),
		Err(err) => WorkerStatus::WaitFailed {
			message: err.to_string(),
		},
	};
	(status, sink.into_inner())
}

/// Copies a child pipe into the shared output buffer until EOF.
async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, sink: &Mutex<Vec<u8>>) {
	let Some(mut reader) = reader else {
		return;
	};
	let mut buf = [0u8; 8192];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => return,
			Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
			Err(err) => {
				debug!(target = "hostbridge.orchestrator", error = %err, "worker pipe read failed");
				return;
			}
		}
	}
}
