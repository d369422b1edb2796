//! hostbridge: drive objects inside a host application from external processes
//!
//! The host exposes one context object; workers running outside the host
//! reach it, and everything hanging off it, over a bridge connection. This
//! crate is the orchestration layer on top of that bridge:
//!
//! - [`NamespacePreloader`] forces the host API packages in so remote lookups
//!   can find them
//! - [`Session`] is a bridge server bound to one host context
//! - [`Orchestrator`] runs a worker process against a short-lived session and
//!   always closes the session afterwards
//! - [`ClientFacade`] is what the worker holds: the context, plus cached host
//!   and runtime API roots
//! - [`BridgeServerScript`] is the long-running alternative, started from the
//!   host's script entry point
//!
//! # Running a worker
//!
//! ```ignore
//! use hostbridge::{Orchestrator, WorkerRequest};
//!
//! let orchestrator = Orchestrator::new(namespace);
//! let invocation = orchestrator
//!     .run_worker_across_bridge(&WorkerRequest::new("analyze.py").arg("--deep"), &context)
//!     .await?;
//! if !invocation.success() {
//!     eprintln!("{}: {}", invocation.status, invocation.output_lossy());
//! }
//! ```
//!
//! # Inside the worker
//!
//! ```ignore
//! use hostbridge::{ClientFacade, ConnectionParameters};
//!
//! let facade = ClientFacade::connect(&ConnectionParameters::new(host, port)).await?;
//! let context = facade.get_context().await?;
//! let units = facade.get_host_api().await?.get_attr("core").await?;
//! ```

pub mod context;
pub mod entry;
pub mod error;
pub mod facade;
pub mod orchestrator;
pub mod packages;
pub mod preload;
pub mod session;

pub use context::{ContextRegistry, OrchestrationLease, SessionNamespace};
pub use entry::{BackgroundServer, BridgeServerScript, HostScript};
pub use error::{Error, Result};
pub use facade::ClientFacade;
pub use orchestrator::{
	DEFAULT_RUNNER, Orchestrator, WorkerInvocation, WorkerRequest, WorkerStatus,
};
pub use packages::{
	CONTEXT_ATTRIBUTE, CONTEXT_MODULE, DEFAULT_HOST_PACKAGES, HOST_API_ROOT, RUNTIME_API_ROOT,
};
pub use preload::NamespacePreloader;
pub use session::{Session, SessionState};

pub use hostbridge_runtime as runtime;
pub use hostbridge_runtime::{
	ConnectionParameters, HostError, HostObject, HostResult, HostValue, LoadReport, LogLevel,
	ModuleRegistry, Namespace, RemoteObject, RemoteValue,
};
