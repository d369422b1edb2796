//! hostbridge runtime - the RPC transport the bridge layer drives
//!
//! - **Transport**: length-prefixed JSON frames over TCP
//! - **Server**: accept loop, per-connection dispatch, handle table
//! - **Connection**: client-side request/response correlation with timeouts
//! - **Eval**: attribute-path expressions evaluated in the host
//! - **Host model**: [`HostObject`] values exposed to remote callers and the
//!   [`Namespace`] they are looked up in
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐         frames          ┌──────────────┐
//! │  Connection  │ ──────────────────────▶ │ BridgeServer │
//! │  (client)    │ ◀────────────────────── │              │
//! └──────┬───────┘                         └──────┬───────┘
//!        │ ConnectionLike                         │ Namespace
//! ┌──────▼───────┐                         ┌──────▼───────┐
//! │ RemoteObject │                         │  HostObject  │
//! └──────────────┘                         └──────────────┘
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod eval;
pub mod host;
pub mod namespace;
pub mod object_store;
pub mod server;
pub mod transport;

pub use channel::{
	Channel, RemoteObject, RemoteValue, ping, remote_eval, remote_import, remote_shutdown,
};
pub use config::{
	ConnectionParameters, DEFAULT_HOST, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_SERVER_PORT, LogLevel,
};
pub use connection::{Connection, ConnectionLike};
pub use error::{Error, Result};
pub use host::{HostError, HostObject, HostResult, HostValue};
pub use namespace::{LoadError, LoadReport, ModuleRegistry, Namespace};
pub use object_store::ObjectStore;
pub use server::{BridgeServer, ShutdownHandle};
