//! Wire types for the hostbridge RPC protocol.
//!
//! Every frame on a bridge connection carries one JSON document. Clients send
//! [`Request`]s addressed to a remote object (or the root), the server answers
//! each with a [`Response`] carrying either a result or an [`ErrorPayload`].
//! Remote objects travel as [`HandleRef`]s wrapped in a `__handle__` envelope.

pub mod handle;
pub mod message;

pub use handle::{HANDLE_KEY, HandleRef, decode_handle, encode_handle};
pub use message::{ErrorPayload, Message, Request, Response, ROOT_TARGET, method};

/// Upper bound on a single frame body, in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
