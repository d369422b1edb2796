//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON. Both the server and the client connection read and write frames
//! through these helpers, over any async byte stream.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use hostbridge_protocol::MAX_FRAME_LEN;

use crate::error::{Error, Result};

/// Serializes `message` and writes it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
	W: AsyncWrite + Unpin,
	T: Serialize,
{
	let body = serde_json::to_vec(message)?;
	if body.len() > MAX_FRAME_LEN {
		return Err(Error::TransportError(format!(
			"frame of {} bytes exceeds limit of {MAX_FRAME_LEN}",
			body.len()
		)));
	}

	let length = body.len() as u32;
	writer.write_all(&length.to_le_bytes()).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one frame body.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary; an
/// end of stream in the middle of a frame is a transport error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
	R: AsyncRead + Unpin,
{
	let mut len_buf = [0u8; 4];
	match reader.read_exact(&mut len_buf).await {
		Ok(_) => {}
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(e) => return Err(e.into()),
	}

	let length = u32::from_le_bytes(len_buf) as usize;
	if length > MAX_FRAME_LEN {
		return Err(Error::TransportError(format!(
			"incoming frame of {length} bytes exceeds limit of {MAX_FRAME_LEN}"
		)));
	}

	let mut body = vec![0u8; length];
	reader.read_exact(&mut body).await.map_err(|e| {
		if e.kind() == std::io::ErrorKind::UnexpectedEof {
			Error::TransportError(format!("stream ended inside a {length}-byte frame"))
		} else {
			e.into()
		}
	})?;

	Ok(Some(body))
}

#[cfg(test)]
mod tests;
