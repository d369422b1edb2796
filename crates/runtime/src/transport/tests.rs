use tokio::io::AsyncWriteExt;

use super::*;

#[test]
fn test_length_prefix_encoding() {
	let length: u32 = 1234;
	let bytes = length.to_le_bytes();

	assert_eq!(bytes[0], (length & 0xFF) as u8);
	assert_eq!(bytes[1], ((length >> 8) & 0xFF) as u8);
	assert_eq!(bytes[2], ((length >> 16) & 0xFF) as u8);
	assert_eq!(bytes[3], ((length >> 24) & 0xFF) as u8);
	assert_eq!(u32::from_le_bytes(bytes), length);
}

#[tokio::test]
async fn test_write_frame_layout() {
	let (mut client, mut server) = tokio::io::duplex(1024);
	let message = serde_json::json!({"id": 1, "method": "ping"});

	write_frame(&mut client, &message).await.unwrap();
	drop(client);

	let mut raw = Vec::new();
	tokio::io::AsyncReadExt::read_to_end(&mut server, &mut raw)
		.await
		.unwrap();

	let json_bytes = serde_json::to_vec(&message).unwrap();
	assert_eq!(&raw[0..4], &(json_bytes.len() as u32).to_le_bytes());
	assert_eq!(&raw[4..], &json_bytes[..]);
}

#[tokio::test]
async fn test_multiple_frames_in_sequence() {
	let (mut client, mut server) = tokio::io::duplex(4096);

	let messages = vec![
		serde_json::json!({"id": 1, "method": "first"}),
		serde_json::json!({"id": 2, "method": "second"}),
		serde_json::json!({"id": 3, "method": "third"}),
	];

	for msg in &messages {
		write_frame(&mut client, msg).await.unwrap();
	}
	drop(client);

	for expected in &messages {
		let body = read_frame(&mut server).await.unwrap().unwrap();
		let received: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(&received, expected);
	}

	assert!(read_frame(&mut server).await.unwrap().is_none());
}

#[tokio::test]
async fn test_truncated_frame_is_an_error() {
	let (mut client, mut server) = tokio::io::duplex(1024);

	client.write_all(&16u32.to_le_bytes()).await.unwrap();
	client.write_all(b"{\"id\":").await.unwrap();
	drop(client);

	let err = read_frame(&mut server).await.unwrap_err();
	assert!(matches!(err, Error::TransportError(_)), "got {err:?}");
}

#[tokio::test]
async fn test_oversized_length_is_rejected() {
	let (mut client, mut server) = tokio::io::duplex(1024);

	client.write_all(&u32::MAX.to_le_bytes()).await.unwrap();

	let err = read_frame(&mut server).await.unwrap_err();
	assert!(matches!(err, Error::TransportError(_)), "got {err:?}");
}
