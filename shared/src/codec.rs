//! Framing and serialization for both transport channels.
//!
//! Reliable frames are a 4-byte big-endian payload length followed by the
//! payload itself; datagrams carry exactly one payload with no prefix.
//! Payloads are the bincode encoding of a [`Message`], which starts with the
//! variant tag, so a frame is self-describing once the length is stripped.

use crate::messages::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted on the reliable channel (1 MiB).
pub const MAX_FRAME_PAYLOAD: usize = 1 << 20;

/// Conservative datagram send cap, below typical path MTUs.
pub const MAX_DATAGRAM_SEND: usize = 1200;

/// Theoretical IPv4 datagram payload limit accepted on receive.
pub const MAX_DATAGRAM_RECV: usize = 65_507;

/// Why a message could not cross the wire.
///
/// Decoders never abort the endpoint; callers log the error, drop the
/// offending bytes, and keep going. On the reliable channel an unrecoverable
/// framing error may close the connection.
#[derive(Debug, Error)]
pub enum WireError {
    /// The length prefix or the byte stream around it is broken.
    #[error("malformed frame: {0}")]
    Framing(String),

    /// A payload exceeds the limit for its channel.
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },

    /// The payload names a variant outside the known message set.
    #[error("unknown message variant tag {0}")]
    UnknownVariant(u32),

    /// The payload claims a known variant but its fields do not decode.
    #[error("undecodable payload: {0}")]
    Decode(String),

    /// The underlying socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serializes a message into a reliable-channel payload.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    let payload = bincode::serialize(message).map_err(|e| WireError::Decode(e.to_string()))?;
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::Oversized {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    Ok(payload)
}

/// Deserializes a reliable-channel payload.
pub fn decode(payload: &[u8]) -> Result<Message, WireError> {
    if payload.len() < 4 {
        return Err(WireError::Framing(format!(
            "payload of {} bytes is too short for a variant tag",
            payload.len()
        )));
    }
    // bincode writes the enum tag as a little-endian u32 up front.
    let tag = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if tag >= Message::VARIANT_COUNT {
        return Err(WireError::UnknownVariant(tag));
    }
    bincode::deserialize(payload).map_err(|e| WireError::Decode(e.to_string()))
}

/// Serializes a message into a datagram payload, enforcing the send cap.
pub fn encode_datagram(message: &Message) -> Result<Vec<u8>, WireError> {
    let payload = bincode::serialize(message).map_err(|e| WireError::Decode(e.to_string()))?;
    if payload.len() > MAX_DATAGRAM_SEND {
        return Err(WireError::Oversized {
            len: payload.len(),
            max: MAX_DATAGRAM_SEND,
        });
    }
    Ok(payload)
}

/// Deserializes a received datagram payload.
pub fn decode_datagram(payload: &[u8]) -> Result<Message, WireError> {
    if payload.is_empty() {
        return Err(WireError::Framing("empty datagram".to_string()));
    }
    if payload.len() > MAX_DATAGRAM_RECV {
        return Err(WireError::Oversized {
            len: payload.len(),
            max: MAX_DATAGRAM_RECV,
        });
    }
    decode(payload)
}

/// Reads one length-prefixed frame from the reliable channel.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly before the next
/// frame started. A length outside `1..=MAX_FRAME_PAYLOAD` or a truncated
/// payload is a framing error; callers should treat it as unrecoverable and
/// close the connection.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(WireError::Framing("zero-length frame".to_string()));
    }
    if len > MAX_FRAME_PAYLOAD {
        return Err(WireError::Oversized {
            len,
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| WireError::Framing(format!("truncated payload: {e}")))?;

    decode(&payload).map(Some)
}

/// Writes one length-prefixed frame to the reliable channel.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode(message)?;
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Action, Point};

    fn reject_with_payload_len(total: usize) -> Message {
        // ConnectReject encodes as tag (4) + string length (8) + bytes.
        Message::ConnectReject {
            reason: "x".repeat(total - 12),
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let message = Message::Input {
            client_id: 3,
            action: Action::Move,
            point: Point::new(1.0, 0.0),
        };
        let payload = encode(&message).unwrap();
        assert_eq!(decode(&payload).unwrap(), message);
    }

    #[test]
    fn test_decode_unknown_variant() {
        let mut payload = encode(&Message::GameOver).unwrap();
        payload[0] = 0xfe;
        payload[1] = 0xff;
        match decode(&payload) {
            Err(WireError::UnknownVariant(tag)) => assert_eq!(tag, 0xfffe),
            other => panic!("expected unknown variant, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_truncated_payload() {
        let payload = encode(&Message::ConnectRequest {
            player_name: "Alice".to_string(),
        })
        .unwrap();
        assert!(matches!(
            decode(&payload[..payload.len() - 2]),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(decode(&[0u8; 2]), Err(WireError::Framing(_))));
    }

    #[test]
    fn test_datagram_send_cap() {
        // Exactly at the cap goes through; one byte more is refused.
        let fits = reject_with_payload_len(MAX_DATAGRAM_SEND);
        assert_eq!(encode_datagram(&fits).unwrap().len(), MAX_DATAGRAM_SEND);

        let too_big = reject_with_payload_len(MAX_DATAGRAM_SEND + 1);
        assert!(matches!(
            encode_datagram(&too_big),
            Err(WireError::Oversized { len, max })
                if len == MAX_DATAGRAM_SEND + 1 && max == MAX_DATAGRAM_SEND
        ));
    }

    #[test]
    fn test_datagram_recv_rejects_empty() {
        assert!(matches!(decode_datagram(&[]), Err(WireError::Framing(_))));
    }

    #[tokio::test]
    async fn test_frame_wire_layout() {
        let message = Message::ConnectAck { client_id: 9 };
        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &message).await.unwrap();

        let payload = encode(&message).unwrap();
        assert_eq!(&wire[..4], &(payload.len() as u32).to_be_bytes()[..]);
        assert_eq!(&wire[4..], payload.as_slice());
    }

    #[tokio::test]
    async fn test_frame_roundtrip_and_clean_eof() {
        let first = Message::LevelChange {
            level_name: "maze".to_string(),
            spawn_point: Some(Point::new(1.0, 1.0)),
        };
        let second = Message::GameOver;

        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &first).await.unwrap();
        write_frame(&mut wire, &second).await.unwrap();

        let mut reader = wire.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(first));
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(second));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_frame_payload_limits() {
        // The largest legal frame is accepted end to end.
        let at_limit = reject_with_payload_len(MAX_FRAME_PAYLOAD);
        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &at_limit).await.unwrap();
        let mut reader = wire.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(at_limit));

        // One byte over is refused on the send side...
        let over_limit = reject_with_payload_len(MAX_FRAME_PAYLOAD + 1);
        let mut sink: Vec<u8> = Vec::new();
        assert!(matches!(
            write_frame(&mut sink, &over_limit).await,
            Err(WireError::Oversized { .. })
        ));

        // ...and an oversized length prefix is refused on the read side.
        let mut forged = Vec::new();
        forged.extend_from_slice(&((MAX_FRAME_PAYLOAD as u32) + 1).to_be_bytes());
        forged.extend_from_slice(&[0u8; 16]);
        let mut reader = forged.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(WireError::Oversized { .. })
        ));
    }

    #[tokio::test]
    async fn test_frame_truncated_payload_is_framing_error() {
        let message = Message::ConnectRequest {
            player_name: "Alice".to_string(),
        };
        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &message).await.unwrap();
        wire.truncate(wire.len() - 3);

        let mut reader = wire.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(WireError::Framing(_))
        ));
    }
}
