//! Peer wire protocol
//!
//! Peers exchange [`PeerMessage`]s framed with an 8-byte header: body
//! length and CRC32 checksum, both little-endian, followed by a
//! bincode-encoded body. A frame whose checksum does not match is
//! rejected before deserialization.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::replication::op::WriteOperation;

/// Upper bound on a frame body; anything larger is treated as corrupt
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Messages exchanged between replication peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerMessage {
    // ========== Write propagation ==========
    /// A write operation pushed to a peer
    Operation(WriteOperation),

    /// Acknowledgement that an operation was applied
    OperationAck { id: Uuid },

    // ========== Liveness ==========
    /// Liveness probe
    Ping,

    /// Liveness response
    Pong,
}

impl PeerMessage {
    /// Serialize a message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            PeerMessage::Operation(_) => "Operation",
            PeerMessage::OperationAck { .. } => "OperationAck",
            PeerMessage::Ping => "Ping",
            PeerMessage::Pong => "Pong",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Body length in bytes
    pub length: u32,
    /// Body CRC32 checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Size of the serialized header in bytes
    pub const SIZE: usize = 8;

    /// Build a header for a serialized body
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            checksum: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

/// Read one framed message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<PeerMessage> {
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    if header.length > MAX_FRAME_BYTES {
        return Err(Error::Network(format!(
            "Frame too large: {} bytes",
            header.length
        )));
    }

    let mut body = vec![0u8; header.length as usize];
    reader.read_exact(&mut body).await?;

    if crc32fast::hash(&body) != header.checksum {
        return Err(Error::Network("Message checksum mismatch".to_string()));
    }

    PeerMessage::deserialize(&body)
}

/// Write one framed message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &PeerMessage,
) -> Result<()> {
    let body = message.serialize()?;
    let header = FrameHeader::new(&body);

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let op = WriteOperation::put("user:1", "alice", "node-1");
        let id = op.id;
        let message = PeerMessage::Operation(op);

        let bytes = message.serialize().unwrap();
        let decoded = PeerMessage::deserialize(&bytes).unwrap();

        match decoded {
            PeerMessage::Operation(op) => {
                assert_eq!(op.id, id);
                assert_eq!(op.key, "user:1");
                assert_eq!(op.value, Some("alice".to_string()));
            }
            other => panic!("unexpected message: {}", other.type_name()),
        }
    }

    #[test]
    fn test_frame_header() {
        let data = b"hello replication";
        let header = FrameHeader::new(data);
        assert_eq!(header.length, data.len() as u32);

        let bytes = header.to_bytes();
        let decoded = FrameHeader::from_bytes(&bytes);
        assert_eq!(decoded.length, header.length);
        assert_eq!(decoded.checksum, header.checksum);
    }

    #[tokio::test]
    async fn test_framed_round_trip() {
        let mut buf: Vec<u8> = Vec::new();
        let op = WriteOperation::put("k", "v", "node-1");
        let id = op.id;
        write_message(&mut buf, &PeerMessage::Operation(op))
            .await
            .unwrap();
        write_message(&mut buf, &PeerMessage::OperationAck { id })
            .await
            .unwrap();

        let mut reader = buf.as_slice();
        match read_message(&mut reader).await.unwrap() {
            PeerMessage::Operation(op) => assert_eq!(op.id, id),
            other => panic!("unexpected message: {}", other.type_name()),
        }
        match read_message(&mut reader).await.unwrap() {
            PeerMessage::OperationAck { id: acked } => assert_eq!(acked, id),
            other => panic!("unexpected message: {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_corrupt_body_rejected() {
        let mut buf: Vec<u8> = Vec::new();
        write_message(&mut buf, &PeerMessage::Ping).await.unwrap();

        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let mut reader = buf.as_slice();
        let result = read_message(&mut reader).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_rejected() {
        let mut buf: Vec<u8> = Vec::new();
        write_message(&mut buf, &PeerMessage::Ping).await.unwrap();
        buf.truncate(buf.len() - 1);

        let mut reader = buf.as_slice();
        let result = read_message(&mut reader).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
