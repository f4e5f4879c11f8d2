//! Length-prefixed framing for the relay transport.
//!
//! Each batch on the wire is one frame:
//!
//! ```text
//! +-------------------+-------------------------------------+
//! | length (4 bytes)  | flag (1 byte) | packet (length - 1) |
//! | u32 little-endian |  compression  |  header + body      |
//! +-------------------+-------------------------------------+
//! ```
//!
//! The length covers everything after the prefix. Framing knows nothing about
//! the flag byte; [`crate::compression`] owns it.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Limits applied by the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame accepted or produced, in bytes. Default: 4 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 4 * 1024 * 1024,
        }
    }
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is larger than [`FrameConfig::max_payload_size`].
    #[error("frame of {size} bytes exceeds limit {max}")]
    PayloadTooLarge {
        /// Declared or actual frame size.
        size: u32,
        /// Configured limit.
        max: u32,
    },

    /// The peer hung up mid-frame or between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_eof)?;

    let len = u32::from_le_bytes(len_buf);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(map_eof)?;
    }
    Ok(payload)
}

/// Write `payload` as one frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_frames_arrive_in_order_and_unmerged() {
        let (mut a, mut b) = duplex(8192);
        let config = FrameConfig::default();

        for msg in [&b"level chunk"[..], b"", b"move player"] {
            write_frame(&mut a, msg, &config).await.unwrap();
        }

        assert_eq!(read_frame(&mut b, &config).await.unwrap(), b"level chunk");
        assert!(read_frame(&mut b, &config).await.unwrap().is_empty());
        assert_eq!(read_frame(&mut b, &config).await.unwrap(), b"move player");
    }

    #[tokio::test]
    async fn test_small_pipe_forces_partial_reads() {
        let (mut a, mut b) = duplex(5);
        let config = FrameConfig::default();
        let payload = vec![9u8; 300];

        let writer_cfg = config.clone();
        let expected = payload.clone();
        let task = tokio::spawn(async move {
            write_frame(&mut a, &payload, &writer_cfg).await.unwrap();
        });

        let got = read_frame(&mut b, &config).await.unwrap();
        task.await.unwrap();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let (mut a, mut b) = duplex(64);
        let config = FrameConfig {
            max_payload_size: 8,
        };
        a.write_all(&100u32.to_le_bytes()).await.unwrap();

        let result = read_frame(&mut b, &config).await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 100, max: 8 })
        ));
    }

    #[tokio::test]
    async fn test_write_over_limit_is_rejected() {
        let (mut a, _b) = duplex(64);
        let config = FrameConfig {
            max_payload_size: 8,
        };
        let result = write_frame(&mut a, &[0u8; 9], &config).await;
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_hangup_before_prefix_reports_closed() {
        let (a, mut b) = duplex(64);
        drop(a);
        let result = read_frame(&mut b, &FrameConfig::default()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_hangup_mid_payload_reports_closed() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let result = read_frame(&mut b, &FrameConfig::default()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }
}
