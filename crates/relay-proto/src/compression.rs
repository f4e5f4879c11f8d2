//! Per-frame LZ4 compression.
//!
//! Every frame payload starts with a flag byte. Chunk and sub-chunk batches
//! are large and compress well; movement and latency packets are tiny and go
//! out raw.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// Flag byte: the rest of the frame is raw.
pub const FLAG_RAW: u8 = 0x00;

/// Flag byte: the rest of the frame is LZ4 with a prepended size.
pub const FLAG_LZ4: u8 = 0x01;

/// When to compress outgoing frames.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Packets smaller than this many bytes are sent raw. Default: 512.
    pub threshold: usize,
    /// Master switch. Default: true.
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: 512,
            enabled: true,
        }
    }
}

/// Errors raised while unwrapping a received frame.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// Zero-length frame; there is no flag byte.
    #[error("frame has no compression flag")]
    EmptyPayload,
    /// LZ4 rejected the data.
    #[error("LZ4 decompression failed: {0}")]
    DecompressFailed(String),
    /// Unrecognised flag byte.
    #[error("unknown compression flag 0x{0:02X}")]
    UnknownFlag(u8),
}

/// Prefix `packet` with a flag byte, compressing it if it is large enough.
pub fn compress_payload(packet: &[u8], config: &CompressionConfig) -> Vec<u8> {
    if config.enabled && packet.len() >= config.threshold {
        let body = compress_prepend_size(packet);
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(FLAG_LZ4);
        out.extend_from_slice(&body);
        out
    } else {
        let mut out = Vec::with_capacity(packet.len() + 1);
        out.push(FLAG_RAW);
        out.extend_from_slice(packet);
        out
    }
}

/// Strip the flag byte from a received frame, decompressing if flagged.
pub fn decompress_payload(frame: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let (&flag, rest) = frame.split_first().ok_or(CompressionError::EmptyPayload)?;
    match flag {
        FLAG_RAW => Ok(rest.to_vec()),
        FLAG_LZ4 => decompress_size_prepended(rest)
            .map_err(|e| CompressionError::DecompressFailed(e.to_string())),
        other => Err(CompressionError::UnknownFlag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_packets_go_out_raw() {
        let framed = compress_payload(b"\x13move", &CompressionConfig::default());
        assert_eq!(framed[0], FLAG_RAW);
        assert_eq!(&framed[1..], b"\x13move");
    }

    #[test]
    fn test_chunk_sized_packets_are_compressed_and_shrink() {
        let mut chunk = vec![0u8; 4096];
        chunk.extend(std::iter::repeat_n(3u8, 4096));
        let framed = compress_payload(&chunk, &CompressionConfig::default());

        assert_eq!(framed[0], FLAG_LZ4);
        assert!(framed.len() < chunk.len() / 4);
        assert_eq!(decompress_payload(&framed).unwrap(), chunk);
    }

    #[test]
    fn test_disabled_config_never_compresses() {
        let config = CompressionConfig {
            threshold: 1,
            enabled: false,
        };
        let framed = compress_payload(&[1u8; 2000], &config);
        assert_eq!(framed[0], FLAG_RAW);
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        assert!(matches!(
            decompress_payload(&[]),
            Err(CompressionError::EmptyPayload)
        ));
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        assert!(matches!(
            decompress_payload(&[0x7F, 0, 0]),
            Err(CompressionError::UnknownFlag(0x7F))
        ));
    }

    #[test]
    fn test_corrupt_lz4_is_an_error() {
        assert!(matches!(
            decompress_payload(&[FLAG_LZ4, 0x10, 0x00, 0x00, 0x00, 0xFF]),
            Err(CompressionError::DecompressFailed(_))
        ));
    }
}
