//! Protocol-level error type shared by connections, listeners, and dialers.

use crate::compression::CompressionError;
use crate::framing::FrameError;

/// Errors produced while reading, writing, or negotiating packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The framing layer failed.
    #[error("framing: {0}")]
    Frame(#[from] FrameError),

    /// A payload could not be decompressed.
    #[error("compression: {0}")]
    Compression(#[from] CompressionError),

    /// The varuint packet header was malformed.
    #[error("malformed packet header")]
    InvalidHeader,

    /// The packet id does not fit in the 10-bit header field.
    #[error("packet id {0:#x} out of range")]
    IdOutOfRange(u32),

    /// A typed body failed to encode or decode.
    #[error("packet body {name}: {source}")]
    Body {
        /// Name of the packet being processed.
        name: &'static str,
        /// Underlying postcard error.
        #[source]
        source: postcard::Error,
    },

    /// A packet of one type was expected but another arrived.
    #[error("expected {expected}, got {got}")]
    UnexpectedPacket {
        /// The packet name that was expected.
        expected: &'static str,
        /// The packet name that arrived.
        got: &'static str,
    },

    /// The server refused the login.
    #[error("login rejected: {0:?}")]
    LoginRejected(crate::messages::PlayStatusKind),

    /// The peer sent a disconnect packet.
    #[error("disconnected by peer: {0}")]
    Disconnected(String),

    /// The listener was closed while accepting.
    #[error("listener closed")]
    ListenerClosed,

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// A socket-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtoError {
    /// Whether this error is an orderly close rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Frame(FrameError::ConnectionClosed) | Self::ListenerClosed
        )
    }
}
