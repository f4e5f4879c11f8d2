//! Proxy error types.

use std::net::SocketAddr;

use relay_proto::ProtoError;

/// Errors that end a proxy session.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The session's cancellation fired; carries the cancel cause.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// The client-facing listener could not bind.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Dialing the server failed.
    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: ProtoError,
    },
    /// A protocol error on an established leg.
    #[error(transparent)]
    Proto(#[from] ProtoError),
    /// A packet handler rejected a packet.
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// Credentials could not be created.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    /// No client was ever accepted.
    #[error("no client connected to {0}")]
    NoClient(SocketAddr),
}

/// Error returned by a packet handler; aborts the session.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler could not decode a packet it cares about.
    #[error("{handler}: {source}")]
    Decode {
        handler: String,
        #[source]
        source: ProtoError,
    },
    #[error("{handler}: {message}")]
    Failed { handler: String, message: String },
}

impl HandlerError {
    pub fn decode(handler: impl Into<String>, source: ProtoError) -> Self {
        Self::Decode {
            handler: handler.into(),
            source,
        }
    }

    pub fn failed(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Error from a [`crate::ChainSource`].
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The token source could not produce a token.
    #[error("token unavailable: {0}")]
    Token(String),
    /// The chain could not be signed or fetched.
    #[error("chain creation failed: {0}")]
    Chain(String),
}
