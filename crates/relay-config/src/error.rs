//! Configuration error types.

/// Errors from loading, saving, or validating the relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config.ron: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("failed to write config.ron: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is not valid RON for [`crate::Config`].
    #[error("failed to parse config.ron: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// Neither the config file nor the command line names a server.
    #[error("no server address; pass one on the command line or set network.server_address")]
    MissingServer,
}
