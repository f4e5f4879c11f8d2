//! The intercepting proxy: session coordination, the packet pipeline,
//! lifecycle events, and the debug packet logger.

pub mod credentials;
pub mod error;
pub mod events;
pub mod packet_logger;
pub mod pipeline;
pub mod session;
pub mod signal;

pub use credentials::{CHAIN_ATTEMPTS, ChainSource, StaticChain, create_chain_with_retry};
pub use error::{CredentialError, HandlerError, ProxyError};
pub use events::{ChannelObserver, Event, EventSink, LogObserver, Observer};
pub use packet_logger::{
    EncryptedWriter, MUTED_PACKETS, PacketLoggerConfig, decrypt_dump, dump_packet, is_muted,
    packet_logger,
};
pub use pipeline::{Direction, PacketHandler, Pipeline};
pub use session::{ProxyConfig, ProxyContext};
pub use signal::{Cancellation, Signal};
