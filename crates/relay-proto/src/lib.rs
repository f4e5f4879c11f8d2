//! Bedrock wire-protocol plumbing: packet headers and ids, typed packet
//! bodies, framing, compression, and the listen/dial connection primitives the
//! proxy is built on.

pub mod compression;
pub mod conn;
pub mod dialer;
pub mod error;
pub mod framing;
pub mod listener;
pub mod messages;
pub mod nbt;
pub mod packet;
pub mod types;

pub use compression::{CompressionConfig, CompressionError, compress_payload, decompress_payload};
pub use conn::{Conn, PacketFunc};
pub use dialer::{Dialer, PendingConn};
pub use error::ProtoError;
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use listener::{ListenConfig, Listener};
pub use messages::{
    AddActor, BlockEntityEntry, Body, Disconnect, GameRulesChanged, LevelChunk, Login, MovePlayer,
    PackEntry, PlayStatus, PlayStatusKind, ResourcePackStack, ResourcePacksInfo, SetActorLink,
    SetTime, StartGame,
};
pub use nbt::{Compound, Tag};
pub use packet::{Packet, PacketHeader, id, packet_name};
pub use types::{
    Chain, ClientData, EntityLink, EntityLinkKind, GameData, GameRule, GameRuleValue,
};
