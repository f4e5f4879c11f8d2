//! Packet ids, the varuint packet header, and the undecoded [`Packet`] that
//! flows through the proxy.
//!
//! The header packs three fields into one varuint32:
//!
//! ```text
//! bits 0..10   packet id
//! bits 10..12  sender sub-client
//! bits 12..14  target sub-client
//! ```

use crate::error::ProtoError;
use crate::messages::Body;

/// Packet ids for the packets the relay knows by name.
pub mod id {
    pub const LOGIN: u32 = 0x01;
    pub const PLAY_STATUS: u32 = 0x02;
    pub const DISCONNECT: u32 = 0x05;
    pub const RESOURCE_PACKS_INFO: u32 = 0x06;
    pub const RESOURCE_PACK_STACK: u32 = 0x07;
    pub const RESOURCE_PACK_CLIENT_RESPONSE: u32 = 0x08;
    pub const TEXT: u32 = 0x09;
    pub const SET_TIME: u32 = 0x0a;
    pub const START_GAME: u32 = 0x0b;
    pub const ADD_PLAYER: u32 = 0x0c;
    pub const ADD_ACTOR: u32 = 0x0d;
    pub const REMOVE_ACTOR: u32 = 0x0e;
    pub const MOVE_ACTOR_ABSOLUTE: u32 = 0x12;
    pub const MOVE_PLAYER: u32 = 0x13;
    pub const UPDATE_BLOCK: u32 = 0x15;
    pub const LEVEL_EVENT: u32 = 0x19;
    pub const ACTOR_EVENT: u32 = 0x1b;
    pub const UPDATE_ATTRIBUTES: u32 = 0x1d;
    pub const INVENTORY_TRANSACTION: u32 = 0x1e;
    pub const INTERACT: u32 = 0x21;
    pub const SET_ACTOR_DATA: u32 = 0x27;
    pub const SET_ACTOR_MOTION: u32 = 0x28;
    pub const SET_ACTOR_LINK: u32 = 0x29;
    pub const ANIMATE: u32 = 0x2c;
    pub const BLOCK_ACTOR_DATA: u32 = 0x38;
    pub const LEVEL_CHUNK: u32 = 0x3a;
    pub const CHANGE_DIMENSION: u32 = 0x3d;
    pub const GAME_RULES_CHANGED: u32 = 0x48;
    pub const PLAY_SOUND: u32 = 0x56;
    pub const MOVE_ACTOR_DELTA: u32 = 0x6f;
    pub const NETWORK_STACK_LATENCY: u32 = 0x73;
    pub const NETWORK_CHUNK_PUBLISHER_UPDATE: u32 = 0x79;
    pub const LEVEL_SOUND_EVENT: u32 = 0x7b;
    pub const PLAYER_AUTH_INPUT: u32 = 0x90;
    pub const UPDATE_SUB_CHUNK_BLOCKS: u32 = 0xac;
    pub const SUB_CHUNK: u32 = 0xae;
    pub const SUB_CHUNK_REQUEST: u32 = 0xaf;
}

/// Human-readable name of a packet id, for logs.
pub fn packet_name(packet_id: u32) -> &'static str {
    match packet_id {
        id::LOGIN => "Login",
        id::PLAY_STATUS => "PlayStatus",
        id::DISCONNECT => "Disconnect",
        id::RESOURCE_PACKS_INFO => "ResourcePacksInfo",
        id::RESOURCE_PACK_STACK => "ResourcePackStack",
        id::RESOURCE_PACK_CLIENT_RESPONSE => "ResourcePackClientResponse",
        id::TEXT => "Text",
        id::SET_TIME => "SetTime",
        id::START_GAME => "StartGame",
        id::ADD_PLAYER => "AddPlayer",
        id::ADD_ACTOR => "AddActor",
        id::REMOVE_ACTOR => "RemoveActor",
        id::MOVE_ACTOR_ABSOLUTE => "MoveActorAbsolute",
        id::MOVE_PLAYER => "MovePlayer",
        id::UPDATE_BLOCK => "UpdateBlock",
        id::LEVEL_EVENT => "LevelEvent",
        id::ACTOR_EVENT => "ActorEvent",
        id::UPDATE_ATTRIBUTES => "UpdateAttributes",
        id::INVENTORY_TRANSACTION => "InventoryTransaction",
        id::INTERACT => "Interact",
        id::SET_ACTOR_DATA => "SetActorData",
        id::SET_ACTOR_MOTION => "SetActorMotion",
        id::SET_ACTOR_LINK => "SetActorLink",
        id::ANIMATE => "Animate",
        id::BLOCK_ACTOR_DATA => "BlockActorData",
        id::LEVEL_CHUNK => "LevelChunk",
        id::CHANGE_DIMENSION => "ChangeDimension",
        id::GAME_RULES_CHANGED => "GameRulesChanged",
        id::PLAY_SOUND => "PlaySound",
        id::MOVE_ACTOR_DELTA => "MoveActorDelta",
        id::NETWORK_STACK_LATENCY => "NetworkStackLatency",
        id::NETWORK_CHUNK_PUBLISHER_UPDATE => "NetworkChunkPublisherUpdate",
        id::LEVEL_SOUND_EVENT => "LevelSoundEvent",
        id::PLAYER_AUTH_INPUT => "PlayerAuthInput",
        id::UPDATE_SUB_CHUNK_BLOCKS => "UpdateSubChunkBlocks",
        id::SUB_CHUNK => "SubChunk",
        id::SUB_CHUNK_REQUEST => "SubChunkRequest",
        _ => "Unknown",
    }
}

/// Largest id that fits in the header's 10-bit id field.
const MAX_PACKET_ID: u32 = 0x3ff;

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub packet_id: u32,
    pub sender_sub_client: u8,
    pub target_sub_client: u8,
}

impl PacketHeader {
    pub fn new(packet_id: u32) -> Self {
        Self {
            packet_id,
            ..Default::default()
        }
    }

    /// Append the varuint-encoded header to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), ProtoError> {
        if self.packet_id > MAX_PACKET_ID {
            return Err(ProtoError::IdOutOfRange(self.packet_id));
        }
        let mut v = self.packet_id
            | (u32::from(self.sender_sub_client & 0x3) << 10)
            | (u32::from(self.target_sub_client & 0x3) << 12);
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                buf.push(byte);
                return Ok(());
            }
            buf.push(byte | 0x80);
        }
    }

    /// Parse a header from the front of `data`, returning it and the number of
    /// bytes consumed.
    pub fn read(data: &[u8]) -> Result<(Self, usize), ProtoError> {
        let mut v: u32 = 0;
        for (i, &byte) in data.iter().enumerate().take(5) {
            v |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                let header = Self {
                    packet_id: v & MAX_PACKET_ID,
                    sender_sub_client: ((v >> 10) & 0x3) as u8,
                    target_sub_client: ((v >> 12) & 0x3) as u8,
                };
                return Ok((header, i + 1));
            }
        }
        Err(ProtoError::InvalidHeader)
    }
}

/// A packet whose body has not been decoded.
///
/// Handlers that care about a packet decode the body with
/// [`Packet::decode`]; everything else is relayed byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(packet_id: u32, body: Vec<u8>) -> Self {
        Self {
            header: PacketHeader::new(packet_id),
            body,
        }
    }

    /// Encode a typed body into a packet.
    pub fn encode<B: Body>(body: &B) -> Result<Self, ProtoError> {
        let bytes = postcard::to_allocvec(body).map_err(|source| ProtoError::Body {
            name: packet_name(B::ID),
            source,
        })?;
        Ok(Self::new(B::ID, bytes))
    }

    /// Decode the body as `B`, checking the id first.
    pub fn decode<B: Body>(&self) -> Result<B, ProtoError> {
        if self.id() != B::ID {
            return Err(ProtoError::UnexpectedPacket {
                expected: packet_name(B::ID),
                got: self.name(),
            });
        }
        postcard::from_bytes(&self.body).map_err(|source| ProtoError::Body {
            name: packet_name(B::ID),
            source,
        })
    }

    pub fn id(&self) -> u32 {
        self.header.packet_id
    }

    pub fn name(&self) -> &'static str {
        packet_name(self.header.packet_id)
    }

    /// Header followed by body, as it goes into a frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        let mut buf = Vec::with_capacity(self.body.len() + 3);
        self.header.write(&mut buf)?;
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Split a decompressed frame into header and body.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtoError> {
        let (header, used) = PacketHeader::read(data)?;
        Ok(Self {
            header,
            body: data[used..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SetTime;

    #[test]
    fn test_small_id_header_is_one_byte() {
        let mut buf = Vec::new();
        PacketHeader::new(id::START_GAME).write(&mut buf).unwrap();
        assert_eq!(buf, vec![0x0b]);
    }

    #[test]
    fn test_sub_client_bits_are_packed_above_id() {
        let header = PacketHeader {
            packet_id: id::SUB_CHUNK,
            sender_sub_client: 1,
            target_sub_client: 2,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let (back, used) = PacketHeader::read(&buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(back, header);
    }

    #[test]
    fn test_id_above_ten_bits_is_rejected() {
        let mut buf = Vec::new();
        assert!(matches!(
            PacketHeader::new(0x400).write(&mut buf),
            Err(ProtoError::IdOutOfRange(0x400))
        ));
    }

    #[test]
    fn test_unterminated_varuint_is_invalid() {
        assert!(matches!(
            PacketHeader::read(&[0x80, 0x80]),
            Err(ProtoError::InvalidHeader)
        ));
    }

    #[test]
    fn test_decode_checks_packet_id() {
        let pk = Packet::new(id::MOVE_PLAYER, vec![]);
        let err = pk.decode::<SetTime>().unwrap_err();
        assert!(matches!(
            err,
            ProtoError::UnexpectedPacket {
                expected: "SetTime",
                got: "MovePlayer"
            }
        ));
    }

    #[test]
    fn test_typed_body_survives_bytes() {
        let pk = Packet::encode(&SetTime { time: 6000 }).unwrap();
        let back = Packet::from_bytes(&pk.to_bytes().unwrap()).unwrap();
        assert_eq!(back.id(), id::SET_TIME);
        assert_eq!(back.decode::<SetTime>().unwrap().time, 6000);
    }

    #[test]
    fn test_unknown_ids_have_placeholder_name() {
        assert_eq!(packet_name(0x3fe), "Unknown");
    }
}
