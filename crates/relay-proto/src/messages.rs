//! Typed packet bodies.
//!
//! Only packets the relay itself negotiates or the world capture consumes are
//! typed here. Bodies are postcard-encoded; see [`crate::Packet::encode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::nbt::Compound;
use crate::packet::id;
use crate::types::{Chain, ClientData, EntityLink, GameData, GameRule};

/// A packet body with a fixed packet id.
pub trait Body: Serialize + DeserializeOwned {
    const ID: u32;
}

macro_rules! body {
    ($ty:ty, $id:expr) => {
        impl Body for $ty {
            const ID: u32 = $id;
        }
    };
}

// ---------------------------------------------------------------------------
// Login and handshake
// ---------------------------------------------------------------------------

/// First packet from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub client_data: ClientData,
    pub chain: Chain,
}

/// Login progress reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatusKind {
    LoginSuccess,
    LoginFailedClient,
    LoginFailedServer,
    PlayerSpawn,
    ServerFull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayStatus {
    pub status: PlayStatusKind,
}

/// Kick or clean close, with a reason shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disconnect {
    pub message: String,
}

/// One resource or behaviour pack offered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackEntry {
    pub uuid: String,
    pub version: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePacksInfo {
    pub texture_pack_required: bool,
    pub behaviour_packs: Vec<PackEntry>,
    pub texture_packs: Vec<PackEntry>,
}

/// Final pack ordering; sent once all packs are downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePackStack {
    pub behaviour_packs: Vec<PackEntry>,
    pub texture_packs: Vec<PackEntry>,
    pub base_game_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGame {
    pub game_data: GameData,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Block entity attached to a block inside a [`LevelChunk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntityEntry {
    pub position: [i32; 3],
    pub data: Compound,
}

/// A full chunk column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelChunk {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub dimension: i32,
    /// Sub-chunks bottom to top; each is a list of storage layers of block
    /// runtime ids.
    pub sub_chunks: Vec<Vec<Vec<u32>>>,
    pub block_entities: Vec<BlockEntityEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddActor {
    pub entity_unique_id: i64,
    pub entity_runtime_id: u64,
    /// Namespaced type, e.g. `minecraft:zombie`.
    pub entity_type: String,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Pitch, yaw, head yaw.
    pub rotation: [f32; 3],
    pub metadata: Compound,
    pub links: Vec<EntityLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetActorLink {
    pub link: EntityLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTime {
    pub time: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePlayer {
    pub entity_runtime_id: u64,
    pub position: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
    pub head_yaw: f32,
    pub on_ground: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRulesChanged {
    pub game_rules: Vec<GameRule>,
}

body!(Login, id::LOGIN);
body!(PlayStatus, id::PLAY_STATUS);
body!(Disconnect, id::DISCONNECT);
body!(ResourcePacksInfo, id::RESOURCE_PACKS_INFO);
body!(ResourcePackStack, id::RESOURCE_PACK_STACK);
body!(StartGame, id::START_GAME);
body!(LevelChunk, id::LEVEL_CHUNK);
body!(AddActor, id::ADD_ACTOR);
body!(SetActorLink, id::SET_ACTOR_LINK);
body!(SetTime, id::SET_TIME);
body!(MovePlayer, id::MOVE_PLAYER);
body!(GameRulesChanged, id::GAME_RULES_CHANGED);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;
    use crate::nbt::Tag;
    use crate::types::{EntityLinkKind, GameRuleValue};

    #[test]
    fn test_level_chunk_keeps_block_entities() {
        let mut chest = Compound::new();
        chest.insert("id".into(), Tag::from("Chest"));
        let chunk = LevelChunk {
            chunk_x: -3,
            chunk_z: 7,
            dimension: 0,
            sub_chunks: vec![vec![vec![0; 16]], vec![vec![1, 2, 3]]],
            block_entities: vec![BlockEntityEntry {
                position: [-40, 64, 120],
                data: chest.clone(),
            }],
        };

        let pk = Packet::encode(&chunk).unwrap();
        assert_eq!(pk.name(), "LevelChunk");
        let back: LevelChunk = pk.decode().unwrap();
        assert_eq!(back.block_entities[0].data, chest);
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_add_actor_links_decode() {
        let actor = AddActor {
            entity_unique_id: -12,
            entity_runtime_id: 40,
            entity_type: "minecraft:horse".into(),
            position: [1.5, 70.0, -2.5],
            velocity: [0.0; 3],
            rotation: [0.0, 90.0, 90.0],
            metadata: Compound::new(),
            links: vec![EntityLink::new(-12, -1, EntityLinkKind::Rider)],
        };
        let back: AddActor = Packet::encode(&actor).unwrap().decode().unwrap();
        assert_eq!(back.links[0].kind, EntityLinkKind::Rider);
    }

    #[test]
    fn test_game_rules_changed_keeps_value_types() {
        let body = GameRulesChanged {
            game_rules: vec![
                GameRule::new("pvp", GameRuleValue::Bool(true)),
                GameRule::new("randomtickspeed", GameRuleValue::Int(3)),
            ],
        };
        let back: GameRulesChanged = Packet::encode(&body).unwrap().decode().unwrap();
        assert_eq!(back.game_rules[1].value, GameRuleValue::Int(3));
    }
}
