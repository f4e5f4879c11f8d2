//! Shared protocol data: login identity, start-game data, game rules, and
//! entity links.

use serde::{Deserialize, Serialize};

/// Identity data a client presents during login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientData {
    /// In-game name.
    pub display_name: String,
    /// Client version string, e.g. `1.20.40`.
    pub game_version: String,
    /// Device platform id.
    pub device_os: i32,
    /// Per-install device identifier.
    pub device_id: String,
    /// Locale such as `en_US`.
    pub language_code: String,
    /// Skin identifier.
    pub skin_id: String,
    /// Address the client typed in to reach us.
    pub server_address: String,
}

/// Signed identity proof presented when dialing a server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Public key bound to the chain.
    pub key: Vec<u8>,
    /// Encoded, signed chain.
    pub data: String,
}

/// Dynamically typed value of a game rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GameRuleValue {
    Bool(bool),
    Int(u32),
    Float(f32),
}

/// A named game rule as announced by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRule {
    pub name: String,
    pub value: GameRuleValue,
}

impl GameRule {
    pub fn new(name: impl Into<String>, value: GameRuleValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// World and player data the server sends in its start-game packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    pub world_name: String,
    pub world_seed: i64,
    /// Dimension id the player spawns in.
    pub dimension: i32,
    /// Current world time in ticks.
    pub time: i64,
    pub entity_unique_id: i64,
    pub entity_runtime_id: u64,
    pub player_position: [f32; 3],
    pub world_spawn: [i32; 3],
    pub game_rules: Vec<GameRule>,
    pub base_game_version: String,
}

impl GameData {
    /// Look up a rule by exact name.
    pub fn rule(&self, name: &str) -> Option<&GameRuleValue> {
        self.game_rules
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.value)
    }
}

/// Kind of an entity link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityLinkKind {
    /// Break the link.
    Remove,
    /// The rider controls the ridden entity.
    Rider,
    /// The rider is carried along.
    Passenger,
    /// Any kind this build does not understand.
    Other(u8),
}

impl EntityLinkKind {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Remove,
            1 => Self::Rider,
            2 => Self::Passenger,
            other => Self::Other(other),
        }
    }
}

/// A mount/rider relation between two entities, by unique id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityLink {
    pub ridden_unique_id: i64,
    pub rider_unique_id: i64,
    pub kind: EntityLinkKind,
    pub immediate: bool,
    pub rider_initiated: bool,
}

impl EntityLink {
    pub fn new(ridden_unique_id: i64, rider_unique_id: i64, kind: EntityLinkKind) -> Self {
        Self {
            ridden_unique_id,
            rider_unique_id,
            kind,
            immediate: false,
            rider_initiated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_lookup_is_exact() {
        let data = GameData {
            game_rules: vec![
                GameRule::new("dodaylightcycle", GameRuleValue::Bool(false)),
                GameRule::new("spawnradius", GameRuleValue::Int(5)),
            ],
            ..Default::default()
        };
        assert_eq!(data.rule("spawnradius"), Some(&GameRuleValue::Int(5)));
        assert_eq!(data.rule("doDaylightCycle"), None);
    }

    #[test]
    fn test_link_kind_from_wire_byte() {
        assert_eq!(EntityLinkKind::from_u8(0), EntityLinkKind::Remove);
        assert_eq!(EntityLinkKind::from_u8(1), EntityLinkKind::Rider);
        assert_eq!(EntityLinkKind::from_u8(2), EntityLinkKind::Passenger);
        assert_eq!(EntityLinkKind::from_u8(9), EntityLinkKind::Other(9));
    }
}
