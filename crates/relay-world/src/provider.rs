//! The durable storage capability the store writes through.
//!
//! A [`WorldProvider`] owns one opened world on some backing medium. The
//! store never assumes a format; [`crate::DiskProvider`] and
//! [`crate::MemoryProvider`] are the two bundled implementations.

use std::collections::BTreeMap;
use std::path::Path;

use relay_proto::Compound;
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::entity::PersistedEntity;
use crate::pos::{BlockPos, ChunkPos, Dimension};

/// Errors raised by a storage provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// I/O error on the backing medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The provider has been closed.
    #[error("provider is closed")]
    Closed,
    /// Injected or backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Record compression used by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    #[default]
    Lz4,
}

/// Top-level world settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    pub name: String,
    pub spawn: BlockPos,
    /// World time in ticks.
    pub time: i64,
    pub current_tick: i64,
    /// Whether time advances when the world is loaded.
    pub time_cycle: bool,
}

/// Extended level metadata: generator, experiments, and one field per
/// persisted game rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelDat {
    pub random_seed: i64,
    pub cheats_enabled: bool,
    /// 0 legacy, 1 infinite, 2 flat.
    pub generator: i32,
    /// JSON layer description for flat worlds.
    pub flat_world_layers: String,
    pub experiments: BTreeMap<String, bool>,

    pub command_block_output: bool,
    pub max_command_chain_length: i32,
    pub do_daylight_cycle: bool,
    pub do_entity_drops: bool,
    pub do_fire_tick: bool,
    pub do_mob_loot: bool,
    pub do_mob_spawning: bool,
    pub do_tile_drops: bool,
    pub do_weather_cycle: bool,
    pub drowning_damage: bool,
    pub do_insomnia: bool,
    pub fall_damage: bool,
    pub fire_damage: bool,
    pub keep_inventory: bool,
    pub mob_griefing: bool,
    pub pvp: bool,
    pub show_coordinates: bool,
    pub natural_regeneration: bool,
    pub tnt_explodes: bool,
    pub send_command_feedback: bool,
    pub random_tick_speed: i32,
    pub do_immediate_respawn: bool,
    pub show_death_messages: bool,
    pub function_command_limit: i32,
    pub spawn_radius: i32,
    pub show_tags: bool,
    pub freeze_damage: bool,
    pub respawn_blocks_explode: bool,
    pub show_border_effect: bool,
}

impl Default for LevelDat {
    fn default() -> Self {
        Self {
            random_seed: 0,
            cheats_enabled: false,
            generator: 1,
            flat_world_layers: String::new(),
            experiments: BTreeMap::new(),
            command_block_output: true,
            max_command_chain_length: 65535,
            do_daylight_cycle: true,
            do_entity_drops: true,
            do_fire_tick: true,
            do_mob_loot: true,
            do_mob_spawning: true,
            do_tile_drops: true,
            do_weather_cycle: true,
            drowning_damage: true,
            do_insomnia: true,
            fall_damage: true,
            fire_damage: true,
            keep_inventory: false,
            mob_griefing: true,
            pvp: true,
            show_coordinates: false,
            natural_regeneration: true,
            tnt_explodes: true,
            send_command_feedback: true,
            random_tick_speed: 1,
            do_immediate_respawn: false,
            show_death_messages: true,
            function_command_limit: 10000,
            spawn_radius: 5,
            show_tags: true,
            freeze_damage: true,
            respawn_blocks_explode: true,
            show_border_effect: true,
        }
    }
}

/// One opened world.
pub trait WorldProvider: Send {
    /// Read a stored column, `None` if the position was never written.
    fn load_column(&self, pos: ChunkPos, dim: Dimension) -> Result<Option<Column>, ProviderError>;

    /// Write (or replace) the column at `pos`.
    fn store_column(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        column: &Column,
    ) -> Result<(), ProviderError>;

    /// Write the entity batch for one chunk, replacing any previous batch.
    fn store_entities(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        entities: &[PersistedEntity],
    ) -> Result<(), ProviderError>;

    fn save_local_player_data(&mut self, data: &Compound) -> Result<(), ProviderError>;

    fn settings(&self) -> LevelSettings;

    /// Persist `settings` together with the current [`LevelDat`].
    fn save_settings(&mut self, settings: &LevelSettings) -> Result<(), ProviderError>;

    fn level_dat(&self) -> &LevelDat;

    fn level_dat_mut(&mut self) -> &mut LevelDat;

    /// Flush and release the backing medium. Later writes fail with
    /// [`ProviderError::Closed`].
    fn close(&mut self) -> Result<(), ProviderError>;
}

/// Opens providers at a path.
pub trait ProviderOpener: Send + Sync {
    fn open(
        &self,
        path: &Path,
        compression: Compression,
    ) -> Result<Box<dyn WorldProvider>, ProviderError>;
}
