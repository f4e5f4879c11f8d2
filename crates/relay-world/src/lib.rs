//! World capture: stages, filters and persists chunk columns and entities seen
//! on the wire, and reconciles them into level metadata when a session ends.

pub mod column;
pub mod disk;
pub mod entity;
pub mod error;
pub mod finalizer;
pub mod gamerules;
pub mod memory;
pub mod pos;
pub mod provider;
pub mod session;
pub mod store;

pub use column::{AIR_RUNTIME_ID, Chunk, Column, SubChunk};
pub use disk::{DiskOpener, DiskProvider};
pub use entity::{EntityState, EntityTable, PersistedEntity};
pub use error::WorldError;
pub use finalizer::{
    EXPERIMENT_KEYS, FLAT_GENERATOR, FinishParams, TimeSync, VOID_FLAT_LAYERS, WorldFinalizer,
    compute_world_time,
};
pub use gamerules::{KNOWN_RULES, RuleOutcome, apply_game_rule, apply_game_rules};
pub use memory::{FailPoints, MemoryOpener, MemoryProvider, MemoryState, MemoryWorld};
pub use pos::{BlockPos, ChunkPos, Dimension, planar_distance};
pub use provider::{
    Compression, LevelDat, LevelSettings, ProviderError, ProviderOpener, WorldProvider,
};
pub use session::{WorldSession, WorldSessionOptions};
pub use store::{ChunkNotify, FinalizeReport, ResumeReport, WorldBuffer, WorldStateStore};
