//! A capture session: the store plus the per-session settings the finalizer
//! needs (exclusions, void generation, time sync, player position).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use relay_proto::{AddActor, EntityLink, GameData, LevelChunk};

use crate::column::Column;
use crate::entity::EntityState;
use crate::error::WorldError;
use crate::finalizer::{FinishParams, TimeSync, WorldFinalizer};
use crate::pos::{BlockPos, Dimension};
use crate::provider::{Compression, ProviderOpener};
use crate::store::{ChunkNotify, FinalizeReport, ResumeReport, WorldStateStore};

/// Settings fixed for the lifetime of a session.
#[derive(Clone, Debug, Default)]
pub struct WorldSessionOptions {
    /// Entity type tags never written at finalize.
    pub exclude_mobs: Vec<String>,
    /// Replace the generator with an empty flat world.
    pub void_gen: bool,
    pub compression: Compression,
}

struct Tracking {
    time: TimeSync,
    player_position: BlockPos,
}

/// Everything captured in one session.
pub struct WorldSession {
    store: WorldStateStore,
    options: WorldSessionOptions,
    tracking: Mutex<Tracking>,
}

impl WorldSession {
    pub fn new(opener: Arc<dyn ProviderOpener>, options: WorldSessionOptions) -> Self {
        Self {
            store: WorldStateStore::new(opener).with_compression(options.compression),
            options,
            tracking: Mutex::new(Tracking {
                time: TimeSync::default(),
                player_position: BlockPos::default(),
            }),
        }
    }

    pub fn store(&self) -> &WorldStateStore {
        &self.store
    }

    pub fn options(&self) -> &WorldSessionOptions {
        &self.options
    }

    pub fn open(
        &self,
        name: &str,
        folder: impl Into<PathBuf>,
        dimension: Dimension,
        deferred: bool,
        notify: &mut ChunkNotify<'_>,
    ) -> Result<(), WorldError> {
        self.store.open(name, folder, dimension, deferred, notify)
    }

    pub fn rename(&self, name: &str, folder: impl Into<PathBuf>) -> Result<(), WorldError> {
        self.store.rename(name, folder)
    }

    pub fn pause_capture(&self) {
        tracing::info!("capture paused");
        self.store.pause_capture();
    }

    /// Resume around the last known player position.
    pub fn resume_capture(
        &self,
        radius: i32,
        notify: &mut ChunkNotify<'_>,
    ) -> Result<ResumeReport, WorldError> {
        let around = self.player_position();
        let report = self.store.resume_capture(around, radius, notify)?;
        tracing::info!(
            "capture resumed around {},{} with {} chunks",
            around.x,
            around.z,
            report.committed_chunks
        );
        Ok(report)
    }

    /// Apply start-game data: dimension, time, and spawn position.
    pub fn apply_game_data(&self, gd: &GameData) {
        if let Some(dim) = Dimension::from_id(gd.dimension) {
            self.store.set_dimension(dim);
        }
        self.set_time(gd.time);
        self.set_player_position(BlockPos::from_vec(gd.player_position));
    }

    pub fn handle_level_chunk(&self, packet: &LevelChunk) {
        let dim = Dimension::from_id(packet.dimension).unwrap_or_else(|| self.store.dimension());
        let (pos, column) = Column::from_level_chunk(packet);
        self.store.store_chunk(pos, dim, column);
    }

    pub fn handle_add_actor(&self, packet: &AddActor) {
        self.store
            .store_entity(packet.entity_runtime_id, EntityState::from_add_actor(packet));
        for link in &packet.links {
            self.store.add_entity_link(link);
        }
    }

    pub fn handle_entity_link(&self, link: &EntityLink) {
        self.store.add_entity_link(link);
    }

    /// Record the server's tick count as of now.
    pub fn set_time(&self, ticks: i64) {
        self.set_time_at(ticks, Instant::now());
    }

    pub fn set_time_at(&self, ticks: i64, anchor: Instant) {
        self.tracking.lock().unwrap().time = TimeSync::new(ticks, anchor);
    }

    pub fn time_sync(&self) -> TimeSync {
        self.tracking.lock().unwrap().time
    }

    pub fn world_time(&self, daylight_cycle: bool, now: Instant) -> i64 {
        self.time_sync().world_time(daylight_cycle, now)
    }

    pub fn set_player_position(&self, pos: BlockPos) {
        self.tracking.lock().unwrap().player_position = pos;
    }

    pub fn player_position(&self) -> BlockPos {
        self.tracking.lock().unwrap().player_position
    }

    /// Finalize and close the world.
    pub fn finish(&self, params: FinishParams<'_>) -> Result<FinalizeReport, WorldError> {
        WorldFinalizer::new(
            &self.store,
            &self.options.exclude_mobs,
            self.options.void_gen,
            self.time_sync(),
        )
        .finish(params, Instant::now())
    }
}
