//! End-of-session reconciliation of captured state into level metadata.
//!
//! The sequence is not atomic: entities and player data already written stay
//! written if a later step fails, and the provider is only closed when every
//! step succeeds.

use std::time::{Duration, Instant};

use relay_proto::{Compound, GameData};

use crate::error::WorldError;
use crate::gamerules::apply_game_rules;
use crate::pos::BlockPos;
use crate::store::{FinalizeReport, WorldStateStore};

/// Generator id of flat worlds.
pub const FLAT_GENERATOR: i32 = 2;

/// Flat-world layers producing a single-biome world of air.
pub const VOID_FLAT_LAYERS: &str = r#"{"biome_id":1,"block_layers":[{"block_data":0,"block_id":0,"count":1},{"block_data":0,"block_id":0,"count":2},{"block_data":0,"block_id":0,"count":1}],"encoding_version":3,"structure_options":null}"#;

/// Experiment toggles set when the world carries generated behaviour-pack
/// content.
pub const EXPERIMENT_KEYS: [&str; 3] = [
    "data_driven_items",
    "experiments_ever_used",
    "saved_with_toggled_experiments",
];

/// Milliseconds per game tick.
const MS_PER_TICK: u128 = 50;

/// Base tick count plus the wall-clock instant it was observed at.
#[derive(Clone, Copy, Debug)]
pub struct TimeSync {
    pub base: i64,
    pub anchor: Instant,
}

impl TimeSync {
    pub fn new(base: i64, anchor: Instant) -> Self {
        Self { base, anchor }
    }

    /// World time as of `now`.
    pub fn world_time(&self, daylight_cycle: bool, now: Instant) -> i64 {
        compute_world_time(
            self.base,
            now.saturating_duration_since(self.anchor),
            daylight_cycle,
        )
    }
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new(0, Instant::now())
    }
}

/// `base` advanced by whole 50 ms ticks in `elapsed`, only while the
/// day/night cycle runs.
pub fn compute_world_time(base: i64, elapsed: Duration, daylight_cycle: bool) -> i64 {
    if !daylight_cycle {
        return base;
    }
    base + (elapsed.as_millis() / MS_PER_TICK) as i64
}

/// Inputs only known when the session ends.
pub struct FinishParams<'a> {
    pub player_data: Compound,
    pub spawn: BlockPos,
    pub game_data: &'a GameData,
    /// Generated behaviour-pack content is non-empty.
    pub has_pack_content: bool,
}

/// Finishes one [`WorldStateStore`].
pub struct WorldFinalizer<'a> {
    store: &'a WorldStateStore,
    excluded_types: &'a [String],
    void_gen: bool,
    time: TimeSync,
}

impl<'a> WorldFinalizer<'a> {
    pub fn new(
        store: &'a WorldStateStore,
        excluded_types: &'a [String],
        void_gen: bool,
        time: TimeSync,
    ) -> Self {
        Self {
            store,
            excluded_types,
            void_gen,
            time,
        }
    }

    /// Flush entities, save player data and settings, then close the store.
    ///
    /// Returns early, leaving the provider open, on the first failure after
    /// the entity flush.
    pub fn finish(
        &self,
        params: FinishParams<'_>,
        now: Instant,
    ) -> Result<FinalizeReport, WorldError> {
        let report = self
            .store
            .finalize(self.excluded_types, self.store.dimension())?;
        if report.failed_batches > 0 {
            tracing::warn!(
                "{} of {} entity batches failed to save",
                report.failed_batches,
                report.batches
            );
        }

        let name = self.store.name();
        let gd = params.game_data;
        self.store.with_provider(|provider| {
            provider.save_local_player_data(&params.player_data)?;

            let mut settings = provider.settings();
            settings.spawn = params.spawn;
            settings.name = name;

            let ld = provider.level_dat_mut();
            ld.cheats_enabled = true;
            ld.random_seed = gd.world_seed;
            apply_game_rules(ld, &gd.game_rules);

            if self.void_gen {
                ld.flat_world_layers = VOID_FLAT_LAYERS.to_string();
                ld.generator = FLAT_GENERATOR;
            }
            ld.random_tick_speed = 0;

            settings.current_tick = gd.time;
            settings.time = self.time.world_time(ld.do_daylight_cycle, now);
            if ld.do_daylight_cycle {
                settings.time_cycle = true;
            }

            if params.has_pack_content {
                for key in EXPERIMENT_KEYS {
                    ld.experiments.insert(key.to_string(), true);
                }
            }

            provider.save_settings(&settings)
        })?;

        self.store.close()?;
        tracing::info!(
            "finished world {:?}: {} entities in {} chunks",
            self.store.name(),
            report.entities,
            report.batches
        );
        Ok(report)
    }
}
