//! In-memory world provider.
//!
//! The world state lives behind an `Arc<Mutex<_>>` shared by every handle, so
//! a test can keep a [`MemoryWorld`] handle and inspect what the store wrote
//! after the provider itself has been moved into it. Individual operations can
//! be made to fail through [`FailPoints`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use relay_proto::Compound;

use crate::column::Column;
use crate::entity::PersistedEntity;
use crate::pos::{ChunkPos, Dimension};
use crate::provider::{
    Compression, LevelDat, LevelSettings, ProviderError, ProviderOpener, WorldProvider,
};

/// Operations that should fail on the next call.
#[derive(Debug, Default, Clone)]
pub struct FailPoints {
    pub open: bool,
    pub store_column: bool,
    /// Entity batches for these chunks fail.
    pub store_entities: HashSet<ChunkPos>,
    pub save_player_data: bool,
    pub save_settings: bool,
}

/// Everything written to a memory world.
#[derive(Debug, Default)]
pub struct MemoryState {
    pub columns: HashMap<(Dimension, ChunkPos), Column>,
    pub entities: HashMap<(Dimension, ChunkPos), Vec<PersistedEntity>>,
    pub player_data: Option<Compound>,
    pub settings: LevelSettings,
    /// Settings as of the last successful save.
    pub saved_settings: Option<LevelSettings>,
    /// Level data handed to newly opened providers, and updated on every
    /// successful settings save.
    pub level_dat: LevelDat,
    pub closed: bool,
    /// Paths passed to the opener, in order.
    pub opened_paths: Vec<PathBuf>,
    pub fail: FailPoints,
}

/// Shared handle to a memory world.
#[derive(Clone, Debug, Default)]
pub struct MemoryWorld {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    /// A provider writing into this world.
    pub fn provider(&self) -> MemoryProvider {
        MemoryProvider {
            world: self.clone(),
            level_dat: self.state().level_dat.clone(),
        }
    }

    /// Total entities written across all batches.
    pub fn entity_count(&self) -> usize {
        self.state().entities.values().map(Vec::len).sum()
    }
}

/// A provider over a [`MemoryWorld`].
///
/// Level data is edited locally and published to the shared state by
/// [`WorldProvider::save_settings`].
pub struct MemoryProvider {
    world: MemoryWorld,
    level_dat: LevelDat,
}

impl MemoryProvider {
    fn open_state(&self) -> Result<MutexGuard<'_, MemoryState>, ProviderError> {
        let state = self.world.state();
        if state.closed {
            return Err(ProviderError::Closed);
        }
        Ok(state)
    }
}

impl WorldProvider for MemoryProvider {
    fn load_column(&self, pos: ChunkPos, dim: Dimension) -> Result<Option<Column>, ProviderError> {
        Ok(self.open_state()?.columns.get(&(dim, pos)).cloned())
    }

    fn store_column(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        column: &Column,
    ) -> Result<(), ProviderError> {
        let mut state = self.open_state()?;
        if state.fail.store_column {
            return Err(ProviderError::Backend("store_column failed".into()));
        }
        state.columns.insert((dim, pos), column.clone());
        Ok(())
    }

    fn store_entities(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        entities: &[PersistedEntity],
    ) -> Result<(), ProviderError> {
        let mut state = self.open_state()?;
        if state.fail.store_entities.contains(&pos) {
            return Err(ProviderError::Backend(format!(
                "store_entities failed at {},{}",
                pos.x, pos.z
            )));
        }
        state.entities.insert((dim, pos), entities.to_vec());
        Ok(())
    }

    fn save_local_player_data(&mut self, data: &Compound) -> Result<(), ProviderError> {
        let mut state = self.open_state()?;
        if state.fail.save_player_data {
            return Err(ProviderError::Backend("save_local_player_data failed".into()));
        }
        state.player_data = Some(data.clone());
        Ok(())
    }

    fn settings(&self) -> LevelSettings {
        self.world.state().settings.clone()
    }

    fn save_settings(&mut self, settings: &LevelSettings) -> Result<(), ProviderError> {
        let mut state = self.open_state()?;
        if state.fail.save_settings {
            return Err(ProviderError::Backend("save_settings failed".into()));
        }
        state.settings = settings.clone();
        state.saved_settings = Some(settings.clone());
        state.level_dat = self.level_dat.clone();
        Ok(())
    }

    fn level_dat(&self) -> &LevelDat {
        &self.level_dat
    }

    fn level_dat_mut(&mut self) -> &mut LevelDat {
        &mut self.level_dat
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        let mut state = self.open_state()?;
        state.closed = true;
        Ok(())
    }
}

/// Opens providers over one shared [`MemoryWorld`], recording each path.
#[derive(Clone, Debug, Default)]
pub struct MemoryOpener {
    pub world: MemoryWorld,
}

impl ProviderOpener for MemoryOpener {
    fn open(
        &self,
        path: &Path,
        _compression: Compression,
    ) -> Result<Box<dyn WorldProvider>, ProviderError> {
        let mut state = self.world.state();
        state.opened_paths.push(path.to_path_buf());
        if state.fail.open {
            return Err(ProviderError::Backend(format!(
                "cannot open {}",
                path.display()
            )));
        }
        state.closed = false;
        drop(state);
        Ok(Box::new(self.world.provider()))
    }
}
