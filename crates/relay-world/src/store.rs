//! Dual-backend holder of captured chunks, entities and entity links.
//!
//! While capture is paused (and before a destination is opened) writes land
//! in a [`WorldBuffer`]. Resuming runs the relocation pass: empty columns are
//! culled, the rest are filtered by distance from a reference position and
//! committed to the durable provider, and the store switches to durable mode.
//!
//! All state sits behind one mutex, so a mode swap is atomic with respect to
//! any concurrent write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use relay_proto::EntityLink;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::column::Column;
use crate::entity::{EntityState, EntityTable, PersistedEntity};
use crate::error::WorldError;
use crate::pos::{BlockPos, ChunkPos, Dimension, planar_distance};
use crate::provider::{Compression, ProviderError, ProviderOpener, WorldProvider};

/// Callback told about each buffered chunk on resume: the column if it was
/// committed, `None` if it fell outside the radius. Chunks whose write failed
/// are not reported.
pub type ChunkNotify<'a> = dyn FnMut(ChunkPos, Option<&Column>) + 'a;

/// Staging area used while capture is paused.
#[derive(Debug, Default)]
pub struct WorldBuffer {
    columns: FxHashMap<ChunkPos, Column>,
    entities: EntityTable,
}

impl WorldBuffer {
    /// Drop columns whose every section is empty. Returns how many went.
    fn cull(&mut self) -> usize {
        let before = self.columns.len();
        self.columns.retain(|_, column| !column.is_empty());
        before - self.columns.len()
    }
}

/// The durable side: an open provider plus the entity table that is flushed
/// to it at finalize.
#[derive(Default)]
struct DurableStore {
    provider: Option<Box<dyn WorldProvider>>,
    entities: EntityTable,
}

impl DurableStore {
    fn store_column(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        column: &Column,
    ) -> Result<(), WorldError> {
        let provider = self.provider.as_mut().ok_or(WorldError::NotOpen)?;
        provider.store_column(pos, dim, column)?;
        Ok(())
    }
}

enum CaptureMode {
    Buffered(WorldBuffer),
    Durable,
}

/// Counts from one resume pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub culled_chunks: usize,
    pub committed_chunks: usize,
    pub excluded_chunks: usize,
    /// In range, but the provider write failed.
    pub failed_chunks: usize,
    pub committed_entities: usize,
    pub dropped_entities: usize,
}

/// Counts from one entity flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub batches: usize,
    pub failed_batches: usize,
    pub entities: usize,
}

struct StoreInner {
    name: String,
    folder: Option<PathBuf>,
    dimension: Dimension,
    mode: CaptureMode,
    durable: DurableStore,
    stored_chunks: FxHashSet<ChunkPos>,
}

impl StoreInner {
    fn active_entities(&mut self) -> &mut EntityTable {
        match &mut self.mode {
            CaptureMode::Buffered(buffer) => &mut buffer.entities,
            CaptureMode::Durable => &mut self.durable.entities,
        }
    }

    fn resume(
        &mut self,
        reference: BlockPos,
        radius: i32,
        notify: &mut ChunkNotify<'_>,
    ) -> Result<ResumeReport, WorldError> {
        if self.durable.provider.is_none() {
            return Err(WorldError::NotOpen);
        }
        let CaptureMode::Buffered(mut buffer) =
            std::mem::replace(&mut self.mode, CaptureMode::Durable)
        else {
            return Ok(ResumeReport::default());
        };

        let mut report = ResumeReport {
            culled_chunks: buffer.cull(),
            ..Default::default()
        };

        let center = reference.chunk();
        let mut columns: Vec<_> = buffer.columns.into_iter().collect();
        columns.sort_unstable_by_key(|(pos, _)| *pos);
        for (pos, column) in columns {
            if radius < 0 || pos.distance(center) <= radius as u64 {
                match self.durable.store_column(pos, self.dimension, &column) {
                    Ok(()) => {
                        notify(pos, Some(&column));
                        report.committed_chunks += 1;
                    }
                    Err(e) => {
                        tracing::error!("failed to commit chunk {},{}: {e}", pos.x, pos.z);
                        report.failed_chunks += 1;
                    }
                }
            } else {
                notify(pos, None);
                report.excluded_chunks += 1;
            }
        }

        let block_radius = u64::from(radius.unsigned_abs()) * 16;
        for (&runtime_id, state) in buffer.entities.iter() {
            let dist = planar_distance(
                i64::from(state.position[0] as i32) - i64::from(reference.x),
                i64::from(state.position[2] as i32) - i64::from(reference.z),
            );
            if radius < 0 || dist < block_radius || self.durable.entities.contains(runtime_id) {
                self.durable.entities.insert(runtime_id, state.clone());
                report.committed_entities += 1;
            } else {
                report.dropped_entities += 1;
            }
        }
        self.durable.entities.merge_links(&buffer.entities);

        tracing::debug!(?report, "resumed capture");
        Ok(report)
    }

    fn close_provider(&mut self) -> Result<(), ProviderError> {
        match self.durable.provider.take() {
            Some(mut provider) => provider.close(),
            None => Ok(()),
        }
    }
}

/// Thread-safe store of everything captured in one session.
pub struct WorldStateStore {
    opener: Arc<dyn ProviderOpener>,
    compression: Compression,
    inner: Mutex<StoreInner>,
}

impl WorldStateStore {
    /// A store in buffered mode with no destination yet.
    pub fn new(opener: Arc<dyn ProviderOpener>) -> Self {
        Self {
            opener,
            compression: Compression::default(),
            inner: Mutex::new(StoreInner {
                name: String::new(),
                folder: None,
                dimension: Dimension::default(),
                mode: CaptureMode::Buffered(WorldBuffer::default()),
                durable: DurableStore::default(),
                stored_chunks: FxHashSet::default(),
            }),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    /// Wipe and recreate `folder`, then open a provider there.
    ///
    /// Unless `deferred`, anything buffered so far is committed without
    /// distance filtering and the store switches to durable mode.
    pub fn open(
        &self,
        name: &str,
        folder: impl Into<PathBuf>,
        dimension: Dimension,
        deferred: bool,
        notify: &mut ChunkNotify<'_>,
    ) -> Result<(), WorldError> {
        let folder = folder.into();
        let mut inner = self.lock();
        if let Err(e) = inner.close_provider() {
            tracing::warn!("closing previous world: {e}");
        }

        match std::fs::remove_dir_all(&folder) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(WorldError::Folder { path: folder, source }),
        }
        if let Err(source) = std::fs::create_dir_all(&folder) {
            return Err(WorldError::Folder { path: folder, source });
        }

        let provider = self.opener.open(&folder, self.compression)?;
        tracing::info!("writing world {name:?} to {}", folder.display());
        inner.name = name.to_string();
        inner.folder = Some(folder);
        inner.dimension = dimension;
        inner.durable.provider = Some(provider);

        if !deferred {
            inner.resume(BlockPos::default(), -1, notify)?;
        }
        Ok(())
    }

    /// Store or replace the column at `pos` in the active backend.
    pub fn store_chunk(&self, pos: ChunkPos, dimension: Dimension, column: Column) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.stored_chunks.insert(pos);
        match &mut inner.mode {
            CaptureMode::Buffered(buffer) => {
                buffer.columns.insert(pos, column);
            }
            CaptureMode::Durable => {
                if let Err(e) = inner.durable.store_column(pos, dimension, &column) {
                    tracing::error!("failed to store chunk {},{}: {e}", pos.x, pos.z);
                }
            }
        }
    }

    /// Store or overwrite an entity by runtime id.
    pub fn store_entity(&self, runtime_id: u64, state: EntityState) {
        self.lock().active_entities().insert(runtime_id, state);
    }

    pub fn add_entity_link(&self, link: &EntityLink) {
        self.lock().active_entities().apply_link(link);
    }

    /// Start staging into a fresh buffer. Any previous unflushed buffer is
    /// discarded.
    pub fn pause_capture(&self) {
        self.lock().mode = CaptureMode::Buffered(WorldBuffer::default());
    }

    /// Commit the buffer around `reference` and switch to durable mode.
    ///
    /// A negative `radius` disables distance filtering.
    pub fn resume_capture(
        &self,
        reference: BlockPos,
        radius: i32,
        notify: &mut ChunkNotify<'_>,
    ) -> Result<ResumeReport, WorldError> {
        self.lock().resume(reference, radius, notify)
    }

    /// Write all durable entities, grouped by chunk, skipping excluded types.
    ///
    /// A failed batch is logged and the remaining batches are still written.
    pub fn finalize(
        &self,
        excluded_types: &[String],
        dimension: Dimension,
    ) -> Result<FinalizeReport, WorldError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(provider) = inner.durable.provider.as_mut() else {
            return Err(WorldError::NotOpen);
        };

        let mut by_chunk: BTreeMap<ChunkPos, Vec<PersistedEntity>> = BTreeMap::new();
        for (_, state) in inner.durable.entities.iter() {
            if excluded_types.contains(&state.entity_type) {
                continue;
            }
            let links = inner.durable.entities.riders_of(state.unique_id);
            by_chunk
                .entry(state.chunk())
                .or_default()
                .push(state.to_persisted(links));
        }

        let mut report = FinalizeReport::default();
        for (pos, mut batch) in by_chunk {
            batch.sort_by_key(|e| e.unique_id);
            report.batches += 1;
            match provider.store_entities(pos, dimension, &batch) {
                Ok(()) => report.entities += batch.len(),
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::error!("failed to store entities in {},{}: {e}", pos.x, pos.z);
                }
            }
        }
        Ok(report)
    }

    /// Close the provider, move the world folder, and reopen it there.
    ///
    /// On failure the store is left without an open provider.
    pub fn rename(&self, name: &str, folder: impl Into<PathBuf>) -> Result<(), WorldError> {
        let folder = folder.into();
        let mut inner = self.lock();
        let Some(from) = inner.folder.clone() else {
            return Err(WorldError::NotOpen);
        };
        inner.close_provider()?;

        if let Err(source) = std::fs::rename(&from, &folder) {
            return Err(WorldError::Rename {
                from,
                to: folder,
                source,
            });
        }
        inner.folder = Some(folder.clone());
        inner.name = name.to_string();
        inner.durable.provider = Some(self.opener.open(&folder, self.compression)?);
        tracing::info!("world renamed to {name:?} at {}", folder.display());
        Ok(())
    }

    /// Run `f` against the open provider.
    pub fn with_provider<R>(
        &self,
        f: impl FnOnce(&mut dyn WorldProvider) -> Result<R, ProviderError>,
    ) -> Result<R, WorldError> {
        let mut inner = self.lock();
        let provider = inner.durable.provider.as_mut().ok_or(WorldError::NotOpen)?;
        Ok(f(provider.as_mut())?)
    }

    /// Close the open provider, if any.
    pub fn close(&self) -> Result<(), WorldError> {
        Ok(self.lock().close_provider()?)
    }

    /// Read a column from the active backend.
    pub fn column(&self, pos: ChunkPos) -> Result<Option<Column>, WorldError> {
        let inner = self.lock();
        match &inner.mode {
            CaptureMode::Buffered(buffer) => Ok(buffer.columns.get(&pos).cloned()),
            CaptureMode::Durable => {
                let provider = inner.durable.provider.as_ref().ok_or(WorldError::NotOpen)?;
                Ok(provider.load_column(pos, inner.dimension)?)
            }
        }
    }

    pub fn entity(&self, runtime_id: u64) -> Option<EntityState> {
        self.lock().active_entities().get(runtime_id).cloned()
    }

    pub fn has_entity(&self, runtime_id: u64) -> bool {
        self.lock().active_entities().contains(runtime_id)
    }

    /// Rider ids of `ridden` in the active backend, ascending.
    pub fn riders_of(&self, ridden: i64) -> Vec<i64> {
        self.lock().active_entities().riders_of(ridden)
    }

    /// `true` when writes go straight to the durable provider.
    pub fn is_capturing(&self) -> bool {
        matches!(self.lock().mode, CaptureMode::Durable)
    }

    pub fn is_open(&self) -> bool {
        self.lock().durable.provider.is_some()
    }

    /// Distinct chunk positions received this session.
    pub fn stored_chunk_count(&self) -> usize {
        self.lock().stored_chunks.len()
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn folder(&self) -> Option<PathBuf> {
        self.lock().folder.clone()
    }

    pub fn dimension(&self) -> Dimension {
        self.lock().dimension
    }

    pub fn set_dimension(&self, dimension: Dimension) {
        self.lock().dimension = dimension;
    }

    /// Whether `path` is the current world folder.
    pub fn is_at(&self, path: &Path) -> bool {
        self.lock().folder.as_deref() == Some(path)
    }
}
