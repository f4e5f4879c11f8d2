//! Directory-backed world provider.
//!
//! ## Layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `db/<dim>/c.<x>.<z>` | one [`Column`] |
//! | `db/<dim>/e.<x>.<z>` | entity batch for that chunk |
//! | `db/player.local` | local player data |
//! | `level.ron` | [`LevelSettings`] and [`LevelDat`] |
//!
//! Binary records are postcard-encoded behind a one-byte flag: `0` raw, `1`
//! LZ4 with the uncompressed size prepended.

use std::path::{Path, PathBuf};

use relay_proto::Compound;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::entity::PersistedEntity;
use crate::pos::{ChunkPos, Dimension};
use crate::provider::{
    Compression, LevelDat, LevelSettings, ProviderError, ProviderOpener, WorldProvider,
};

const FLAG_RAW: u8 = 0;
const FLAG_LZ4: u8 = 1;

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct LevelFile {
    settings: LevelSettings,
    level_dat: LevelDat,
}

/// A world stored as plain files under one directory.
pub struct DiskProvider {
    root: PathBuf,
    compression: Compression,
    settings: LevelSettings,
    level_dat: LevelDat,
    closed: bool,
}

impl DiskProvider {
    /// Open (or create) a world at `root`, loading `level.ron` if present.
    pub fn open(root: &Path, compression: Compression) -> Result<Self, ProviderError> {
        std::fs::create_dir_all(root.join("db"))?;
        let level_path = root.join("level.ron");
        let level = if level_path.exists() {
            let contents = std::fs::read_to_string(&level_path)?;
            ron::from_str::<LevelFile>(&contents)
                .map_err(|e| ProviderError::Serialization(e.to_string()))?
        } else {
            LevelFile::default()
        };
        tracing::debug!("opened world at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            compression,
            settings: level.settings,
            level_dat: level.level_dat,
            closed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dim_dir(&self, dim: Dimension) -> PathBuf {
        self.root.join("db").join(dim.id().to_string())
    }

    fn column_path(&self, pos: ChunkPos, dim: Dimension) -> PathBuf {
        self.dim_dir(dim).join(format!("c.{}.{}", pos.x, pos.z))
    }

    fn entities_path(&self, pos: ChunkPos, dim: Dimension) -> PathBuf {
        self.dim_dir(dim).join(format!("e.{}.{}", pos.x, pos.z))
    }

    fn check_open(&self) -> Result<(), ProviderError> {
        if self.closed {
            Err(ProviderError::Closed)
        } else {
            Ok(())
        }
    }

    fn write_record<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), ProviderError> {
        let bytes =
            postcard::to_allocvec(value).map_err(|e| ProviderError::Serialization(e.to_string()))?;
        let mut out = Vec::with_capacity(bytes.len() + 1);
        match self.compression {
            Compression::None => {
                out.push(FLAG_RAW);
                out.extend_from_slice(&bytes);
            }
            Compression::Lz4 => {
                out.push(FLAG_LZ4);
                out.extend_from_slice(&lz4_flex::compress_prepend_size(&bytes));
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ProviderError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = match data.split_first() {
            Some((&FLAG_RAW, rest)) => rest.to_vec(),
            Some((&FLAG_LZ4, rest)) => lz4_flex::decompress_size_prepended(rest)
                .map_err(|e| ProviderError::Serialization(e.to_string()))?,
            Some((flag, _)) => {
                return Err(ProviderError::Serialization(format!(
                    "unknown record flag {flag:#04x} in {}",
                    path.display()
                )));
            }
            None => {
                return Err(ProviderError::Serialization(format!(
                    "empty record {}",
                    path.display()
                )));
            }
        };
        postcard::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| ProviderError::Serialization(e.to_string()))
    }

    /// Read back an entity batch.
    pub fn load_entities(
        &self,
        pos: ChunkPos,
        dim: Dimension,
    ) -> Result<Vec<PersistedEntity>, ProviderError> {
        Ok(Self::read_record(&self.entities_path(pos, dim))?.unwrap_or_default())
    }

    /// Read back the local player data.
    pub fn load_local_player_data(&self) -> Result<Option<Compound>, ProviderError> {
        Self::read_record(&self.root.join("db").join("player.local"))
    }
}

impl WorldProvider for DiskProvider {
    fn load_column(&self, pos: ChunkPos, dim: Dimension) -> Result<Option<Column>, ProviderError> {
        self.check_open()?;
        Self::read_record(&self.column_path(pos, dim))
    }

    fn store_column(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        column: &Column,
    ) -> Result<(), ProviderError> {
        self.check_open()?;
        self.write_record(&self.column_path(pos, dim), column)
    }

    fn store_entities(
        &mut self,
        pos: ChunkPos,
        dim: Dimension,
        entities: &[PersistedEntity],
    ) -> Result<(), ProviderError> {
        self.check_open()?;
        self.write_record(&self.entities_path(pos, dim), &entities)
    }

    fn save_local_player_data(&mut self, data: &Compound) -> Result<(), ProviderError> {
        self.check_open()?;
        self.write_record(&self.root.join("db").join("player.local"), data)
    }

    fn settings(&self) -> LevelSettings {
        self.settings.clone()
    }

    fn save_settings(&mut self, settings: &LevelSettings) -> Result<(), ProviderError> {
        self.check_open()?;
        self.settings = settings.clone();
        let file = LevelFile {
            settings: self.settings.clone(),
            level_dat: self.level_dat.clone(),
        };
        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let serialized = ron::ser::to_string_pretty(&file, pretty)
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;
        std::fs::write(self.root.join("level.ron"), serialized)?;
        Ok(())
    }

    fn level_dat(&self) -> &LevelDat {
        &self.level_dat
    }

    fn level_dat_mut(&mut self) -> &mut LevelDat {
        &mut self.level_dat
    }

    fn close(&mut self) -> Result<(), ProviderError> {
        self.check_open()?;
        self.closed = true;
        tracing::debug!("closed world at {}", self.root.display());
        Ok(())
    }
}

/// Opens [`DiskProvider`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskOpener;

impl ProviderOpener for DiskOpener {
    fn open(
        &self,
        path: &Path,
        compression: Compression,
    ) -> Result<Box<dyn WorldProvider>, ProviderError> {
        Ok(Box::new(DiskProvider::open(path, compression)?))
    }
}
