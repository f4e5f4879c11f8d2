//! Captured chunk columns.
//!
//! A [`Column`] is the unit the store holds per [`ChunkPos`]: the terrain
//! sections plus the block entities that live inside them. Columns are
//! replaced wholesale when the same position is captured again.

use std::collections::BTreeMap;

use relay_proto::{Compound, LevelChunk};
use serde::{Deserialize, Serialize};

use crate::pos::{BlockPos, ChunkPos};

/// Runtime id of air in every block palette.
pub const AIR_RUNTIME_ID: u32 = 0;

/// One 16-block-tall vertical section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubChunk {
    /// Block runtime ids per storage layer.
    pub layers: Vec<Vec<u32>>,
}

impl SubChunk {
    /// `true` if the section has no layers or holds only air.
    pub fn is_empty(&self) -> bool {
        self.layers
            .iter()
            .all(|layer| layer.iter().all(|&id| id == AIR_RUNTIME_ID))
    }
}

/// Terrain for a column, sections bottom to top.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub sub_chunks: Vec<SubChunk>,
}

impl Chunk {
    /// `true` if every section is empty. A chunk with no sections is empty.
    pub fn is_empty(&self) -> bool {
        self.sub_chunks.iter().all(SubChunk::is_empty)
    }
}

/// Terrain plus block entities for one chunk position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub chunk: Chunk,
    pub block_entities: BTreeMap<BlockPos, Compound>,
}

impl Column {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            block_entities: BTreeMap::new(),
        }
    }

    /// Convert a level-chunk packet into its position and column.
    pub fn from_level_chunk(packet: &LevelChunk) -> (ChunkPos, Column) {
        let chunk = Chunk {
            sub_chunks: packet
                .sub_chunks
                .iter()
                .map(|layers| SubChunk {
                    layers: layers.clone(),
                })
                .collect(),
        };
        let block_entities = packet
            .block_entities
            .iter()
            .map(|be| (BlockPos::from(be.position), be.data.clone()))
            .collect();
        (
            ChunkPos::new(packet.chunk_x, packet.chunk_z),
            Column {
                chunk,
                block_entities,
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }
}
