//! Captured entities and the rider adjacency between them.

use std::collections::BTreeSet;

use relay_proto::{AddActor, Compound, EntityLink, EntityLinkKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::pos::ChunkPos;

/// Last known state of an entity, as seen on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub unique_id: i64,
    pub runtime_id: u64,
    /// Namespaced type tag, e.g. `minecraft:zombie`.
    pub entity_type: String,
    pub position: [f32; 3],
    /// Pitch, yaw, head yaw.
    pub rotation: [f32; 3],
    pub velocity: [f32; 3],
    pub metadata: Compound,
}

impl EntityState {
    pub fn from_add_actor(pk: &AddActor) -> Self {
        Self {
            unique_id: pk.entity_unique_id,
            runtime_id: pk.entity_runtime_id,
            entity_type: pk.entity_type.clone(),
            position: pk.position,
            rotation: pk.rotation,
            velocity: pk.velocity,
            metadata: pk.metadata.clone(),
        }
    }

    /// Chunk the entity stands in.
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::from_block(self.position[0] as i32, self.position[2] as i32)
    }

    /// Durable form carrying the given rider ids.
    pub fn to_persisted(&self, mut links: Vec<i64>) -> PersistedEntity {
        links.sort_unstable();
        PersistedEntity {
            identifier: self.entity_type.clone(),
            unique_id: self.unique_id,
            position: self.position,
            rotation: self.rotation,
            motion: self.velocity,
            data: self.metadata.clone(),
            links,
        }
    }
}

/// An entity as written to the durable store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntity {
    pub identifier: String,
    pub unique_id: i64,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub motion: [f32; 3],
    pub data: Compound,
    /// Unique ids of entities riding this one, ascending.
    pub links: Vec<i64>,
}

/// Entities by runtime id, plus ridden → riders adjacency by unique id.
///
/// Links are not validated against the entity map; either end may name an
/// entity that has not been (or never will be) seen.
#[derive(Debug, Default)]
pub struct EntityTable {
    entities: FxHashMap<u64, EntityState>,
    links: FxHashMap<i64, BTreeSet<i64>>,
}

impl EntityTable {
    pub fn insert(&mut self, runtime_id: u64, state: EntityState) {
        self.entities.insert(runtime_id, state);
    }

    pub fn get(&self, runtime_id: u64) -> Option<&EntityState> {
        self.entities.get(&runtime_id)
    }

    pub fn contains(&self, runtime_id: u64) -> bool {
        self.entities.contains_key(&runtime_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &EntityState)> {
        self.entities.iter()
    }

    /// Apply a link update. Rider and passenger links add an edge, remove
    /// links delete that one edge, anything else is ignored.
    pub fn apply_link(&mut self, link: &EntityLink) {
        match link.kind {
            EntityLinkKind::Rider | EntityLinkKind::Passenger => {
                self.links
                    .entry(link.ridden_unique_id)
                    .or_default()
                    .insert(link.rider_unique_id);
            }
            EntityLinkKind::Remove => {
                if let Some(riders) = self.links.get_mut(&link.ridden_unique_id) {
                    riders.remove(&link.rider_unique_id);
                    if riders.is_empty() {
                        self.links.remove(&link.ridden_unique_id);
                    }
                }
            }
            EntityLinkKind::Other(kind) => {
                tracing::trace!("ignoring entity link kind {kind}");
            }
        }
    }

    /// Rider ids of `ridden`, ascending.
    pub fn riders_of(&self, ridden: i64) -> Vec<i64> {
        self.links
            .get(&ridden)
            .map(|riders| riders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Union another table's edges into this one.
    pub fn merge_links(&mut self, other: &EntityTable) {
        for (ridden, riders) in &other.links {
            self.links.entry(*ridden).or_default().extend(riders);
        }
    }
}
