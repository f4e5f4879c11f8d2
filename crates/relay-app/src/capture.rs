//! World capture packet handler.
//!
//! Feeds the packets the world store cares about into a [`WorldSession`],
//! opens the destination world when the server's start-game data arrives,
//! and finishes the world when the session ends.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use relay_proto::{
    AddActor, Body, Compound, GameData, GameRulesChanged, LevelChunk, MovePlayer, Packet,
    SetActorLink, SetTime, Tag, id,
};
use relay_proxy::{Direction, PacketHandler};
use relay_world::{
    BlockPos, Dimension, FinalizeReport, FinishParams, ProviderOpener, WorldError, WorldSession,
    WorldSessionOptions,
};

const HANDLER_NAME: &str = "WorldCapture";

/// Where and how captured worlds are written.
#[derive(Clone, Debug)]
pub struct CaptureOptions {
    pub output_dir: PathBuf,
    /// Keep buffering after the world opens; the buffer is committed around
    /// the player at the end of the session.
    pub deferred: bool,
    pub resume_radius: i32,
    /// World name used when the server sends none.
    pub fallback_name: String,
}

#[derive(Default)]
struct Tracked {
    game_data: Option<GameData>,
}

/// One session's capture state, shared by the handler's hooks.
pub struct WorldCapture {
    session: WorldSession,
    options: CaptureOptions,
    tracked: Mutex<Tracked>,
}

impl WorldCapture {
    pub fn new(
        opener: Arc<dyn ProviderOpener>,
        session_options: WorldSessionOptions,
        options: CaptureOptions,
    ) -> Self {
        Self {
            session: WorldSession::new(opener, session_options),
            options,
            tracked: Mutex::new(Tracked::default()),
        }
    }

    pub fn session(&self) -> &WorldSession {
        &self.session
    }

    /// Start-game data from the server, possibly modified by earlier handlers.
    pub fn game_data(&self) -> Option<GameData> {
        self.tracked.lock().unwrap().game_data.clone()
    }

    /// Track the start-game data and open the destination world.
    pub fn on_game_data(&self, game_data: &GameData) {
        self.session.apply_game_data(game_data);
        self.tracked.lock().unwrap().game_data = Some(game_data.clone());

        let name = world_folder_name(&game_data.world_name, &self.options.fallback_name);
        let folder = self.options.output_dir.join(&name);
        let dimension = Dimension::from_id(game_data.dimension).unwrap_or_default();
        if let Err(e) = self.session.open(
            &name,
            folder,
            dimension,
            self.options.deferred,
            &mut |_, _| {},
        ) {
            tracing::error!("opening world {name:?}: {e}");
        }
    }

    /// Apply one relayed packet to the world state.
    ///
    /// A body that fails to decode is logged and skipped; capture is
    /// best-effort and never ends the session.
    pub fn handle_packet(&self, packet: &Packet, direction: Direction) {
        match packet.id() {
            id::LEVEL_CHUNK if direction.to_client() => {
                if let Some(chunk) = decode::<LevelChunk>(packet) {
                    self.session.handle_level_chunk(&chunk);
                }
            }
            id::ADD_ACTOR if direction.to_client() => {
                if let Some(actor) = decode::<AddActor>(packet) {
                    self.session.handle_add_actor(&actor);
                }
            }
            id::SET_ACTOR_LINK if direction.to_client() => {
                if let Some(link) = decode::<SetActorLink>(packet) {
                    self.session.handle_entity_link(&link.link);
                }
            }
            id::SET_TIME if direction.to_client() => {
                if let Some(time) = decode::<SetTime>(packet) {
                    self.session.set_time(time.time.into());
                }
            }
            id::MOVE_PLAYER => {
                if let Some(movement) = decode::<MovePlayer>(packet)
                    && self.is_own_player(movement.entity_runtime_id)
                {
                    self.session
                        .set_player_position(BlockPos::from_vec(movement.position));
                }
            }
            id::GAME_RULES_CHANGED if direction.to_client() => {
                if let Some(changed) = decode::<GameRulesChanged>(packet) {
                    self.merge_game_rules(changed);
                }
            }
            _ => {}
        }
    }

    fn is_own_player(&self, runtime_id: u64) -> bool {
        self.tracked
            .lock()
            .unwrap()
            .game_data
            .as_ref()
            .is_some_and(|gd| gd.entity_runtime_id == runtime_id)
    }

    fn merge_game_rules(&self, changed: GameRulesChanged) {
        let mut tracked = self.tracked.lock().unwrap();
        let Some(gd) = tracked.game_data.as_mut() else {
            return;
        };
        for rule in changed.game_rules {
            match gd.game_rules.iter_mut().find(|r| r.name == rule.name) {
                Some(existing) => existing.value = rule.value,
                None => gd.game_rules.push(rule),
            }
        }
    }

    /// Commit anything still buffered and finalize the world.
    ///
    /// Returns `Ok(None)` when no world was ever opened.
    pub fn finish(&self) -> Result<Option<FinalizeReport>, WorldError> {
        let Some(game_data) = self.game_data() else {
            return Ok(None);
        };
        let store = self.session.store();
        if !store.is_open() {
            return Ok(None);
        }
        if !store.is_capturing() {
            self.session
                .resume_capture(self.options.resume_radius, &mut |_, _| {})?;
        }

        let position = self.session.player_position();
        let spawn = BlockPos::from(game_data.world_spawn);
        let report = self.session.finish(FinishParams {
            player_data: player_data(&game_data, position),
            spawn,
            game_data: &game_data,
            has_pack_content: false,
        })?;
        Ok(Some(report))
    }
}

fn decode<B: Body>(packet: &Packet) -> Option<B> {
    match packet.decode() {
        Ok(body) => Some(body),
        Err(e) => {
            tracing::warn!("{HANDLER_NAME}: skipping {}: {e}", packet.name());
            None
        }
    }
}

fn player_data(game_data: &GameData, position: BlockPos) -> Compound {
    let mut data = Compound::new();
    data.insert("UniqueID".into(), Tag::from(game_data.entity_unique_id));
    data.insert("DimensionId".into(), Tag::from(game_data.dimension));
    data.insert(
        "Pos".into(),
        Tag::List(vec![
            Tag::from(position.x as f32),
            Tag::from(position.y as f32),
            Tag::from(position.z as f32),
        ]),
    );
    data
}

/// Folder-safe world name: colour codes removed, path separators and other
/// unsafe characters replaced.
pub fn world_folder_name(world_name: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(world_name.len());
    let mut chars = world_name.chars();
    while let Some(c) = chars.next() {
        match c {
            // Formatting code: the marker and the following character.
            '§' => {
                chars.next();
            }
            c if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') => out.push(c),
            _ => out.push('_'),
        }
    }
    let trimmed = out.trim().trim_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// The pipeline handler wrapping `capture`. Its cleanup finishes the world.
pub fn capture_handler(capture: Arc<WorldCapture>) -> PacketHandler {
    let on_data = Arc::clone(&capture);
    let on_end = Arc::clone(&capture);
    PacketHandler::new(HANDLER_NAME)
        .on_game_data(move |gd: &mut GameData| on_data.on_game_data(gd))
        .on_packet(move |packet: Packet, direction, _, _| {
            capture.handle_packet(&packet, direction);
            Ok(Some(packet))
        })
        .deferred(move || match on_end.finish() {
            Ok(Some(report)) => tracing::info!(
                "saved world with {} entities in {} chunks",
                report.entities,
                report.batches
            ),
            Ok(None) => tracing::info!("no world was captured"),
            Err(e) => tracing::error!("saving world failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use relay_proto::{EntityLink, EntityLinkKind, GameRule, GameRuleValue};
    use relay_proxy::Pipeline;
    use relay_world::{ChunkPos, DiskOpener, DiskProvider, MemoryOpener, WorldProvider};

    fn options(dir: &std::path::Path) -> CaptureOptions {
        CaptureOptions {
            output_dir: dir.to_path_buf(),
            deferred: false,
            resume_radius: -1,
            fallback_name: "world".into(),
        }
    }

    fn game_data() -> GameData {
        GameData {
            world_name: "§aSky§r Wars".into(),
            world_seed: 9,
            entity_runtime_id: 1,
            entity_unique_id: -1,
            time: 6000,
            world_spawn: [0, 64, 0],
            game_rules: vec![GameRule::new("dodaylightcycle", GameRuleValue::Bool(true))],
            ..Default::default()
        }
    }

    fn chunk(x: i32, z: i32) -> Packet {
        Packet::encode(&LevelChunk {
            chunk_x: x,
            chunk_z: z,
            dimension: 0,
            sub_chunks: vec![vec![vec![1; 16]]],
            block_entities: vec![],
        })
        .unwrap()
    }

    fn actor(unique_id: i64, x: f32) -> Packet {
        Packet::encode(&AddActor {
            entity_unique_id: unique_id,
            entity_runtime_id: unique_id as u64 + 100,
            entity_type: "minecraft:pig".into(),
            position: [x, 64.0, 0.0],
            velocity: [0.0; 3],
            rotation: [0.0; 3],
            metadata: Compound::new(),
            links: vec![],
        })
        .unwrap()
    }

    #[test]
    fn test_folder_name_strips_codes_and_separators() {
        assert_eq!(world_folder_name("§aSky§r Wars", "w"), "Sky Wars");
        assert_eq!(world_folder_name("../etc/passwd", "w"), "_etc_passwd");
        assert_eq!(world_folder_name("§l", "fallback"), "fallback");
    }

    #[test]
    fn test_captures_session_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(WorldCapture::new(
            Arc::new(DiskOpener),
            WorldSessionOptions::default(),
            options(dir.path()),
        ));
        let mut pipeline = Pipeline::new();
        pipeline.register(capture_handler(Arc::clone(&capture)));

        let mut gd = game_data();
        pipeline.modify_game_data(&mut gd);
        let now = Instant::now();
        for packet in [
            chunk(0, 0),
            chunk(2, 0),
            actor(5, 8.0),
            Packet::encode(&SetActorLink {
                link: EntityLink::new(5, 6, EntityLinkKind::Rider),
            })
            .unwrap(),
            Packet::encode(&GameRulesChanged {
                game_rules: vec![GameRule::new("pvp", GameRuleValue::Bool(false))],
            })
            .unwrap(),
        ] {
            let out = pipeline
                .process(packet, Direction::ServerToClient, now, false)
                .unwrap();
            assert!(out.is_some());
        }
        let movement = MovePlayer {
            entity_runtime_id: 1,
            position: [40.0, 70.0, 8.0],
            pitch: 0.0,
            yaw: 0.0,
            head_yaw: 0.0,
            on_ground: true,
        };
        pipeline
            .process(
                Packet::encode(&movement).unwrap(),
                Direction::ClientToServer,
                now,
                false,
            )
            .unwrap();
        assert_eq!(capture.session().player_position(), BlockPos::new(40, 70, 8));
        assert_eq!(capture.game_data().unwrap().game_rules.len(), 2);

        pipeline.teardown();

        let folder = dir.path().join("Sky Wars");
        let provider = DiskProvider::open(&folder, relay_world::Compression::Lz4).unwrap();
        assert!(
            provider
                .load_column(ChunkPos::new(2, 0), Dimension::Overworld)
                .unwrap()
                .is_some()
        );
        let pigs = provider
            .load_entities(ChunkPos::new(0, 0), Dimension::Overworld)
            .unwrap();
        assert_eq!(pigs.len(), 1);
        assert_eq!(pigs[0].links, vec![6]);
        assert!(!provider.level_dat().pvp);
        assert_eq!(provider.settings().spawn, BlockPos::new(0, 64, 0));
        assert!(!capture.session().store().is_open());
    }

    #[test]
    fn test_deferred_capture_keeps_only_chunks_near_player() {
        let dir = tempfile::tempdir().unwrap();
        let opener = MemoryOpener::default();
        let world = opener.world.clone();
        let capture = WorldCapture::new(
            Arc::new(opener),
            WorldSessionOptions::default(),
            CaptureOptions {
                deferred: true,
                resume_radius: 2,
                ..options(dir.path())
            },
        );
        capture.on_game_data(&game_data());
        capture.handle_packet(&chunk(0, 0), Direction::ServerToClient);
        capture.handle_packet(&chunk(50, 50), Direction::ServerToClient);
        assert!(!capture.session().store().is_capturing());

        let report = capture.finish().unwrap();
        assert!(report.is_some());
        let state = world.state();
        assert!(state.closed);
        assert!(
            state
                .columns
                .keys()
                .any(|(_, pos)| *pos == ChunkPos::new(0, 0))
        );
        assert!(
            !state
                .columns
                .keys()
                .any(|(_, pos)| *pos == ChunkPos::new(50, 50))
        );
    }

    #[test]
    fn test_undecodable_packets_are_skipped_and_relayed() {
        let dir = tempfile::tempdir().unwrap();
        let opener = MemoryOpener::default();
        let world = opener.world.clone();
        let capture = Arc::new(WorldCapture::new(
            Arc::new(opener),
            WorldSessionOptions::default(),
            options(dir.path()),
        ));
        let mut pipeline = Pipeline::new();
        pipeline.register(capture_handler(Arc::clone(&capture)));
        pipeline.modify_game_data(&mut game_data());

        let now = Instant::now();
        for packet_id in [id::LEVEL_CHUNK, id::ADD_ACTOR, id::SET_ACTOR_LINK] {
            let garbage = Packet::new(packet_id, vec![0xff; 3]);
            let out = pipeline
                .process(garbage, Direction::ServerToClient, now, false)
                .unwrap();
            assert_eq!(out.map(|p| p.id()), Some(packet_id));
        }
        pipeline
            .process(chunk(1, 1), Direction::ServerToClient, now, false)
            .unwrap();

        assert!(
            world
                .state()
                .columns
                .contains_key(&(Dimension::Overworld, ChunkPos::new(1, 1)))
        );
        assert_eq!(world.state().columns.len(), 1);
    }

    #[test]
    fn test_finish_without_world_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let capture = WorldCapture::new(
            Arc::new(MemoryOpener::default()),
            WorldSessionOptions::default(),
            options(dir.path()),
        );
        assert!(capture.finish().unwrap().is_none());
    }
}
