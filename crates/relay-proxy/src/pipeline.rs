//! Ordered packet interception.
//!
//! Every packet crossing the proxy runs through each registered
//! [`PacketHandler`] in registration order. A handler may rewrite the packet,
//! drop it by returning `None` (later handlers never see it and it is not
//! forwarded), or fail, which ends the session.

use std::fmt;
use std::time::Instant;

use relay_proto::{GameData, Packet};

use crate::error::HandlerError;

/// Which way a packet is travelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    /// Whether the packet was sent by the server.
    pub fn to_client(self) -> bool {
        self == Direction::ServerToClient
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::ClientToServer => "C->S",
            Direction::ServerToClient => "S->C",
        })
    }
}

/// Per-packet callback: `(packet, direction, received_at, pre_login)`.
pub type PacketCallback =
    Box<dyn FnMut(Packet, Direction, Instant, bool) -> Result<Option<Packet>, HandlerError> + Send>;

/// Rewrites the server's start-game data before the client sees it.
pub type GameDataModifier = Box<dyn FnMut(&mut GameData) + Send>;

/// Cleanup run once when the session ends.
pub type Deferred = Box<dyn FnOnce() + Send>;

/// One interceptor. All hooks are optional.
pub struct PacketHandler {
    name: String,
    packet_cb: Option<PacketCallback>,
    game_data_modifier: Option<GameDataModifier>,
    deferred: Option<Deferred>,
}

impl PacketHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packet_cb: None,
            game_data_modifier: None,
            deferred: None,
        }
    }

    pub fn on_packet<F>(mut self, f: F) -> Self
    where
        F: FnMut(Packet, Direction, Instant, bool) -> Result<Option<Packet>, HandlerError>
            + Send
            + 'static,
    {
        self.packet_cb = Some(Box::new(f));
        self
    }

    pub fn on_game_data<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut GameData) + Send + 'static,
    {
        self.game_data_modifier = Some(Box::new(f));
        self
    }

    /// Register the handler's cleanup. A second call replaces the first.
    pub fn deferred<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.deferred = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PacketHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketHandler")
            .field("name", &self.name)
            .field("packet_cb", &self.packet_cb.is_some())
            .field("game_data_modifier", &self.game_data_modifier.is_some())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

/// The handler chain of one session.
#[derive(Debug, Default)]
pub struct Pipeline {
    handlers: Vec<PacketHandler>,
    torn_down: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: PacketHandler) {
        tracing::debug!("registered packet handler {}", handler.name);
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `packet` through every handler.
    ///
    /// Returns `Ok(None)` when some handler dropped it.
    pub fn process(
        &mut self,
        mut packet: Packet,
        direction: Direction,
        received_at: Instant,
        pre_login: bool,
    ) -> Result<Option<Packet>, HandlerError> {
        for handler in &mut self.handlers {
            let Some(cb) = handler.packet_cb.as_mut() else {
                continue;
            };
            match cb(packet, direction, received_at, pre_login)? {
                Some(next) => packet = next,
                None => {
                    tracing::trace!("{} dropped a {direction} packet", handler.name);
                    return Ok(None);
                }
            }
        }
        Ok(Some(packet))
    }

    /// Pass start-game data through every modifier in registration order.
    pub fn modify_game_data(&mut self, game_data: &mut GameData) {
        for handler in &mut self.handlers {
            if let Some(modify) = handler.game_data_modifier.as_mut() {
                modify(game_data);
            }
        }
    }

    /// Run every deferred cleanup. Only the first call does anything.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for handler in &mut self.handlers {
            if let Some(cleanup) = handler.deferred.take() {
                tracing::trace!("running cleanup of {}", handler.name);
                cleanup();
            }
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use relay_proto::id;

    fn packet(packet_id: u32) -> Packet {
        Packet::new(packet_id, vec![1, 2, 3])
    }

    fn recorder(name: &str, seen: Arc<Mutex<Vec<String>>>) -> PacketHandler {
        let tag = name.to_string();
        PacketHandler::new(name).on_packet(move |p, _, _, _| {
            seen.lock().unwrap().push(tag.clone());
            Ok(Some(p))
        })
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.register(recorder("a", seen.clone()));
        pipeline.register(recorder("b", seen.clone()));
        pipeline.register(recorder("c", seen.clone()));

        let out = pipeline
            .process(packet(id::TEXT), Direction::ClientToServer, Instant::now(), false)
            .unwrap();
        assert!(out.is_some());
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rewrite_is_seen_by_later_handlers() {
        let mut pipeline = Pipeline::new();
        pipeline.register(PacketHandler::new("rewrite").on_packet(|mut p: Packet, _, _, _| {
            p.body = vec![9];
            Ok(Some(p))
        }));
        let saw = Arc::new(Mutex::new(Vec::new()));
        let sink = saw.clone();
        pipeline.register(PacketHandler::new("check").on_packet(move |p: Packet, _, _, _| {
            sink.lock().unwrap().push(p.body.clone());
            Ok(Some(p))
        }));

        let out = pipeline
            .process(packet(id::TEXT), Direction::ServerToClient, Instant::now(), false)
            .unwrap()
            .unwrap();
        assert_eq!(out.body, vec![9]);
        assert_eq!(*saw.lock().unwrap(), vec![vec![9]]);
    }

    #[test]
    fn test_drop_stops_later_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.register(recorder("first", seen.clone()));
        pipeline.register(PacketHandler::new("drop").on_packet(|_, _, _, _| Ok(None)));
        pipeline.register(recorder("never", seen.clone()));

        let out = pipeline
            .process(packet(id::TEXT), Direction::ClientToServer, Instant::now(), false)
            .unwrap();
        assert!(out.is_none());
        assert_eq!(*seen.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_error_aborts_processing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.register(
            PacketHandler::new("fail")
                .on_packet(|_, _, _, _| Err(HandlerError::failed("fail", "bad packet"))),
        );
        pipeline.register(recorder("never", seen.clone()));

        let result =
            pipeline.process(packet(id::TEXT), Direction::ClientToServer, Instant::now(), false);
        assert!(matches!(result, Err(HandlerError::Failed { .. })));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_game_data_modifiers_chain() {
        let mut pipeline = Pipeline::new();
        pipeline.register(PacketHandler::new("a").on_game_data(|gd: &mut GameData| gd.time = 10));
        pipeline.register(PacketHandler::new("b").on_game_data(|gd: &mut GameData| gd.time *= 3));
        let mut gd = GameData::default();
        pipeline.modify_game_data(&mut gd);
        assert_eq!(gd.time, 30);
    }

    #[test]
    fn test_teardown_runs_each_cleanup_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut pipeline = Pipeline::new();
        for name in ["a", "b"] {
            let count = count.clone();
            pipeline.register(PacketHandler::new(name).deferred(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pipeline.teardown();
        pipeline.teardown();
        drop(pipeline);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_runs_teardown() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let mut pipeline = Pipeline::new();
            let count = count.clone();
            pipeline.register(PacketHandler::new("a").deferred(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::ServerToClient.to_string(), "S->C");
        assert_eq!(Direction::ClientToServer.to_string(), "C->S");
        assert!(Direction::ServerToClient.to_client());
    }
}
