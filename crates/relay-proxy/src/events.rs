//! Session lifecycle events and the observers that receive them.
//!
//! Events are delivered through an [`EventSink`], which serializes emission so
//! observers see them in the order the session produced them even when the
//! two connection tasks emit concurrently.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// A step in a session's lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The client-facing listener is bound.
    Listening { addr: SocketAddr },
    /// A client socket was accepted.
    ClientConnecting,
    /// Dialing the real server has started.
    ServerConnecting { address: String },
    /// The server started sending resource packs.
    ReceivingResources,
    /// One pack of the final stack is in place.
    FinishedPack { name: String },
    /// Both legs are connected and packets are flowing.
    Established,
    /// A newer release exists. Only emitted when an updater supplies one.
    UpdateAvailable { version: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { addr } => write!(f, "listening on {addr}"),
            Event::ClientConnecting => write!(f, "client connecting"),
            Event::ServerConnecting { address } => write!(f, "connecting to {address}"),
            Event::ReceivingResources => write!(f, "receiving resource packs"),
            Event::FinishedPack { name } => write!(f, "finished pack {name}"),
            Event::Established => write!(f, "connection established"),
            Event::UpdateAvailable { version } => write!(f, "update available: {version}"),
        }
    }
}

/// Receives lifecycle events. Must not block.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Headless observer that writes events to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&self, event: &Event) {
        tracing::info!("{event}");
    }
}

/// Forwards events over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Observer for ChannelObserver {
    fn on_event(&self, event: &Event) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}

/// Ordered fan-out to the session's observers.
#[derive(Clone, Default)]
pub struct EventSink {
    observers: Arc<Mutex<Vec<Arc<dyn Observer>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Deliver `event` to every observer. Concurrent emitters are serialized.
    pub fn emit(&self, event: Event) {
        let observers = self.observers.lock().unwrap();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }
}
