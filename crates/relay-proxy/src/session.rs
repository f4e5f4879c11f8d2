//! Session coordination.
//!
//! [`ProxyContext::run`] brings up both legs of a proxied connection at once:
//! the client-facing listener and the server-facing dial. The dial may not
//! start until a client socket is accepted, and its login needs the client's
//! identity, so the server leg waits on two one-shot signals fired by the
//! client leg. Every wait is cancellable through the context's
//! [`Cancellation`].
//!
//! Once both legs are up the server's start-game data goes through the
//! pipeline's modifiers to the client, and two relay loops move packets
//! through the [`Pipeline`] until either side hangs up. Pipeline teardown
//! runs exactly once however the session ends.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use relay_proto::{
    ClientData, Conn, Dialer, ListenConfig, Listener, PackEntry, PacketFunc, ProtoError,
    ResourcePacksInfo,
};

use crate::credentials::{ChainSource, create_chain_with_retry};
use crate::error::ProxyError;
use crate::events::{Event, EventSink, Observer};
use crate::pipeline::{Direction, PacketHandler, Pipeline};
use crate::signal::{Cancellation, Signal};

/// Where to listen and what to dial.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub listen_address: String,
    pub server_address: String,
    /// Wait for a game client before dialing. Without one the server leg
    /// dials immediately and server packets only feed the pipeline.
    pub with_client: bool,
    pub connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:19132".into(),
            server_address: String::new(),
            with_client: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One proxied session. A context is used for a single [`ProxyContext::run`].
pub struct ProxyContext<S> {
    config: ProxyConfig,
    chains: S,
    pipeline: Mutex<Pipeline>,
    events: EventSink,
    cancel: Cancellation,
    packet_func: Option<PacketFunc>,
    client_accepted: Signal,
    client_data_ready: Signal,
    client_data: Arc<Mutex<Option<ClientData>>>,
    listener: Mutex<Option<Arc<Listener>>>,
}

impl<S: ChainSource> ProxyContext<S> {
    pub fn new(config: ProxyConfig, chains: S) -> Self {
        Self {
            config,
            chains,
            pipeline: Mutex::new(Pipeline::new()),
            events: EventSink::new(),
            cancel: Cancellation::new(),
            packet_func: None,
            client_accepted: Signal::new(),
            client_data_ready: Signal::new(),
            client_data: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    /// Raw hook seen by both legs before any decoding.
    pub fn with_packet_func(mut self, packet_func: PacketFunc) -> Self {
        self.packet_func = Some(packet_func);
        self
    }

    pub fn register(&self, handler: PacketHandler) {
        self.pipeline.lock().unwrap().register(handler);
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.events.subscribe(observer);
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Handle for cancelling the session from elsewhere.
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// The client-facing listener, once bound.
    pub fn listener(&self) -> Option<Arc<Listener>> {
        self.listener.lock().unwrap().clone()
    }

    /// Identity the client presented, once known.
    pub fn client_data(&self) -> Option<ClientData> {
        self.client_data.lock().unwrap().clone()
    }

    /// Forward an updater's result to observers.
    pub fn notify_update(&self, version: impl Into<String>) {
        self.events.emit(Event::UpdateAvailable {
            version: version.into(),
        });
    }

    /// Connect both legs and relay until the session ends.
    ///
    /// A clean hang-up by either peer is a normal end.
    pub async fn run(&self) -> Result<(), ProxyError> {
        let (client, server) = match self.connect().await {
            Ok(legs) => legs,
            Err(e) => {
                self.teardown();
                return Err(e);
            }
        };

        let result = self.relay(client.as_ref(), &server).await;
        self.teardown();
        match (&result, &client) {
            (Err(e), Some(client)) => client.disconnect(e.to_string()).await,
            (Ok(()), Some(client)) => client.close().await,
            (_, None) => {}
        }
        server.close().await;
        result
    }

    fn teardown(&self) {
        self.pipeline.lock().unwrap().teardown();
    }

    async fn connect(&self) -> Result<(Option<Conn>, Conn), ProxyError> {
        if !self.config.with_client {
            return Ok((None, self.connect_server().await?));
        }
        let (client, server) = tokio::join!(
            self.end_on_failure(self.connect_client()),
            self.end_on_failure(self.connect_server()),
        );
        match (client, server) {
            (Ok(client), Ok(server)) => Ok((Some(client), server)),
            (Err(e), Ok(server)) => {
                server.close().await;
                Err(e)
            }
            (Ok(client), Err(e)) => {
                client.close().await;
                Err(e)
            }
            // Report the failure that caused the other leg's cancellation.
            (Err(ProxyError::Cancelled(_)), Err(e)) | (Err(e), Err(_)) => Err(e),
        }
    }

    /// A failed leg cancels the session so the other leg stops waiting.
    async fn end_on_failure<T>(
        &self,
        leg: impl Future<Output = Result<T, ProxyError>>,
    ) -> Result<T, ProxyError> {
        let result = leg.await;
        if let Err(e) = &result {
            self.cancel.cancel(e.to_string());
        }
        result
    }

    /// Fail with the cancellation error if cancelled before `fut` is done.
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, ProxyError>>,
    ) -> Result<T, ProxyError> {
        tokio::select! {
            biased;
            err = self.cancel.cancelled() => Err(err),
            result = fut => result,
        }
    }

    async fn connect_client(&self) -> Result<Conn, ProxyError> {
        let events = self.events.clone();
        let accepted = self.client_accepted.clone();
        let slot = Arc::clone(&self.client_data);
        let data_ready = self.client_data_ready.clone();
        let config = ListenConfig {
            server_name: format!("{} Proxy", self.config.server_address),
            packet_func: self.packet_func.clone(),
            early_conn_handler: Some(Arc::new(move |peer: SocketAddr| {
                tracing::debug!("client connecting from {peer}");
                events.emit(Event::ClientConnecting);
                accepted.fire();
            })),
            on_client_data: Some(Arc::new(move |cd: &ClientData| {
                *slot.lock().unwrap() = Some(cd.clone());
                data_ready.fire();
            })),
            ..Default::default()
        };

        let bind_err = |source| ProxyError::Bind {
            addr: self.config.listen_address.clone(),
            source,
        };
        let listener = Arc::new(
            config
                .listen(self.config.listen_address.as_str())
                .await
                .map_err(bind_err)?,
        );
        let addr = listener.local_addr().map_err(bind_err)?;
        *self.listener.lock().unwrap() = Some(Arc::clone(&listener));
        self.events.emit(Event::Listening { addr });
        tracing::info!("listening on {addr}, connect to it from the game");

        let accept = listener.accept();
        tokio::pin!(accept);
        let result = tokio::select! {
            result = &mut accept => result,
            _ = self.cancel.cancelled() => {
                // Only reachable while no client has been accepted.
                listener.close();
                accept.await
            }
        };
        result.map_err(|e| match self.cancel.err() {
            Some(cancelled) if e.is_closed() => cancelled,
            _ => e.into(),
        })
    }

    async fn connect_server(&self) -> Result<Conn, ProxyError> {
        if self.config.with_client {
            self.cancel.wait_for(&self.client_accepted).await?;
        }

        let address = self.config.server_address.clone();
        self.events.emit(Event::ServerConnecting {
            address: address.clone(),
        });
        tracing::info!("connecting to {address}");

        let chain = self
            .cancellable(async {
                create_chain_with_retry(&self.chains)
                    .await
                    .map_err(ProxyError::from)
            })
            .await?;

        let info_events = self.events.clone();
        let pack_events = self.events.clone();
        let dialer = Dialer {
            packet_func: self.packet_func.clone(),
            on_resource_packs_info: Some(Arc::new(move |_: &ResourcePacksInfo| {
                info_events.emit(Event::ReceivingResources);
            })),
            on_finished_pack: Some(Arc::new(move |pack: &PackEntry| {
                pack_events.emit(Event::FinishedPack {
                    name: pack.name.clone(),
                });
            })),
            ..Default::default()
        };

        let pending = self
            .cancellable(async {
                match tokio::time::timeout(self.config.connect_timeout, dialer.connect(&address))
                    .await
                {
                    Ok(result) => result.map_err(|source| ProxyError::Dial {
                        addr: address.clone(),
                        source,
                    }),
                    Err(_) => Err(ProxyError::Dial {
                        addr: address.clone(),
                        source: ProtoError::Io(std::io::ErrorKind::TimedOut.into()),
                    }),
                }
            })
            .await?;

        let client_data = if self.config.with_client {
            self.cancel.wait_for(&self.client_data_ready).await?;
            self.client_data().unwrap_or_default()
        } else {
            ClientData::default()
        };

        let server = self
            .cancellable(async {
                pending
                    .login(client_data, chain)
                    .await
                    .map_err(ProxyError::from)
            })
            .await?;
        self.events.emit(Event::Established);
        tracing::debug!("connected to {address}");
        Ok(server)
    }

    async fn relay(&self, client: Option<&Conn>, server: &Conn) -> Result<(), ProxyError> {
        let mut game_data = server.game_data().cloned().unwrap_or_default();
        self.pipeline.lock().unwrap().modify_game_data(&mut game_data);

        let Some(client) = client else {
            return self
                .cancellable(self.forward(server, None, Direction::ServerToClient))
                .await;
        };
        self.cancellable(async {
            client
                .start_game(game_data)
                .await
                .map_err(ProxyError::from)
        })
        .await?;

        let loops = async {
            tokio::select! {
                result = self.forward(client, Some(server), Direction::ClientToServer) => result,
                result = self.forward(server, Some(client), Direction::ServerToClient) => result,
            }
        };
        self.cancellable(loops).await
    }

    /// Read from `from`, run the pipeline, write survivors to `to`.
    async fn forward(
        &self,
        from: &Conn,
        to: Option<&Conn>,
        direction: Direction,
    ) -> Result<(), ProxyError> {
        loop {
            let packet = match from.read_packet().await {
                Ok(packet) => packet,
                Err(e) if e.is_closed() => {
                    tracing::debug!("{direction}: {} hung up", from.remote_addr());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            // Login packets are consumed by the handshake, so nothing here
            // is pre-login.
            let processed =
                self.pipeline
                    .lock()
                    .unwrap()
                    .process(packet, direction, Instant::now(), false)?;
            let Some(packet) = processed else {
                continue;
            };
            if let Some(to) = to {
                to.write_packet(&packet).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relay_proto::{Chain, GameData, Packet, id};
    use tokio::sync::mpsc;

    use crate::credentials::StaticChain;
    use crate::error::{CredentialError, HandlerError};
    use crate::events::ChannelObserver;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct CountingChain {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ChainSource for CountingChain {
        async fn create_chain(&self) -> Result<Chain, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CredentialError::Token("expired".into()));
            }
            Ok(Chain::default())
        }
    }

    fn config(server: SocketAddr) -> ProxyConfig {
        ProxyConfig {
            listen_address: "127.0.0.1:0".into(),
            server_address: server.to_string(),
            ..Default::default()
        }
    }

    fn counting_cleanup(count: &Arc<AtomicUsize>) -> PacketHandler {
        let count = Arc::clone(count);
        PacketHandler::new("cleanup").deferred(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn listening_addr(rx: &mut mpsc::UnboundedReceiver<Event>) -> SocketAddr {
        loop {
            match rx.recv().await {
                Some(Event::Listening { addr }) => return addr,
                Some(_) => continue,
                None => panic!("event stream ended before Listening"),
            }
        }
    }

    async fn start_server() -> (SocketAddr, Listener) {
        let listener = ListenConfig::default().listen("127.0.0.1:0").await.unwrap();
        (listener.local_addr().unwrap(), listener)
    }

    async fn connect_client(addr: SocketAddr, name: &str) -> Conn {
        Dialer::default()
            .connect(addr)
            .await
            .unwrap()
            .login(
                ClientData {
                    display_name: name.into(),
                    ..Default::default()
                },
                Chain::default(),
            )
            .await
            .unwrap()
    }

    fn text(body: &[u8]) -> Packet {
        Packet::new(id::TEXT, body.to_vec())
    }

    #[tokio::test]
    async fn test_cancel_before_client_never_dials() {
        let (server_addr, _server) = start_server().await;
        let ctx = Arc::new(ProxyContext::new(config(server_addr), CountingChain::default()));
        let (observer, mut rx) = ChannelObserver::new();
        ctx.subscribe(Arc::new(observer));
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.register(counting_cleanup(&cleanups));

        let run = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };
        listening_addr(&mut rx).await;
        ctx.cancellation().cancel("user quit");

        let result = tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ProxyError::Cancelled(c)) if c == "user quit"));
        assert_eq!(ctx.chains.calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err(), "no events after Listening");
        let listener = ctx.listener().unwrap();
        assert!(listener.is_closed());
        assert_eq!(listener.close_calls(), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_relay() {
        let (server_addr, server_listener) = start_server().await;
        let server = tokio::spawn(async move {
            let conn = server_listener.accept().await.unwrap();
            let name = conn.client_data().unwrap().display_name.clone();
            conn.start_game(GameData {
                world_name: "Hive".into(),
                ..Default::default()
            })
            .await
            .unwrap();
            let ping = conn.read_packet().await.unwrap();
            conn.write_packet(&text(b"pong")).await.unwrap();
            conn.close().await;
            (name, ping)
        });

        let ctx = Arc::new(ProxyContext::new(config(server_addr), StaticChain::default()));
        let (observer, mut rx) = ChannelObserver::new();
        ctx.subscribe(Arc::new(observer));
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.register(counting_cleanup(&cleanups));
        ctx.register(PacketHandler::new("rename").on_game_data(|gd: &mut GameData| {
            gd.world_name.push_str(" (proxied)");
        }));

        let run = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };
        let proxy_addr = listening_addr(&mut rx).await;

        let client = connect_client(proxy_addr, "Steve").await;
        assert_eq!(client.game_data().unwrap().world_name, "Hive (proxied)");
        client.write_packet(&text(b"ping")).await.unwrap();
        let pong = client.read_packet().await.unwrap();
        assert_eq!(pong.body, b"pong");

        let (name, ping) = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(name, "Steve");
        assert_eq!(ping.body, b"ping");

        let result = tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap();
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.listener().unwrap().close_calls(), 0);
        assert_eq!(ctx.client_data().unwrap().display_name, "Steve");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                Event::ClientConnecting,
                Event::ServerConnecting {
                    address: server_addr.to_string()
                },
                Event::Established,
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_packet_is_not_forwarded() {
        let (server_addr, server_listener) = start_server().await;
        let server = tokio::spawn(async move {
            let conn = server_listener.accept().await.unwrap();
            conn.start_game(GameData::default()).await.unwrap();
            let first = conn.read_packet().await.unwrap();
            conn.close().await;
            first
        });

        let ctx = Arc::new(ProxyContext::new(config(server_addr), StaticChain::default()));
        let (observer, mut rx) = ChannelObserver::new();
        ctx.subscribe(Arc::new(observer));
        let later = Arc::new(AtomicUsize::new(0));
        ctx.register(PacketHandler::new("filter").on_packet(|p: Packet, _, _, _| {
            Ok((p.body != b"secret").then_some(p))
        }));
        let seen = Arc::clone(&later);
        ctx.register(PacketHandler::new("after").on_packet(move |p: Packet, _, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Some(p))
        }));

        let run = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };
        let proxy_addr = listening_addr(&mut rx).await;
        let client = connect_client(proxy_addr, "Alex").await;
        client.write_packet(&text(b"secret")).await.unwrap();
        client.write_packet(&text(b"public")).await.unwrap();

        let first = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert_eq!(first.body, b"public");
        tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap().unwrap();
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_ends_session_and_cleans_up_once() {
        let (server_addr, server_listener) = start_server().await;
        let server = tokio::spawn(async move {
            let conn = server_listener.accept().await.unwrap();
            conn.start_game(GameData::default()).await.unwrap();
            // Held open until the proxy closes it.
            let _ = conn.read_packet().await;
        });

        let ctx = Arc::new(ProxyContext::new(config(server_addr), StaticChain::default()));
        let (observer, mut rx) = ChannelObserver::new();
        ctx.subscribe(Arc::new(observer));
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.register(counting_cleanup(&cleanups));
        ctx.register(
            PacketHandler::new("strict")
                .on_packet(|_, _, _, _| Err(HandlerError::failed("strict", "unexpected packet"))),
        );

        let run = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };
        let proxy_addr = listening_addr(&mut rx).await;
        let client = connect_client(proxy_addr, "Alex").await;
        client.write_packet(&text(b"hi")).await.unwrap();

        let result = tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ProxyError::Handler(_))));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_after_accept_does_not_close_listener() {
        let (server_addr, server_listener) = start_server().await;
        let server = tokio::spawn(async move {
            let conn = server_listener.accept().await.unwrap();
            conn.start_game(GameData::default()).await.unwrap();
            let _ = conn.read_packet().await;
        });

        let ctx = Arc::new(ProxyContext::new(config(server_addr), StaticChain::default()));
        let (observer, mut rx) = ChannelObserver::new();
        ctx.subscribe(Arc::new(observer));
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.register(counting_cleanup(&cleanups));

        let run = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.run().await })
        };
        let proxy_addr = listening_addr(&mut rx).await;
        let _client = connect_client(proxy_addr, "Alex").await;
        ctx.cancellation().cancel("shutdown");

        let result = tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap();
        assert!(matches!(result, Err(ProxyError::Cancelled(_))));
        assert_eq!(ctx.listener().unwrap().close_calls(), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (server_addr, _server) = start_server().await;
        let ctx = ProxyContext::new(
            ProxyConfig {
                listen_address: taken.local_addr().unwrap().to_string(),
                ..config(server_addr)
            },
            CountingChain::default(),
        );
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.register(counting_cleanup(&cleanups));

        let result = tokio::time::timeout(TIMEOUT, ctx.run()).await.unwrap();
        assert!(matches!(result, Err(ProxyError::Bind { .. })));
        assert_eq!(ctx.chains.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_client_feeds_server_packets_to_pipeline() {
        let (server_addr, server_listener) = start_server().await;
        tokio::spawn(async move {
            let conn = server_listener.accept().await.unwrap();
            conn.start_game(GameData {
                time: 42,
                ..Default::default()
            })
            .await
            .unwrap();
            conn.write_packet(&text(b"welcome")).await.unwrap();
            conn.close().await;
        });

        let ctx = ProxyContext::new(
            ProxyConfig {
                with_client: false,
                ..config(server_addr)
            },
            StaticChain::default(),
        );
        let time = Arc::new(Mutex::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let time_slot = Arc::clone(&time);
        let seen_slot = Arc::clone(&seen);
        ctx.register(
            PacketHandler::new("capture")
                .on_game_data(move |gd: &mut GameData| *time_slot.lock().unwrap() = gd.time)
                .on_packet(move |p: Packet, dir, _, _| {
                    seen_slot.lock().unwrap().push((dir, p.body.clone()));
                    Ok(Some(p))
                }),
        );

        tokio::time::timeout(TIMEOUT, ctx.run()).await.unwrap().unwrap();
        assert!(ctx.listener().is_none());
        assert_eq!(*time.lock().unwrap(), 42);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Direction::ServerToClient, b"welcome".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_chain_failure_is_fatal_after_retries() {
        let (server_addr, _server) = start_server().await;
        let ctx = ProxyContext::new(
            ProxyConfig {
                with_client: false,
                ..config(server_addr)
            },
            CountingChain {
                fail: true,
                ..Default::default()
            },
        );
        let result = tokio::time::timeout(TIMEOUT, ctx.run()).await.unwrap();
        assert!(matches!(result, Err(ProxyError::Credentials(_))));
        assert_eq!(ctx.chains.calls.load(Ordering::SeqCst), 3);
    }
}
