//! Client-facing listener.
//!
//! [`Listener::accept`] waits for a TCP connection, runs the login handshake,
//! and hands back a [`Conn`] whose client data is known. Two callbacks fire
//! along the way so a proxy can start dialing the real server early:
//! `early_conn_handler` as soon as the socket is accepted, `on_client_data`
//! once the login packet is decoded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;

use crate::compression::CompressionConfig;
use crate::conn::{Conn, ConnOptions, PacketFunc};
use crate::error::ProtoError;
use crate::framing::FrameConfig;
use crate::messages::{Login, PlayStatus, PlayStatusKind};
use crate::types::ClientData;

/// Builder for a [`Listener`].
#[derive(Clone, Default)]
pub struct ListenConfig {
    /// Name shown in the client's server list.
    pub server_name: String,
    /// Raw hook applied to every accepted connection.
    pub packet_func: Option<PacketFunc>,
    /// Called with the client's identity once its login is decoded.
    pub on_client_data: Option<Arc<dyn Fn(&ClientData) + Send + Sync>>,
    /// Called with the peer address as soon as the socket is accepted.
    pub early_conn_handler: Option<Arc<dyn Fn(SocketAddr) + Send + Sync>>,
    pub frame: FrameConfig,
    pub compression: CompressionConfig,
}

impl ListenConfig {
    /// Bind and start listening.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<Listener> {
        let inner = TcpListener::bind(addr).await?;
        let (closed_tx, _) = watch::channel(false);
        tracing::debug!(
            "{} listening on {}",
            self.server_name,
            inner.local_addr()?
        );
        Ok(Listener {
            inner,
            config: self,
            closed_tx,
            close_calls: AtomicUsize::new(0),
        })
    }
}

/// Accepts client connections until closed.
pub struct Listener {
    inner: TcpListener,
    config: ListenConfig,
    closed_tx: watch::Sender<bool>,
    close_calls: AtomicUsize,
}

impl Listener {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept one client and complete its login.
    ///
    /// Returns [`ProtoError::ListenerClosed`] if [`Listener::close`] is called
    /// before or during the accept.
    pub async fn accept(&self) -> Result<Conn, ProtoError> {
        let mut closed = self.closed_tx.subscribe();
        if *closed.borrow() {
            return Err(ProtoError::ListenerClosed);
        }

        let (stream, peer) = tokio::select! {
            result = self.inner.accept() => result?,
            _ = closed.wait_for(|c| *c) => return Err(ProtoError::ListenerClosed),
        };
        tracing::debug!("accepted socket from {peer}");
        if let Some(handler) = &self.config.early_conn_handler {
            handler(peer);
        }

        let conn = Conn::new(
            stream,
            ConnOptions {
                frame: self.config.frame.clone(),
                compression: self.config.compression.clone(),
                packet_func: self.config.packet_func.clone(),
            },
        )?;

        let first = tokio::select! {
            result = conn.read_packet() => result?,
            _ = closed.wait_for(|c| *c) => return Err(ProtoError::ListenerClosed),
        };
        let login: Login = first.decode()?;
        if let Some(cb) = &self.config.on_client_data {
            cb(&login.client_data);
        }
        conn.set_client_data(login.client_data);
        conn.write_body(&PlayStatus {
            status: PlayStatusKind::LoginSuccess,
        })
        .await?;
        Ok(conn)
    }

    /// Stop accepting. Wakes any pending [`Listener::accept`].
    ///
    /// Returns `false` if the listener was already closed.
    pub fn close(&self) -> bool {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        !self.closed_tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// How many times [`Listener::close`] has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::dialer::Dialer;
    use crate::types::Chain;

    #[tokio::test]
    async fn test_close_unblocks_pending_accept() {
        let listener = Arc::new(
            ListenConfig::default()
                .listen("127.0.0.1:0")
                .await
                .unwrap(),
        );
        let l = Arc::clone(&listener);
        let task = tokio::spawn(async move { l.accept().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(listener.close());
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("accept should return after close")
            .unwrap();
        assert!(matches!(result, Err(ProtoError::ListenerClosed)));
    }

    #[tokio::test]
    async fn test_second_close_reports_already_closed() {
        let listener = ListenConfig::default().listen("127.0.0.1:0").await.unwrap();
        assert!(listener.close());
        assert!(!listener.close());
        assert_eq!(listener.close_calls(), 2);
        assert!(matches!(
            listener.accept().await,
            Err(ProtoError::ListenerClosed)
        ));
    }

    #[tokio::test]
    async fn test_callbacks_fire_in_handshake_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let early = Arc::clone(&order);
        let data = Arc::clone(&order);
        let config = ListenConfig {
            early_conn_handler: Some(Arc::new(move |_: SocketAddr| {
                early.lock().unwrap().push("early".to_string());
            })),
            on_client_data: Some(Arc::new(move |cd: &ClientData| {
                data.lock().unwrap().push(cd.display_name.clone());
            })),
            ..Default::default()
        };
        let listener = config.listen("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let pending = Dialer::default().connect(addr).await.unwrap();
            let client_data = ClientData {
                display_name: "Steve".into(),
                ..Default::default()
            };
            pending.send_login(client_data, Chain::default()).await.unwrap();
            pending
        });

        let conn = listener.accept().await.unwrap();
        assert_eq!(conn.client_data().unwrap().display_name, "Steve");
        assert_eq!(*order.lock().unwrap(), vec!["early", "Steve"]);
        client.await.unwrap();
    }
}
