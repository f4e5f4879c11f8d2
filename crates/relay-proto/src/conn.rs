//! A framed, compressed packet connection over TCP.
//!
//! [`Conn`] is shared between the proxy's two relay loops, so both halves of
//! the socket sit behind async mutexes and every method takes `&self`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::compression::{CompressionConfig, compress_payload, decompress_payload};
use crate::error::ProtoError;
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{Body, Disconnect, StartGame};
use crate::packet::{Packet, PacketHeader};
use crate::types::{ClientData, GameData};

/// Raw packet hook: `(header, body, src, dst)`, called for every packet read
/// or written before any typed decoding happens.
pub type PacketFunc = Arc<dyn Fn(&PacketHeader, &[u8], SocketAddr, SocketAddr) + Send + Sync>;

/// Settings shared by listeners and dialers for the connections they create.
#[derive(Clone, Default)]
pub(crate) struct ConnOptions {
    pub frame: FrameConfig,
    pub compression: CompressionConfig,
    pub packet_func: Option<PacketFunc>,
}

/// One side of a relay connection.
pub struct Conn {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    options: ConnOptions,
    client_data: OnceLock<ClientData>,
    game_data: OnceLock<GameData>,
    closed: AtomicBool,
}

impl Conn {
    pub(crate) fn new(stream: TcpStream, options: ConnOptions) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            local_addr,
            remote_addr,
            options,
            client_data: OnceLock::new(),
            game_data: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Read the next packet. Blocks until a full frame arrives.
    ///
    /// Returns [`ProtoError::Closed`] once the peer hangs up.
    pub async fn read_packet(&self) -> Result<Packet, ProtoError> {
        let frame = {
            let mut reader = self.reader.lock().await;
            match read_frame(&mut *reader, &self.options.frame).await {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => return Err(ProtoError::Closed),
                Err(e) => return Err(e.into()),
            }
        };
        let data = decompress_payload(&frame)?;
        let packet = Packet::from_bytes(&data)?;
        if let Some(hook) = &self.options.packet_func {
            hook(&packet.header, &packet.body, self.remote_addr, self.local_addr);
        }
        Ok(packet)
    }

    /// Write one packet and flush.
    pub async fn write_packet(&self, packet: &Packet) -> Result<(), ProtoError> {
        if self.is_closed() {
            return Err(ProtoError::Closed);
        }
        if let Some(hook) = &self.options.packet_func {
            hook(&packet.header, &packet.body, self.local_addr, self.remote_addr);
        }
        let payload = compress_payload(&packet.to_bytes()?, &self.options.compression);
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &payload, &self.options.frame).await?;
        Ok(())
    }

    /// Encode and write a typed body.
    pub async fn write_body<B: Body>(&self, body: &B) -> Result<(), ProtoError> {
        self.write_packet(&Packet::encode(body)?).await
    }

    /// Send the start-game payload to a client and remember it.
    pub async fn start_game(&self, game_data: GameData) -> Result<(), ProtoError> {
        self.write_body(&StartGame {
            game_data: game_data.clone(),
        })
        .await?;
        let _ = self.game_data.set(game_data);
        Ok(())
    }

    /// Tell the peer why we are leaving, then close.
    pub async fn disconnect(&self, message: impl Into<String>) {
        let _ = self
            .write_body(&Disconnect {
                message: message.into(),
            })
            .await;
        self.close().await;
    }

    /// Shut down the write half. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::trace!("shutdown of {} failed: {e}", self.remote_addr);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Identity the client presented at login (client-facing connections).
    pub fn client_data(&self) -> Option<&ClientData> {
        self.client_data.get()
    }

    /// Start-game data (server-facing connections, or clients after
    /// [`Conn::start_game`]).
    pub fn game_data(&self) -> Option<&GameData> {
        self.game_data.get()
    }

    pub(crate) fn set_client_data(&self, data: ClientData) {
        let _ = self.client_data.set(data);
    }

    pub(crate) fn set_game_data(&self, data: GameData) {
        let _ = self.game_data.set(data);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    use crate::messages::SetTime;
    use crate::packet::id;

    async fn pair(options: ConnOptions) -> (Conn, Conn) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let a = Conn::new(client.unwrap(), options.clone()).unwrap();
        let b = Conn::new(accepted.unwrap().0, options).unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_packets_cross_the_socket() {
        let (a, b) = pair(ConnOptions::default()).await;
        a.write_body(&SetTime { time: 42 }).await.unwrap();
        a.write_packet(&Packet::new(0x3f0, vec![1, 2, 3])).await.unwrap();

        let first = b.read_packet().await.unwrap();
        assert_eq!(first.decode::<SetTime>().unwrap().time, 42);
        let second = b.read_packet().await.unwrap();
        assert_eq!(second.id(), 0x3f0);
        assert_eq!(second.body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_packet_func_sees_reads_and_writes() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let options = ConnOptions {
            packet_func: Some(Arc::new(
                move |header: &PacketHeader, _: &[u8], _: SocketAddr, _: SocketAddr| {
                    assert_eq!(header.packet_id, id::SET_TIME);
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            )),
            ..Default::default()
        };
        let (a, b) = pair(options).await;
        a.write_body(&SetTime { time: 1 }).await.unwrap();
        b.read_packet().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_reads_as_closed_on_peer() {
        let (a, b) = pair(ConnOptions::default()).await;
        a.close().await;
        a.close().await;
        assert!(a.is_closed());
        assert!(matches!(b.read_packet().await, Err(ProtoError::Closed)));
        assert!(matches!(
            a.write_body(&SetTime { time: 0 }).await,
            Err(ProtoError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_start_game_records_game_data() {
        let (a, b) = pair(ConnOptions::default()).await;
        let data = GameData {
            world_name: "Skyblock".into(),
            time: 9000,
            ..Default::default()
        };
        a.start_game(data.clone()).await.unwrap();
        assert_eq!(a.game_data(), Some(&data));
        let got: StartGame = b.read_packet().await.unwrap().decode().unwrap();
        assert_eq!(got.game_data, data);
    }
}
