//! Server-facing dialer.
//!
//! Dialing is split in two stages so a proxy can connect the socket before it
//! knows who the client is: [`Dialer::connect`] opens the transport and
//! returns a [`PendingConn`]; [`PendingConn::login`] sends the login payload
//! and waits for the server's start-game data.

use std::sync::Arc;

use tokio::net::{TcpStream, ToSocketAddrs};

use crate::compression::CompressionConfig;
use crate::conn::{Conn, ConnOptions, PacketFunc};
use crate::error::ProtoError;
use crate::framing::FrameConfig;
use crate::messages::{
    Disconnect, Login, PackEntry, PlayStatus, PlayStatusKind, ResourcePackStack,
    ResourcePacksInfo, StartGame,
};
use crate::packet::id;
use crate::types::{Chain, ClientData};

/// Dial settings and resource-pack callbacks.
#[derive(Clone, Default)]
pub struct Dialer {
    pub packet_func: Option<PacketFunc>,
    /// Called when the server starts offering packs.
    pub on_resource_packs_info: Option<Arc<dyn Fn(&ResourcePacksInfo) + Send + Sync>>,
    /// Called once per pack in the final stack.
    pub on_finished_pack: Option<Arc<dyn Fn(&PackEntry) + Send + Sync>>,
    pub frame: FrameConfig,
    pub compression: CompressionConfig,
}

impl Dialer {
    /// Open the transport to `addr`. No packets are exchanged yet.
    pub async fn connect(&self, addr: impl ToSocketAddrs) -> Result<PendingConn, ProtoError> {
        let stream = TcpStream::connect(addr).await?;
        let conn = Conn::new(
            stream,
            ConnOptions {
                frame: self.frame.clone(),
                compression: self.compression.clone(),
                packet_func: self.packet_func.clone(),
            },
        )?;
        tracing::debug!("transport to {} open", conn.remote_addr());
        Ok(PendingConn {
            conn,
            dialer: self.clone(),
        })
    }
}

/// A connected transport that has not logged in yet.
pub struct PendingConn {
    conn: Conn,
    dialer: Dialer,
}

impl PendingConn {
    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    /// Send the login packet without waiting for a reply.
    pub async fn send_login(&self, client_data: ClientData, chain: Chain) -> Result<(), ProtoError> {
        self.conn.write_body(&Login { client_data, chain }).await
    }

    /// Log in and wait until the server sends start-game data.
    pub async fn login(self, client_data: ClientData, chain: Chain) -> Result<Conn, ProtoError> {
        self.conn.set_client_data(client_data.clone());
        self.send_login(client_data, chain).await?;

        loop {
            let packet = self.conn.read_packet().await?;
            match packet.id() {
                id::PLAY_STATUS => {
                    let status: PlayStatus = packet.decode()?;
                    match status.status {
                        PlayStatusKind::LoginSuccess | PlayStatusKind::PlayerSpawn => {}
                        other => return Err(ProtoError::LoginRejected(other)),
                    }
                }
                id::RESOURCE_PACKS_INFO => {
                    let info: ResourcePacksInfo = packet.decode()?;
                    if let Some(cb) = &self.dialer.on_resource_packs_info {
                        cb(&info);
                    }
                }
                id::RESOURCE_PACK_STACK => {
                    let stack: ResourcePackStack = packet.decode()?;
                    if let Some(cb) = &self.dialer.on_finished_pack {
                        for pack in stack.behaviour_packs.iter().chain(&stack.texture_packs) {
                            cb(pack);
                        }
                    }
                }
                id::DISCONNECT => {
                    let reason: Disconnect = packet.decode()?;
                    return Err(ProtoError::Disconnected(reason.message));
                }
                id::START_GAME => {
                    let start: StartGame = packet.decode()?;
                    self.conn.set_game_data(start.game_data);
                    return Ok(self.conn);
                }
                other => {
                    tracing::trace!("ignoring {} during login", crate::packet_name(other));
                }
            }
        }
    }
}
