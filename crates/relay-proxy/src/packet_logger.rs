//! Debug packet logger.
//!
//! Logs the direction, id and name of every packet not in [`MUTED_PACKETS`].
//! With `extra_debug` it also mirrors a dump of every packet into two files
//! in the log directory: `packets.log` in plain text and `packets.log.enc`
//! encrypted with ChaCha20 under a key derived from a passphrase. The file
//! starts with the 12-byte nonce.
//!
//! Both files are optional. A file that cannot be opened is skipped with a
//! warning and never affects packet delivery.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use relay_proto::{Packet, id};
use sha2::{Digest, Sha256};

use crate::pipeline::{Direction, PacketHandler};

/// High-frequency packets kept out of the debug log. They are still
/// delivered and still written to the dump files.
pub const MUTED_PACKETS: [u32; 25] = [
    id::UPDATE_BLOCK,
    id::MOVE_ACTOR_ABSOLUTE,
    id::SET_ACTOR_MOTION,
    id::SET_TIME,
    id::REMOVE_ACTOR,
    id::ADD_ACTOR,
    id::UPDATE_ATTRIBUTES,
    id::INTERACT,
    id::LEVEL_EVENT,
    id::SET_ACTOR_DATA,
    id::MOVE_ACTOR_DELTA,
    id::MOVE_PLAYER,
    id::BLOCK_ACTOR_DATA,
    id::PLAYER_AUTH_INPUT,
    id::LEVEL_CHUNK,
    id::LEVEL_SOUND_EVENT,
    id::ACTOR_EVENT,
    id::NETWORK_CHUNK_PUBLISHER_UPDATE,
    id::UPDATE_SUB_CHUNK_BLOCKS,
    id::SUB_CHUNK,
    id::SUB_CHUNK_REQUEST,
    id::ANIMATE,
    id::NETWORK_STACK_LATENCY,
    id::INVENTORY_TRANSACTION,
    id::PLAY_SOUND,
];

pub const PLAIN_LOG_FILE: &str = "packets.log";
pub const ENCRYPTED_LOG_FILE: &str = "packets.log.enc";

const NONCE_LEN: usize = 12;

pub fn is_muted(packet_id: u32) -> bool {
    MUTED_PACKETS.contains(&packet_id)
}

/// Packet logger settings.
#[derive(Clone, Debug, Default)]
pub struct PacketLoggerConfig {
    /// Mirror packet dumps into the log files.
    pub extra_debug: bool,
    /// Directory the dump files are created in.
    pub log_dir: PathBuf,
    /// Passphrase for the encrypted dump. Empty disables that file.
    pub passphrase: String,
}

/// A writer that encrypts everything passing through it with ChaCha20.
pub struct EncryptedWriter<W: Write> {
    inner: W,
    cipher: ChaCha20,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptedWriter<W> {
    /// Write a fresh random nonce to `inner` and start the keystream.
    pub fn new(mut inner: W, passphrase: &str) -> io::Result<Self> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        inner.write_all(&nonce)?;
        let key = Sha256::digest(passphrase.as_bytes());
        Ok(Self {
            inner,
            cipher: ChaCha20::new(&key, &nonce.into()),
            scratch: Vec::new(),
        })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // All-or-nothing so the keystream never runs ahead of the file.
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypt a dump produced by [`EncryptedWriter`].
pub fn decrypt_dump(data: &[u8], passphrase: &str) -> Option<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return None;
    }
    let (nonce, body) = data.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce.try_into().ok()?;
    let key = Sha256::digest(passphrase.as_bytes());
    let mut out = body.to_vec();
    ChaCha20::new(&key, &nonce.into()).apply_keystream(&mut out);
    Some(out)
}

#[derive(Default)]
struct Sinks {
    plain: Option<BufWriter<File>>,
    encrypted: Option<EncryptedWriter<BufWriter<File>>>,
}

impl Sinks {
    fn open(config: &PacketLoggerConfig) -> Self {
        let plain = match File::create(config.log_dir.join(PLAIN_LOG_FILE)) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                tracing::warn!("packet dump {PLAIN_LOG_FILE} disabled: {e}");
                None
            }
        };
        let encrypted = if config.passphrase.is_empty() {
            tracing::warn!("packet dump {ENCRYPTED_LOG_FILE} disabled: no passphrase set");
            None
        } else {
            match open_encrypted(&config.log_dir.join(ENCRYPTED_LOG_FILE), &config.passphrase) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    tracing::warn!("packet dump {ENCRYPTED_LOG_FILE} disabled: {e}");
                    None
                }
            }
        };
        Self { plain, encrypted }
    }

    fn is_empty(&self) -> bool {
        self.plain.is_none() && self.encrypted.is_none()
    }

    fn write(&mut self, text: &str) {
        if let Some(plain) = &mut self.plain {
            if let Err(e) = plain.write_all(text.as_bytes()) {
                tracing::trace!("plain packet dump write failed: {e}");
            }
        }
        if let Some(enc) = &mut self.encrypted {
            if let Err(e) = enc.write_all(text.as_bytes()) {
                tracing::trace!("encrypted packet dump write failed: {e}");
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut plain) = self.plain.take() {
            if let Err(e) = plain.flush() {
                tracing::warn!("flushing {PLAIN_LOG_FILE} failed: {e}");
            }
        }
        if let Some(mut enc) = self.encrypted.take() {
            if let Err(e) = enc.flush() {
                tracing::warn!("flushing {ENCRYPTED_LOG_FILE} failed: {e}");
            }
        }
    }
}

fn open_encrypted(
    path: &Path,
    passphrase: &str,
) -> io::Result<EncryptedWriter<BufWriter<File>>> {
    EncryptedWriter::new(BufWriter::new(File::create(path)?), passphrase)
}

/// Text dump of one packet: a header line, hex rows, and a blank gap.
pub fn dump_packet(packet: &Packet, direction: Direction) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{direction} 0x{:02x} {} ({} bytes)",
        packet.id(),
        packet.name(),
        packet.body.len()
    );
    for (row, chunk) in packet.body.chunks(16).enumerate() {
        let _ = write!(out, "{:08x} ", row * 16);
        for byte in chunk {
            let _ = write!(out, " {byte:02x}");
        }
        out.push('\n');
    }
    out.push_str("\n\n");
    out
}

/// Build the debug logger handler.
pub fn packet_logger(config: &PacketLoggerConfig) -> PacketHandler {
    let sinks = if config.extra_debug {
        let sinks = Sinks::open(config);
        (!sinks.is_empty()).then(|| Arc::new(Mutex::new(sinks)))
    } else {
        None
    };

    let dump = sinks.clone();
    let handler = PacketHandler::new("Debug").on_packet(move |packet: Packet, dir, _, _| {
        if let Some(sinks) = &dump {
            sinks.lock().unwrap().write(&dump_packet(&packet, dir));
        }
        if !is_muted(packet.id()) {
            tracing::debug!("{dir} 0x{:02x}, {}", packet.id(), packet.name());
        }
        Ok(Some(packet))
    });

    match sinks {
        Some(sinks) => handler.deferred(move || sinks.lock().unwrap().close()),
        None => handler,
    }
}
