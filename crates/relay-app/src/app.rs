//! Turns a loaded [`Config`] into a ready-to-run proxy session.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relay_config::Config;
use relay_proxy::{
    LogObserver, PacketLoggerConfig, ProxyConfig, ProxyContext, StaticChain, packet_logger,
};
use relay_world::{Compression, DiskOpener, WorldSessionOptions};

use crate::capture::{CaptureOptions, WorldCapture, capture_handler};
use crate::platform::AppDirs;

/// World name used when the server sends an empty one.
pub const FALLBACK_WORLD_NAME: &str = "world";

pub fn proxy_config(config: &Config, with_client: bool) -> ProxyConfig {
    ProxyConfig {
        listen_address: config.network.listen_address.clone(),
        server_address: config.network.server_address.clone(),
        with_client,
        connect_timeout: Duration::from_secs(config.network.connect_timeout_seconds),
    }
}

pub fn session_options(config: &Config) -> WorldSessionOptions {
    WorldSessionOptions {
        exclude_mobs: config.capture.exclude_mobs.clone(),
        void_gen: config.capture.void_gen,
        compression: if config.capture.compress {
            Compression::Lz4
        } else {
            Compression::None
        },
    }
}

pub fn capture_options(config: &Config, worlds_dir: &Path) -> CaptureOptions {
    CaptureOptions {
        output_dir: worlds_dir.to_path_buf(),
        deferred: config.capture.deferred,
        resume_radius: config.capture.resume_radius,
        fallback_name: FALLBACK_WORLD_NAME.to_string(),
    }
}

/// A session with the packet logger and world capture registered, in that
/// order, and lifecycle events going to the log.
pub fn build_context(
    config: &Config,
    dirs: &AppDirs,
    with_client: bool,
) -> ProxyContext<StaticChain> {
    let ctx = ProxyContext::new(proxy_config(config, with_client), StaticChain::default());

    ctx.register(packet_logger(&PacketLoggerConfig {
        extra_debug: config.debug.extra_debug,
        log_dir: dirs.log_dir.clone(),
        passphrase: config.debug.log_passphrase.clone(),
    }));

    let capture = WorldCapture::new(
        Arc::new(DiskOpener),
        session_options(config),
        capture_options(config, &dirs.worlds_dir),
    );
    ctx.register(capture_handler(Arc::new(capture)));
    ctx.subscribe(Arc::new(LogObserver));
    ctx
}
