//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Bedrock relay command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "bedrock-relay", about = "Bedrock proxy that captures the worlds you visit")]
pub struct CliArgs {
    /// Server to connect to, `host:port`.
    pub server: Option<String>,

    /// Address the game connects to.
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory captured worlds are written to.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Entity type to leave out of saved worlds. Repeatable.
    #[arg(long = "exclude-mob")]
    pub exclude_mobs: Vec<String>,

    /// Save with an empty flat generator.
    #[arg(long)]
    pub void_gen: Option<bool>,

    /// Dial the server without waiting for a game client.
    #[arg(long)]
    pub no_client: bool,

    /// Mirror packet dumps to packets.log and packets.log.enc.
    #[arg(long)]
    pub extra_debug: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref server) = args.server {
            self.network.server_address = server.clone();
        }
        if let Some(ref listen) = args.listen {
            self.network.listen_address = listen.clone();
        }
        if let Some(ref output) = args.output {
            self.capture.output_dir = output.clone();
        }
        if !args.exclude_mobs.is_empty() {
            self.capture.exclude_mobs = args.exclude_mobs.clone();
        }
        if let Some(void_gen) = args.void_gen {
            self.capture.void_gen = void_gen;
        }
        if args.extra_debug {
            self.debug.extra_debug = true;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
