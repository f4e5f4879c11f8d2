//! The binary entry point for bedrock-relay.

use clap::Parser;
use relay_app::{AppDirs, build_context};
use relay_config::{CliArgs, Config, default_config_dir};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    let dirs = match AppDirs::resolve(Some(&config_dir), &config.capture.output_dir) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Failed to resolve directories: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create directories: {e}");
        std::process::exit(1);
    }

    relay_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!("{dirs}");

    let ctx = build_context(&config, &dirs, !args.no_client);

    let cancel = ctx.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            cancel.cancel("interrupted");
        }
    });

    if let Err(e) = ctx.run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
