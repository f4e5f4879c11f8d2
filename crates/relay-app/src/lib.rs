//! The `bedrock-relay` application: directory layout, world capture wiring,
//! and assembly of a proxy session from the loaded configuration.

pub mod app;
pub mod capture;
pub mod platform;

pub use app::{build_context, capture_options, proxy_config, session_options};
pub use capture::{CaptureOptions, WorldCapture, capture_handler, world_folder_name};
pub use platform::{AppDirs, PlatformError};
