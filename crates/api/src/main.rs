//! NewDriver - Main Entry Point
//!
//! Usage: `newdriver [CONFIG_FILE]`

use std::path::PathBuf;

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== NewDriver v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Camera: {:?}, mirror controls: {}, gaze gating: {}",
        config.camera.source, config.tracker.mirror_controls, config.tracker.gaze_gating
    );

    run_server(config).await?;

    Ok(())
}
