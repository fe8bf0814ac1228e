//! `snapcache serve`.

use anyhow::Result;
use tracing::info;

use snapcache::api::{start_server, AppState};
use snapcache::config::Config;

/// Start the HTTP server with both caches wired to the data file.
pub(crate) async fn cmd_serve(mut config: Config, port: Option<u16>, watch: bool) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if watch {
        config.repository.watch = true;
    }

    info!(
        data = %config.repository.path.display(),
        watch = config.repository.watch,
        "Starting snapcache"
    );
    let state = AppState::from_config(&config);
    start_server(&config, state)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;
    Ok(())
}
