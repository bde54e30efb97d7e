//! Command implementations.

mod config;
mod inspect;
mod scan;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bluewing_core::{BtleplugAdapter, Session, SessionConfig};

pub use config::cmd_config;
pub use inspect::cmd_inspect;
pub use scan::cmd_scan;

/// How long to wait for queued requests to reach the radio before exiting.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a session on the first Bluetooth adapter.
///
/// The adapter handle is returned alongside so commands can `finish` with it.
async fn open_session(config: SessionConfig) -> Result<(Session, Arc<BtleplugAdapter>)> {
    let adapter = Arc::new(
        BtleplugAdapter::new()
            .await
            .context("Failed to open Bluetooth adapter")?,
    );
    let session =
        Session::new(adapter.clone(), config).context("Failed to start session")?;
    Ok((session, adapter))
}

/// Let the last requests (`StopScan`, `Disconnect`) run before the runtime stops.
async fn finish(adapter: &BtleplugAdapter) {
    if tokio::time::timeout(FLUSH_TIMEOUT, adapter.flush()).await.is_err() {
        tracing::warn!("Pending Bluetooth requests did not finish in time");
    }
}
