//! Scan command implementation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, timeout_at};
use uuid::Uuid;

use bluewing_core::{EventReceiver, SessionEvent};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{ScanRow, format_scan_json, format_scan_text, sort_rows};

pub async fn cmd_scan(
    duration: Option<u64>,
    service: Option<Uuid>,
    format: OutputFormat,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let secs = duration.unwrap_or(config.scan.duration);
    let (session, adapter) = super::open_session(config.session.clone()).await?;
    let mut events = session.events();

    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {}s...", secs);
    }
    session.start_scan(service)?;

    let collected = collect(&mut events, Duration::from_secs(secs)).await;
    session.stop_scan();
    super::finish(&adapter).await;
    let rows = collected?;

    let mut rows: Vec<ScanRow> = rows.into_values().collect();
    sort_rows(&mut rows);
    let content = match format {
        OutputFormat::Json => format_scan_json(&rows)?,
        OutputFormat::Text => format_scan_text(&rows),
    };
    print!("{}", content);
    Ok(())
}

/// Aggregate sightings until `duration` passes or the scan fails.
async fn collect(
    events: &mut EventReceiver,
    duration: Duration,
) -> Result<HashMap<String, ScanRow>> {
    let deadline = Instant::now() + duration;
    let mut rows: HashMap<String, ScanRow> = HashMap::new();
    loop {
        let event = match timeout_at(deadline, events.recv()).await {
            Err(_) => break,
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!("Dropped {} scan events", skipped);
                continue;
            }
            Ok(Err(RecvError::Closed)) => break,
            Ok(Ok(event)) => event,
        };
        match event {
            SessionEvent::PeripheralDiscovered { peripheral } => {
                rows.entry(peripheral.id.to_string())
                    .and_modify(|row| row.update(&peripheral))
                    .or_insert_with(|| ScanRow::new(&peripheral));
            }
            SessionEvent::ScanFailed { reason } => bail!("Scan failed: {}", reason),
            SessionEvent::AdapterStateChanged { state } if !state.is_ready() => {
                bail!("Bluetooth adapter is {}", state);
            }
            _ => {}
        }
    }
    Ok(rows)
}
