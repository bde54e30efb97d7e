//! Inspect command implementation.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, timeout_at};

use bluewing_core::{EventReceiver, Peripheral, Session, SessionEvent};
use bluewing_types::{CharacteristicProperties, PeripheralId};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{format_tree_json, format_tree_text};

pub async fn cmd_inspect(
    id: &str,
    timeout: u64,
    read: bool,
    format: OutputFormat,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let id = PeripheralId::parse(id).context("Invalid peripheral identifier")?;
    let limit = Duration::from_secs(timeout);
    let (session, adapter) = super::open_session(config.session.clone()).await?;
    let mut events = session.events();

    if !quiet {
        eprintln!("Looking for {}...", id);
    }
    session.start_scan(None)?;
    let seen = wait_for(&mut events, Instant::now() + limit, |event| match event {
        SessionEvent::PeripheralDiscovered { peripheral } => Ok(peripheral.id == id),
        SessionEvent::ScanFailed { reason } => bail!("Scan failed: {}", reason),
        _ => Ok(false),
    })
    .await;
    session.stop_scan();
    if !matches!(seen, Ok(true)) {
        super::finish(&adapter).await;
        seen?;
        bail!("Peripheral {} not found within {}s", id, timeout);
    }

    if !quiet {
        eprintln!("Connecting...");
    }
    session.connect(&id)?;
    let result = explore(&session, &mut events, &id, limit, read).await;
    session.disconnect(&id)?;
    super::finish(&adapter).await;
    let peripheral = result?;

    let content = match format {
        OutputFormat::Json => format_tree_json(&peripheral)?,
        OutputFormat::Text => format_tree_text(&peripheral),
    };
    print!("{}", content);
    Ok(())
}

/// Wait for discovery to finish, then optionally read every readable value.
async fn explore(
    session: &Session,
    events: &mut EventReceiver,
    id: &PeripheralId,
    limit: Duration,
    read: bool,
) -> Result<Peripheral> {
    let ready = wait_for(events, Instant::now() + limit, |event| match event {
        SessionEvent::CharacteristicsDiscovered { peripheral } => Ok(&peripheral.id == id),
        SessionEvent::Disconnected { peripheral, reason } if &peripheral.id == id => {
            bail!("Disconnected during discovery: {}", reason)
        }
        _ => Ok(false),
    })
    .await?;
    if !ready {
        bail!("Service discovery did not finish within {}s", limit.as_secs());
    }

    if read {
        let snapshot = session.peripheral(id).context("Peripheral record vanished")?;
        let readable: HashSet<_> = snapshot
            .characteristics()
            .filter(|c| c.properties.contains(CharacteristicProperties::READ))
            .map(|c| c.uuid)
            .collect();
        let mut pending = 0;
        for uuid in readable {
            pending += session.read_characteristic(id, uuid)?;
        }
        tracing::debug!("Waiting for {} characteristic reads", pending);

        let deadline = Instant::now() + limit;
        while pending > 0 {
            let done = wait_for(events, deadline, |event| match event {
                SessionEvent::CharacteristicValueChanged { peripheral, .. } => {
                    Ok(&peripheral.id == id)
                }
                _ => Ok(false),
            })
            .await?;
            if !done {
                tracing::warn!("{} reads did not complete in time", pending);
                break;
            }
            pending -= 1;
        }
    }

    session.peripheral(id).context("Peripheral record vanished")
}

/// Receive events until `matches` accepts one (`true`) or `deadline` passes (`false`).
async fn wait_for(
    events: &mut EventReceiver,
    deadline: Instant,
    mut matches: impl FnMut(&SessionEvent) -> Result<bool>,
) -> Result<bool> {
    loop {
        match timeout_at(deadline, events.recv()).await {
            Err(_) | Ok(Err(RecvError::Closed)) => return Ok(false),
            Ok(Err(RecvError::Lagged(skipped))) => {
                tracing::warn!("Dropped {} session events", skipped);
            }
            Ok(Ok(event)) => {
                if matches(&event)? {
                    return Ok(true);
                }
            }
        }
    }
}
