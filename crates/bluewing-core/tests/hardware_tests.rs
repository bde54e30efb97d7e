//! Hardware integration tests for bluewing-core
//!
//! These tests require a Bluetooth adapter and should be run with:
//! ```text
//! cargo test --package bluewing-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `BLUEWING_DEVICE` to a peripheral identifier (MAC address, or the
//! CoreBluetooth UUID on macOS) to run the connection tests.

#![cfg(feature = "btleplug")]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use bluewing_core::{BtleplugAdapter, LogLevel, Session, SessionConfig, SessionEvent};
use bluewing_types::PeripheralId;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, timeout};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device() -> Option<PeripheralId> {
    env::var("BLUEWING_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PeripheralId::new)
}

async fn open_session() -> Session {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bluewing=trace")
        .try_init();
    let adapter = BtleplugAdapter::new()
        .await
        .expect("No Bluetooth adapter available");
    Session::new(
        Arc::new(adapter),
        SessionConfig::default().log_level(LogLevel::Verbose),
    )
    .expect("valid config")
}

#[tokio::test]
#[ignore]
async fn test_scan_reports_peripherals() {
    let session = open_session().await;
    let mut events = session.events();
    session.start_scan(None).expect("scan should start");

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut sightings = 0;
    while let Ok(event) = tokio::time::timeout_at(deadline, events.recv()).await {
        match event {
            Ok(SessionEvent::PeripheralDiscovered { peripheral }) => {
                println!("{} {:?} {:?}", peripheral.id, peripheral.name, peripheral.rssi);
                sightings += 1;
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
    session.stop_scan();

    println!("{} sightings, {} peripherals", sightings, session.peripherals().len());
    assert!(!session.is_scanning());
}

#[tokio::test]
#[ignore]
async fn test_connect_and_discover() {
    let Some(id) = get_device() else {
        eprintln!("BLUEWING_DEVICE not set, skipping");
        return;
    };
    let session = open_session().await;
    let mut events = session.events();
    session.start_scan(None).expect("scan should start");

    let discovered = timeout(BLE_TIMEOUT, async {
        loop {
            if let Ok(SessionEvent::PeripheralDiscovered { peripheral }) = events.recv().await {
                if peripheral.id == id {
                    break;
                }
            }
        }
    })
    .await;
    session.stop_scan();
    assert!(discovered.is_ok(), "device {} not seen", id);

    session.connect(&id).expect("connect accepted");
    let ready = timeout(BLE_TIMEOUT, async {
        loop {
            if let Ok(SessionEvent::CharacteristicsDiscovered { peripheral }) = events.recv().await {
                if peripheral.id == id {
                    return peripheral;
                }
            }
        }
    })
    .await
    .expect("characteristics discovered in time");

    for service in &ready.services {
        println!("service {}", service.uuid);
        for c in &service.characteristics {
            println!("  {} (handle {}, props {:#04x})", c.uuid, c.handle, c.properties.bits());
        }
    }
    assert!(!ready.services.is_empty());

    session.disconnect(&id).expect("disconnect accepted");
}
