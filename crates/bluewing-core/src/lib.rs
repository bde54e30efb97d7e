//! Event-driven BLE central sessions over pluggable platform backends.
//!
//! This crate turns the divergent callback streams of native Bluetooth Low
//! Energy stacks into one ordered event stream per peripheral, and exposes
//! idempotent operations for scanning, connecting, service discovery and
//! characteristic access.
//!
//! # Features
//!
//! - **One record per peripheral**: scan results and connection callbacks
//!   for the same device always resolve to the same [`Peripheral`]
//! - **Ordered lifecycle**: `Connected`, then `ServicesDiscovered`, then
//!   `CharacteristicsDiscovered`, with discovery chained automatically
//! - **Multiple observers**: [`SessionDelegate`] callbacks plus a broadcast
//!   channel for async consumers
//! - **Pluggable backends**: implement [`PlatformAdapter`], or use the
//!   bundled [`BtleplugAdapter`] (feature `btleplug`) or [`MockAdapter`]
//!
//! # Platform Differences
//!
//! Backends differ in what they can report; [`AdapterCapabilities`] says
//! which guarantees hold. In particular:
//!
//! - Some stacks never report a failed connection attempt. Layer a timeout
//!   on top of [`Session::connect`] if you need one.
//! - Some stacks cannot negotiate the MTU. [`Session::change_mtu`] still emits
//!   [`SessionEvent::MtuUpdated`], with `negotiated: false`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluewing_core::{BtleplugAdapter, Session, SessionConfig, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Arc::new(BtleplugAdapter::new().await?);
//!     let session = Session::new(adapter, SessionConfig::default())?;
//!
//!     let mut events = session.events();
//!     session.start_scan(None)?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::PeripheralDiscovered { peripheral } = event {
//!             println!("{} {:?} {:?}", peripheral.id, peripheral.name, peripheral.rssi);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Logging
//!
//! The library logs through [`logger::Logger`], silent by default. Set
//! [`SessionConfig::log_level`] to route messages to `tracing` under the
//! `bluewing` target.

pub mod adapter;
pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod mock;
pub mod model;
pub mod registry;
pub mod session;

#[cfg(feature = "btleplug")]
pub mod btleplug_backend;
#[cfg(feature = "btleplug")]
pub mod util;
#[cfg(feature = "btleplug")]
mod queue;

pub use adapter::{AdapterCapabilities, AdapterRequest, EventSink, PlatformAdapter, PlatformEvent};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, EventSender, SessionEvent};
pub use logger::{LogLevel, LogSink, Logger, TracingSink};
pub use mock::{MockAdapter, MockAdapterBuilder, MockAdvertisement};
pub use model::{Characteristic, CharacteristicTarget, Peripheral, Service};
pub use registry::{DelegateRegistry, SessionDelegate, SubscriptionId};
pub use session::Session;

#[cfg(feature = "btleplug")]
pub use btleplug_backend::BtleplugAdapter;

// Re-export types crate for convenience
pub use bluewing_types;
