//! # minidrone
//!
//! A Rust client library for Parrot minidrones (Mambo, Swing, Rolling Spider
//! and their Wi-Fi variants).
//!
//! This library provides async command and telemetry exchange with the drone
//! over Bluetooth LE or Wi-Fi/UDP.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Commands built from a declarative catalog, addressed by name or id
//! - Acknowledged sends with timeouts
//! - Latest-value sensor store with event notifications
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use minidrone::{Drone, WifiConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), minidrone::Error> {
//!     let drone = Drone::wifi(WifiConfig::with_address("192.168.99.3", 44444));
//!     drone.connect().await?;
//!
//!     let takeoff = drone.new_command("minidrone", "Piloting", "TakeOff", &[])?;
//!     drone.send_command(&takeoff).await?;
//!
//!     if let Some(battery) = drone
//!         .wait_for_sensor("common/CommonState/BatteryStateChanged", Duration::from_secs(5))
//!         .await
//!     {
//!         println!("{battery}");
//!     }
//!
//!     let landing = drone.new_command("minidrone", "Piloting", "Landing", &[])?;
//!     drone.send_command(&landing).await?;
//!     drone.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Wire-level types (argument codec, buffers, Wi-Fi frames, handshake)
//! - [`catalog`] - Command definitions, templates and instances
//! - [`session`] - Per-connection state (sequences, pending acks, sensors)
//! - [`transport`] - BLE and Wi-Fi transports
//! - [`event`] - Async event system for connection and sensor notifications
//! - [`client`] - High-level [`Drone`] client

pub mod catalog;
pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use catalog::{ArgumentSpec, Catalog, Command, CommandTemplate, Element};
pub use client::{ConnectionState, Drone, DroneConfig};
pub use error::{ElementKind, Error, FrameError, Identifier, Result};
pub use event::{Event, EventDispatcher, EventFilter, Subscription};
pub use protocol::{ArgType, ArgValue, BufferClass, DataType, EnumSpec, TimeoutPolicy, Value};
pub use transport::{
    BleConfig, BleRadio, BleTransport, ServiceBrowser, Transport, WifiConfig, WifiTransport,
};
