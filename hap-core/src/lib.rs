//! The portable core of a HomeKit Accessory Protocol (HAP) accessory stack.
//!
//! This crate implements the pairing state machines, the secure session framing, the attribute
//! database, and both wire transports (HTTP/IP and BLE GATT). It is platform-agnostic: a host
//! provides the [`platform::System`] clock/RNG, [`storage::Storage`] key-value store,
//! [`pairing::crypto::Crypto`] primitives, and [`platform::Network`]/[`platform::Ble`]
//! collaborators, and this crate drives the protocol on top of them.
//!
//! # Using the stack
//!
//! The core does not open sockets, advertise, or spawn threads itself — it reacts to bytes handed
//! to it by a host and returns bytes (or GATT/mDNS operations) for the host to send. See
//! [`server`] for the orchestrator that wires the pieces together.

#[macro_use]
mod log;
#[macro_use]
mod utils;

pub mod advertising;
pub mod bytes;
pub mod config;
pub mod connection;
mod error;
pub mod mdns;
pub mod model;
pub mod pairing;
pub mod platform;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod storage;
pub mod time;
pub mod tlv;
pub mod transport;
pub mod uuid;

pub use self::error::{Error, Result};

/// Version of the HAP accessory protocol implemented by this crate (§1).
pub const HAP_PROTOCOL_VERSION: &str = "1.1.0";
