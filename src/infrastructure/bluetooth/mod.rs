//! Bluetooth Module
//!
//! Peripheral-side BLE plumbing around the domain core.
//!
//! ## Modules
//!
//! - [`controller`] - Orchestrator: lifecycle, GATT routing, pairing callbacks
//! - [`protocol`] - Value encoding and the advertised attribute table
//! - [`stack`] - Platform stack interface and the simulated stack

pub mod controller;
pub mod protocol;
pub mod stack;

// Re-export main types for convenience
pub use controller::{BleController, SharedController};
pub use stack::{BleStack, SimulatedStack};
