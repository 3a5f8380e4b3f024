//! BLE peripheral controller.
//!
//! Exposes host application components as GATT characteristics, runs the
//! passkey pairing handshake and hands authentication events to the
//! application.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      BleController                        │
//! │   (lifecycle, stack callback routing, status events)      │
//! └──────┬───────────────────┬───────────────────┬────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌─────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │  Registry   │   │ Security state  │──▶│ Event dispatcher│
//! │ service/char│   │    machine      │   │ pass key / auth │
//! │ -> component│   │                 │   │    handlers     │
//! └─────────────┘   └─────────────────┘   └─────────────────┘
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::component::{CharacteristicValue, ComponentArena, ExposedComponent, ValueKind};
pub use domain::error::ControllerError;
pub use domain::models::{ControllerEvent, PairingResponse, PeerId, SecurityMode};
pub use infrastructure::bluetooth::{BleController, BleStack, SimulatedStack};
