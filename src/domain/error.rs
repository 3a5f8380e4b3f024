//! Error taxonomy for the BLE controller.
//!
//! Setup-time problems are [`ConfigurationError`]s and [`LifecycleError`]s,
//! GATT routing problems are [`GattError`]s, and failing application
//! handlers are collected into a [`DispatchError`].

use crate::domain::models::{EventChannel, PeerId};
use thiserror::Error;

/// A UUID string did not match the accepted BLE UUID text format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UuidError {
    #[error("valid UUID required, got {0:?}")]
    InvalidFormat(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] UuidError),

    #[error("characteristic {characteristic} is already registered in service {service}")]
    DuplicateCharacteristic {
        service: String,
        characteristic: String,
    },

    #[error("component {0:?} is not known to the controller")]
    UnknownComponent(String),

    #[error("component {0:?} is already registered")]
    DuplicateComponent(String),

    #[error("{0} automation only available if security is enabled")]
    SecurityDisabledButTriggerRequested(EventChannel),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("controller already started, configuration is frozen")]
    ControllerAlreadyStarted,

    #[error("controller already started")]
    AlreadyStarted,

    #[error("controller is not running")]
    NotRunning,

    #[error("controller is stopped")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum GattError {
    #[error("no characteristic {characteristic} in service {service}")]
    NotFound {
        service: String,
        characteristic: String,
    },

    #[error("{0} is not connected")]
    NotConnected(PeerId),

    #[error("component {0:?} does not accept writes")]
    ReadOnly(String),

    #[error("notifications are not enabled for characteristic {0}")]
    NotifyNotEnabled(String),

    #[error("component {name:?} failed: {source}")]
    Component {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot decode value for component {name:?}: {reason}")]
    Encoding { name: String, reason: String },
}

/// A single application handler that failed during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Position of the handler in registration order.
    pub index: usize,
    pub message: String,
}

/// Aggregate of every handler failure seen during one emit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} of {total} {channel} handler(s) failed", .failures.len())]
pub struct DispatchError {
    pub channel: EventChannel,
    pub total: usize,
    pub failures: Vec<HandlerFailure>,
}

/// The platform BLE stack rejected a request.
#[derive(Error, Debug)]
#[error("BLE stack error during {operation}: {source}")]
pub struct StackError {
    pub operation: &'static str,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Gatt(#[from] GattError),

    #[error(transparent)]
    Stack(#[from] StackError),
}

impl From<UuidError> for ControllerError {
    fn from(e: UuidError) -> Self {
        ControllerError::Configuration(e.into())
    }
}
