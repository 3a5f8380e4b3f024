use crate::domain::uuid::BleUuid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pairing requirement of the controller, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No pairing requirement, authentication callbacks never fire.
    None,
    /// Passkey pairing; the passkey is handed to the application for display.
    #[default]
    ShowPassKey,
}

impl SecurityMode {
    pub fn authentication_enabled(&self) -> bool {
        matches!(self, SecurityMode::ShowPassKey)
    }
}

/// The two application-facing event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannel {
    ShowPassKey,
    AuthenticationComplete,
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventChannel::ShowPassKey => f.write_str("on_show_pass_key"),
            EventChannel::AuthenticationComplete => f.write_str("on_authentication_complete"),
        }
    }
}

/// Connection handle assigned by the BLE stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u16);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Stable index of a component inside a [`ComponentArena`](crate::domain::component::ComponentArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub(crate) usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: BleUuid,
    pub component: ComponentId,
    /// Attach a client characteristic configuration descriptor (0x2902).
    pub notify_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: BleUuid,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

/// Controller lifecycle. Linear, no re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Configuring,
    Running,
    Stopped,
}

/// What the controller tells the stack to do with a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingResponse {
    /// Accept with no passkey exchange.
    AcceptWithoutAuthentication,
    /// Passkey was handed to the application; wait for the peer to confirm.
    DisplayPasskey(String),
    /// The controller is not running.
    Reject,
}

/// Status notifications published on the optional event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Started { services: usize },
    Stopped,
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    PairingAbandoned(PeerId),
    Authenticated { peer: PeerId, success: bool },
    HandlerFailures { channel: EventChannel, failed: usize },
}
