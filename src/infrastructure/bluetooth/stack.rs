//! BLE Stack Module
//!
//! The platform BLE stack as seen by the controller, plus a simulated
//! stack that logs and records every request.

use crate::domain::models::PeerId;
use crate::domain::uuid::BleUuid;
use crate::infrastructure::bluetooth::protocol::GattServiceSpec;
use tracing::{debug, info};

/// Requests the controller makes of the platform stack. Stack callbacks
/// travel the other way, as method calls on the controller.
pub trait BleStack {
    fn start_advertising(&mut self, services: &[GattServiceSpec]) -> anyhow::Result<()>;

    fn stop_advertising(&mut self) -> anyhow::Result<()>;

    fn notify(
        &mut self,
        peer: PeerId,
        service: &BleUuid,
        characteristic: &BleUuid,
        value: &[u8],
    ) -> anyhow::Result<()>;
}

/// A notification pushed to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub peer: PeerId,
    pub service: BleUuid,
    pub characteristic: BleUuid,
    pub value: Vec<u8>,
}

/// In-memory stack used by the simulator binary and tests.
#[derive(Debug, Default)]
pub struct SimulatedStack {
    advertised: Option<Vec<GattServiceSpec>>,
    advertise_calls: usize,
    notifications: Vec<SentNotification>,
    fail_next: Option<String>,
}

impl SimulatedStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next stack request fail with `reason`.
    pub fn fail_next(&mut self, reason: impl Into<String>) {
        self.fail_next = Some(reason.into());
    }

    pub fn is_advertising(&self) -> bool {
        self.advertised.is_some()
    }

    pub fn advertised(&self) -> Option<&[GattServiceSpec]> {
        self.advertised.as_deref()
    }

    /// Number of successful `start_advertising` calls.
    pub fn advertise_calls(&self) -> usize {
        self.advertise_calls
    }

    pub fn notifications(&self) -> &[SentNotification] {
        &self.notifications
    }

    fn check_failure(&mut self) -> anyhow::Result<()> {
        match self.fail_next.take() {
            Some(reason) => Err(anyhow::anyhow!(reason)),
            None => Ok(()),
        }
    }
}

impl BleStack for SimulatedStack {
    fn start_advertising(&mut self, services: &[GattServiceSpec]) -> anyhow::Result<()> {
        self.check_failure()?;
        for service in services {
            info!(
                "Advertising service {} with {} characteristic(s)",
                service.uuid,
                service.characteristics.len()
            );
        }
        self.advertised = Some(services.to_vec());
        self.advertise_calls += 1;
        Ok(())
    }

    fn stop_advertising(&mut self) -> anyhow::Result<()> {
        self.check_failure()?;
        info!("Advertising stopped");
        self.advertised = None;
        Ok(())
    }

    fn notify(
        &mut self,
        peer: PeerId,
        service: &BleUuid,
        characteristic: &BleUuid,
        value: &[u8],
    ) -> anyhow::Result<()> {
        self.check_failure()?;
        debug!(
            "Notify {} on {}/{}: {:02X?}",
            peer, service, characteristic, value
        );
        self.notifications.push(SentNotification {
            peer,
            service: service.clone(),
            characteristic: characteristic.clone(),
            value: value.to_vec(),
        });
        Ok(())
    }
}
