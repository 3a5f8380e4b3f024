//! BLE Controller Module
//!
//! Owns the registry, the security state machine and the event dispatcher,
//! and routes stack callbacks between them. Lifecycle is
//! `Configuring -> Running -> Stopped`, with no re-entry.

use crate::domain::component::ComponentArena;
use crate::domain::dispatcher::EventDispatcher;
use crate::domain::error::{
    ConfigurationError, ControllerError, DispatchError, GattError, LifecycleError, StackError,
};
use crate::domain::models::{
    CharacteristicDescriptor, ComponentId, ControllerEvent, ControllerState, PairingResponse,
    PeerId, SecurityMode, ServiceDescriptor,
};
use crate::domain::registry::CharacteristicRegistry;
use crate::domain::security::{SecurityState, SecurityStateMachine, SessionEnd, Step};
use crate::domain::settings::ControllerSettings;
use crate::domain::uuid::{self, BleUuid};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::stack::BleStack;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Controller behind the one exclusive section, for hosts that deliver
/// stack callbacks on more than one thread.
pub type SharedController<S> = Arc<Mutex<BleController<S>>>;

pub struct BleController<S: BleStack> {
    state: ControllerState,
    components: ComponentArena,
    registry: CharacteristicRegistry,
    security: SecurityStateMachine,
    dispatcher: EventDispatcher,
    stack: S,
    connected: BTreeSet<PeerId>,
    subscriptions: HashMap<(BleUuid, BleUuid), BTreeSet<PeerId>>,
    handler_failures: Vec<DispatchError>,
    /// First configuration mistake; blocks `start()`.
    config_error: Option<ConfigurationError>,
    event_sender: Option<mpsc::UnboundedSender<ControllerEvent>>,
}

impl<S: BleStack> BleController<S> {
    /// Create a controller. The security mode is fixed for its lifetime.
    pub fn new(security_mode: SecurityMode, components: ComponentArena, stack: S) -> Self {
        info!("BLE controller created (security: {:?})", security_mode);
        Self {
            state: ControllerState::Configuring,
            components,
            registry: CharacteristicRegistry::new(),
            security: SecurityStateMachine::new(security_mode),
            dispatcher: EventDispatcher::new(security_mode),
            stack,
            connected: BTreeSet::new(),
            subscriptions: HashMap::new(),
            handler_failures: Vec::new(),
            config_error: None,
            event_sender: None,
        }
    }

    /// Build a controller from firmware-style settings. Every UUID is checked
    /// before anything is registered; trigger actions are registered after
    /// the characteristics.
    pub fn from_settings(
        settings: &ControllerSettings,
        components: ComponentArena,
        stack: S,
    ) -> Result<Self, ControllerError> {
        settings.validate()?;
        let mut controller = Self::new(settings.security_mode, components, stack);
        for service in &settings.services {
            for characteristic in &service.characteristics {
                controller.register_component(
                    &characteristic.exposes,
                    &service.service,
                    &characteristic.characteristic,
                    characteristic.use_ble2902,
                )?;
            }
        }
        for action in &settings.on_show_pass_key {
            let action = action.clone();
            controller.on_show_pass_key(move |pass_key| action.run("pass_key", pass_key))?;
        }
        for action in &settings.on_authentication_complete {
            let action = action.clone();
            controller.on_authentication_complete(move |success| {
                action.run("success", if success { "true" } else { "false" })
            })?;
        }
        Ok(controller)
    }

    /// Publish status events on `sender`.
    pub fn with_event_sender(mut self, sender: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn into_shared(self) -> SharedController<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.security.mode()
    }

    pub fn security_state(&self) -> SecurityState {
        self.security.state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.security.is_authenticated()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        self.registry.services()
    }

    pub fn components(&self) -> &ComponentArena {
        &self.components
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    pub fn connected_peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.connected.iter().copied()
    }

    pub fn is_subscribed(&self, peer: PeerId, service: &BleUuid, characteristic: &BleUuid) -> bool {
        self.subscriptions
            .get(&(service.clone(), characteristic.clone()))
            .is_some_and(|peers| peers.contains(&peer))
    }

    /// Handler failures collected since the last call.
    pub fn take_handler_failures(&mut self) -> Vec<DispatchError> {
        std::mem::take(&mut self.handler_failures)
    }

    // ---- configuration -------------------------------------------------

    /// Expose `component` as a characteristic of a service. Only valid
    /// before [`start`](Self::start). A failure here also makes `start()` fail.
    pub fn register_component(
        &mut self,
        component: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        notify_enabled: bool,
    ) -> Result<ComponentId, ControllerError> {
        self.ensure_configuring()?;
        let result = self.bind(component, service_uuid, characteristic_uuid, notify_enabled);
        self.record(result)
    }

    pub fn on_show_pass_key<F>(&mut self, handler: F) -> Result<(), ControllerError>
    where
        F: FnMut(&str) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_configuring()?;
        let result = self.dispatcher.on_show_pass_key(handler);
        self.record(result)
    }

    pub fn on_authentication_complete<F>(&mut self, handler: F) -> Result<(), ControllerError>
    where
        F: FnMut(bool) -> anyhow::Result<()> + Send + 'static,
    {
        self.ensure_configuring()?;
        let result = self.dispatcher.on_authentication_complete(handler);
        self.record(result)
    }

    // ---- lifecycle -----------------------------------------------------

    /// Begin advertising every registered service. Refused while any
    /// earlier configuration call has failed, so nothing is half advertised.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        match self.state {
            ControllerState::Configuring => {}
            ControllerState::Running => return Err(LifecycleError::AlreadyStarted.into()),
            ControllerState::Stopped => return Err(LifecycleError::Stopped.into()),
        }
        if let Some(e) = &self.config_error {
            error!("Refusing to start, configuration failed: {}", e);
            return Err(e.clone().into());
        }

        let table = protocol::build_attribute_table(
            self.registry.services(),
            &self.components,
            self.security.mode(),
        );
        self.stack
            .start_advertising(&table)
            .map_err(|source| StackError {
                operation: "start advertising",
                source,
            })?;

        self.state = ControllerState::Running;
        info!(
            "BLE controller running, {} service(s), {} characteristic(s)",
            table.len(),
            self.registry.characteristic_count()
        );
        self.publish(ControllerEvent::Started {
            services: table.len(),
        });
        Ok(())
    }

    /// Tear down advertising and any pairing session. Safe from any state.
    /// The controller ends up `Stopped` even if the stack reports an error,
    /// which is then returned.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        let previous = self.state;
        if previous == ControllerState::Stopped {
            return Ok(());
        }
        self.state = ControllerState::Stopped;

        if let SessionEnd::Abandoned(peer) = self.security.reset() {
            self.publish(ControllerEvent::PairingAbandoned(peer));
        }
        self.subscriptions.clear();
        self.connected.clear();

        let result = if previous == ControllerState::Running {
            self.stack.stop_advertising().map_err(|source| StackError {
                operation: "stop advertising",
                source,
            })
        } else {
            Ok(())
        };

        info!("BLE controller stopped");
        self.publish(ControllerEvent::Stopped);
        if let Err(e) = &result {
            error!("{}", e);
        }
        result.map_err(ControllerError::from)
    }

    // ---- stack callbacks -----------------------------------------------

    pub fn on_connect(&mut self, peer: PeerId) {
        if self.state != ControllerState::Running {
            warn!("Connection from {} while {:?}, ignoring", peer, self.state);
            return;
        }
        info!("{} connected", peer);
        self.connected.insert(peer);
        self.publish(ControllerEvent::PeerConnected(peer));
    }

    pub fn on_disconnect(&mut self, peer: PeerId) {
        if !self.connected.remove(&peer) {
            debug!("Disconnect of unknown {}", peer);
        }
        for peers in self.subscriptions.values_mut() {
            peers.remove(&peer);
        }
        if let SessionEnd::Abandoned(p) = self.security.on_disconnect(peer) {
            self.publish(ControllerEvent::PairingAbandoned(p));
        }
        info!("{} disconnected", peer);
        self.publish(ControllerEvent::PeerDisconnected(peer));
    }

    /// The stack asks for pairing. `pass_key` is the stack's own passkey,
    /// if it generated one.
    pub fn on_pairing_request(&mut self, peer: PeerId, pass_key: Option<u32>) -> PairingResponse {
        if self.state != ControllerState::Running {
            warn!(
                "Pairing request from {} while {:?}, rejecting",
                peer, self.state
            );
            return PairingResponse::Reject;
        }
        let step = self
            .security
            .on_pairing_request(peer, pass_key, &mut self.dispatcher);
        let attempt = self.absorb(step);
        if let SessionEnd::Abandoned(previous) = attempt.replaced {
            self.publish(ControllerEvent::PairingAbandoned(previous));
        }
        attempt.response
    }

    /// The stack reports the pairing outcome.
    pub fn on_authentication_result(&mut self, peer: PeerId, success: bool) {
        if self.state != ControllerState::Running {
            warn!(
                "Authentication result from {} while {:?}, ignoring",
                peer, self.state
            );
            return;
        }
        let step = self
            .security
            .on_authentication_result(peer, success, &mut self.dispatcher);
        if self.absorb(step) {
            self.publish(ControllerEvent::Authenticated { peer, success });
        }
    }

    /// Peer reads a characteristic: current value of the bound component.
    pub fn on_read(
        &mut self,
        peer: PeerId,
        service: &BleUuid,
        characteristic: &BleUuid,
    ) -> Result<Vec<u8>, ControllerError> {
        self.ensure_running()?;
        let descriptor = lookup(&self.registry, service, characteristic)?;
        let component = self.components.get(descriptor.component);

        let value = component.read().map_err(|source| GattError::Component {
            name: component.name().to_string(),
            source,
        })?;
        debug!(
            "{} read {}/{} -> {} = {}",
            peer,
            service,
            characteristic,
            component.name(),
            value
        );
        Ok(protocol::encode_value(component.value_kind(), &value))
    }

    /// Peer writes a characteristic: decode and apply to the bound component.
    pub fn on_write(
        &mut self,
        peer: PeerId,
        service: &BleUuid,
        characteristic: &BleUuid,
        bytes: &[u8],
    ) -> Result<(), ControllerError> {
        self.ensure_running()?;
        let descriptor = lookup(&self.registry, service, characteristic)?;
        let component = self.components.get(descriptor.component);

        if !component.is_writable() {
            return Err(GattError::ReadOnly(component.name().to_string()).into());
        }
        let value = protocol::decode_value(component.name(), component.value_kind(), bytes)?;
        debug!(
            "{} wrote {}/{} -> {} = {}",
            peer,
            service,
            characteristic,
            component.name(),
            value
        );
        component.write(value).map_err(|source| GattError::Component {
            name: component.name().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Peer toggles notifications through the characteristic's CCCD. Only
    /// connected peers may subscribe.
    pub fn on_subscribe(
        &mut self,
        peer: PeerId,
        service: &BleUuid,
        characteristic: &BleUuid,
        enabled: bool,
    ) -> Result<(), ControllerError> {
        self.ensure_running()?;
        if !self.connected.contains(&peer) {
            return Err(GattError::NotConnected(peer).into());
        }
        let descriptor = lookup(&self.registry, service, characteristic)?;
        if !descriptor.notify_enabled {
            return Err(GattError::NotifyNotEnabled(characteristic.to_string()).into());
        }

        let peers = self
            .subscriptions
            .entry((service.clone(), characteristic.clone()))
            .or_default();
        if enabled {
            peers.insert(peer);
        } else {
            peers.remove(&peer);
        }
        debug!(
            "{} {} notifications on {}/{}",
            peer,
            if enabled { "enabled" } else { "disabled" },
            service,
            characteristic
        );
        Ok(())
    }

    /// Push the component's current value to every subscribed peer of every
    /// notify-enabled characteristic bound to it. Returns the number of
    /// notifications the stack accepted.
    pub fn notify_component_changed(&mut self, component: &str) -> Result<usize, ControllerError> {
        self.ensure_running()?;
        let id = self.components.resolve(component)?;
        let handle = self.components.get(id);
        let value = handle.read().map_err(|source| GattError::Component {
            name: component.to_string(),
            source,
        })?;
        let bytes = protocol::encode_value(handle.value_kind(), &value);

        let targets: Vec<(BleUuid, BleUuid, Vec<PeerId>)> = self
            .registry
            .bindings_of(id)
            .filter(|(_, c)| c.notify_enabled)
            .filter_map(|(service, c)| {
                let peers = self.subscriptions.get(&(service.clone(), c.uuid.clone()))?;
                Some((
                    service.clone(),
                    c.uuid.clone(),
                    peers.iter().copied().collect(),
                ))
            })
            .collect();

        let mut delivered = 0;
        for (service, characteristic, peers) in targets {
            for peer in peers {
                match self.stack.notify(peer, &service, &characteristic, &bytes) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(
                        "Notify {} on {}/{} failed: {}",
                        peer, service, characteristic, e
                    ),
                }
            }
        }
        Ok(delivered)
    }

    // ---- internals -----------------------------------------------------

    fn bind(
        &mut self,
        component: &str,
        service_uuid: &str,
        characteristic_uuid: &str,
        notify_enabled: bool,
    ) -> Result<ComponentId, ConfigurationError> {
        let service = uuid::validate(service_uuid)?;
        let characteristic = uuid::validate(characteristic_uuid)?;
        self.registry.register(
            &self.components,
            service,
            characteristic,
            component,
            notify_enabled,
        )
    }

    /// Keep the first configuration error so `start()` can refuse.
    fn record<T>(&mut self, result: Result<T, ConfigurationError>) -> Result<T, ControllerError> {
        if let Err(e) = &result {
            warn!("Configuration rejected: {}", e);
            if self.config_error.is_none() {
                self.config_error = Some(e.clone());
            }
        }
        result.map_err(ControllerError::from)
    }

    fn ensure_configuring(&self) -> Result<(), LifecycleError> {
        match self.state {
            ControllerState::Configuring => Ok(()),
            ControllerState::Running => Err(LifecycleError::ControllerAlreadyStarted),
            ControllerState::Stopped => Err(LifecycleError::Stopped),
        }
    }

    fn ensure_running(&self) -> Result<(), LifecycleError> {
        match self.state {
            ControllerState::Running => Ok(()),
            ControllerState::Configuring => Err(LifecycleError::NotRunning),
            ControllerState::Stopped => Err(LifecycleError::Stopped),
        }
    }

    fn absorb<T>(&mut self, step: Step<T>) -> T {
        if let Some(failure) = step.handler_failures {
            error!("{}", failure);
            self.publish(ControllerEvent::HandlerFailures {
                channel: failure.channel,
                failed: failure.failures.len(),
            });
            self.handler_failures.push(failure);
        }
        step.value
    }

    fn publish(&self, event: ControllerEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

fn lookup<'a>(
    registry: &'a CharacteristicRegistry,
    service: &BleUuid,
    characteristic: &BleUuid,
) -> Result<&'a CharacteristicDescriptor, GattError> {
    registry
        .lookup(service, characteristic)
        .ok_or_else(|| GattError::NotFound {
            service: service.to_string(),
            characteristic: characteristic.to_string(),
        })
}
