//! Characteristic registry.
//!
//! Maps (service UUID, characteristic UUID) to the component bound to it.
//! Services and characteristics keep registration order, since clients may
//! cache discovery order.

use crate::domain::component::ComponentArena;
use crate::domain::error::ConfigurationError;
use crate::domain::models::{CharacteristicDescriptor, ComponentId, ServiceDescriptor};
use crate::domain::uuid::BleUuid;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct CharacteristicRegistry {
    services: Vec<ServiceDescriptor>,
    /// (service, characteristic) -> (service index, characteristic index)
    index: HashMap<(BleUuid, BleUuid), (usize, usize)>,
}

impl CharacteristicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `component` to a characteristic. The registry is untouched on error.
    pub fn register(
        &mut self,
        components: &ComponentArena,
        service: BleUuid,
        characteristic: BleUuid,
        component: &str,
        notify_enabled: bool,
    ) -> Result<ComponentId, ConfigurationError> {
        let key = (service, characteristic);
        if self.index.contains_key(&key) {
            return Err(ConfigurationError::DuplicateCharacteristic {
                service: key.0.to_string(),
                characteristic: key.1.to_string(),
            });
        }
        let component_id = components.resolve(component)?;
        let (service, characteristic) = key;

        let service_idx = match self.services.iter().position(|s| s.uuid == service) {
            Some(idx) => idx,
            None => {
                self.services.push(ServiceDescriptor {
                    uuid: service.clone(),
                    characteristics: Vec::new(),
                });
                self.services.len() - 1
            }
        };

        let entry = &mut self.services[service_idx];
        entry.characteristics.push(CharacteristicDescriptor {
            uuid: characteristic.clone(),
            component: component_id,
            notify_enabled,
        });
        let char_idx = entry.characteristics.len() - 1;

        debug!(
            "Registered {} as characteristic {} of service {} (notify: {})",
            component, characteristic, service, notify_enabled
        );
        self.index
            .insert((service, characteristic), (service_idx, char_idx));
        Ok(component_id)
    }

    pub fn lookup(
        &self,
        service: &BleUuid,
        characteristic: &BleUuid,
    ) -> Option<&CharacteristicDescriptor> {
        // The index is keyed by owned pairs; clone only on the lookup path.
        let (s, c) = self
            .index
            .get(&(service.clone(), characteristic.clone()))
            .copied()?;
        Some(&self.services[s].characteristics[c])
    }

    /// Services in registration order.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Every (service, characteristic) bound to `component`, in registration order.
    pub fn bindings_of(
        &self,
        component: ComponentId,
    ) -> impl Iterator<Item = (&BleUuid, &CharacteristicDescriptor)> {
        self.services.iter().flat_map(move |service| {
            service
                .characteristics
                .iter()
                .filter(move |c| c.component == component)
                .map(move |c| (&service.uuid, c))
        })
    }

    pub fn characteristic_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
