//! Application components exposed through GATT characteristics.
//!
//! The controller never owns a component. The host keeps its own `Arc` and
//! the [`ComponentArena`] resolves names to stable [`ComponentId`]s once,
//! when characteristics are registered.

use crate::domain::error::ConfigurationError;
use crate::domain::models::ComponentId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Scalar value produced or accepted by a component.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacteristicValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::Number(n) => write!(f, "{}", n),
            CharacteristicValue::Bool(b) => write!(f, "{}", b),
            CharacteristicValue::Text(s) => f.write_str(s),
        }
    }
}

/// Wire shape of a component's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric { accuracy_decimals: u8 },
    Boolean,
    Text,
}

/// Anything the host application wants to expose over BLE.
pub trait ExposedComponent: Send + Sync {
    fn name(&self) -> &str;

    fn value_kind(&self) -> ValueKind;

    /// Current value of the component.
    fn read(&self) -> anyhow::Result<CharacteristicValue>;

    fn is_writable(&self) -> bool {
        false
    }

    /// Apply a value written by a peer. Only called when [`is_writable`](Self::is_writable).
    fn write(&self, _value: CharacteristicValue) -> anyhow::Result<()> {
        anyhow::bail!("component {} is read-only", self.name())
    }
}

/// Name-indexed store of component handles.
#[derive(Default)]
pub struct ComponentArena {
    components: Vec<Arc<dyn ExposedComponent>>,
    by_name: HashMap<String, ComponentId>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component under its own name.
    pub fn insert(
        &mut self,
        component: Arc<dyn ExposedComponent>,
    ) -> Result<ComponentId, ConfigurationError> {
        let name = component.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(ConfigurationError::DuplicateComponent(name));
        }
        let id = ComponentId(self.components.len());
        self.components.push(component);
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn resolve(&self, name: &str) -> Result<ComponentId, ConfigurationError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownComponent(name.to_string()))
    }

    /// Ids are only handed out by this arena, so lookup cannot miss.
    pub fn get(&self, id: ComponentId) -> &Arc<dyn ExposedComponent> {
        &self.components[id.0]
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Numeric, read-only component (temperature, humidity, ...).
pub struct SensorComponent {
    name: String,
    accuracy_decimals: u8,
    state: Mutex<f64>,
}

impl SensorComponent {
    pub fn new(name: impl Into<String>, accuracy_decimals: u8) -> Self {
        Self {
            name: name.into(),
            accuracy_decimals,
            state: Mutex::new(f64::NAN),
        }
    }

    pub fn publish_state(&self, value: f64) {
        if let Ok(mut state) = self.state.lock() {
            *state = value;
        }
    }
}

impl ExposedComponent for SensorComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Numeric {
            accuracy_decimals: self.accuracy_decimals,
        }
    }

    fn read(&self) -> anyhow::Result<CharacteristicValue> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        Ok(CharacteristicValue::Number(*state))
    }
}

/// On/off state reported by the host, read-only for peers.
pub struct BinarySensorComponent {
    name: String,
    state: Mutex<bool>,
}

impl BinarySensorComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(false),
        }
    }

    pub fn publish_state(&self, value: bool) {
        if let Ok(mut state) = self.state.lock() {
            *state = value;
        }
    }
}

impl ExposedComponent for BinarySensorComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Boolean
    }

    fn read(&self) -> anyhow::Result<CharacteristicValue> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        Ok(CharacteristicValue::Bool(*state))
    }
}

/// Writable on/off component.
pub struct SwitchComponent {
    name: String,
    state: Mutex<bool>,
}

impl SwitchComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(false),
        }
    }

    pub fn state(&self) -> bool {
        self.state.lock().map(|s| *s).unwrap_or(false)
    }
}

impl ExposedComponent for SwitchComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Boolean
    }

    fn read(&self) -> anyhow::Result<CharacteristicValue> {
        Ok(CharacteristicValue::Bool(self.state()))
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn write(&self, value: CharacteristicValue) -> anyhow::Result<()> {
        let CharacteristicValue::Bool(on) = value else {
            anyhow::bail!("switch {} expects a boolean, got {:?}", self.name, value);
        };
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        *state = on;
        Ok(())
    }
}

/// Free-form text reported by the host.
pub struct TextSensorComponent {
    name: String,
    state: Mutex<String>,
}

impl TextSensorComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(String::new()),
        }
    }

    pub fn publish_state(&self, value: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            *state = value.into();
        }
    }
}

impl ExposedComponent for TextSensorComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_kind(&self) -> ValueKind {
        ValueKind::Text
    }

    fn read(&self) -> anyhow::Result<CharacteristicValue> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        Ok(CharacteristicValue::Text(state.clone()))
    }
}
