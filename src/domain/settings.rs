use crate::domain::component::{
    BinarySensorComponent, ComponentArena, SensorComponent, SwitchComponent, TextSensorComponent,
};
use crate::domain::error::ConfigurationError;
use crate::domain::models::SecurityMode;
use crate::domain::uuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Logging configuration read from the `log_settings` key. Every field is
/// optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset ("info", "ble_controller=debug").
    pub level: String,
    /// Mirror logs into rolling files under `log_dir`.
    pub file_logging_enabled: bool,
    pub console_logging_enabled: bool,
    pub log_dir: String,
    pub file_name_prefix: String,
    /// "daily", "hourly", "minutely" or "never"
    pub rotation: String,
    /// Include source file and line in each record.
    pub show_file_line: bool,
    pub show_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging_enabled: false,
            console_logging_enabled: true,
            log_dir: "logs".to_string(),
            file_name_prefix: "ble_controller".to_string(),
            rotation: "daily".to_string(),
            show_file_line: false,
            show_target: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicSettings {
    pub characteristic: String,
    /// Id of the exposed component.
    pub exposes: String,
    #[serde(rename = "use_BLE2902", default = "default_true")]
    pub use_ble2902: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub service: String,
    pub characteristics: Vec<CharacteristicSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Sensor,
    BinarySensor,
    Switch,
    TextSensor,
}

/// Host component description, used by the simulator to stand in for the
/// firmware's own components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSettings {
    pub id: String,
    pub kind: ComponentKind,
    #[serde(default)]
    pub accuracy_decimals: u8,
}

/// Action run when a pairing event fires, the counterpart of a firmware
/// automation. `{pass_key}` and `{success}` in messages are substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TriggerAction {
    Log { message: String },
    Warn { message: String },
}

impl TriggerAction {
    /// Run the action with `placeholder` bound to `value`.
    pub fn run(&self, placeholder: &str, value: &str) -> anyhow::Result<()> {
        let pattern = format!("{{{}}}", placeholder);
        match self {
            TriggerAction::Log { message } => info!("{}", message.replace(&pattern, value)),
            TriggerAction::Warn { message } => warn!("{}", message.replace(&pattern, value)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    #[serde(default)]
    pub services: Vec<ServiceSettings>,

    #[serde(default)]
    pub security_mode: SecurityMode,

    #[serde(default)]
    pub components: Vec<ComponentSettings>,

    /// Actions run with the pass key to show. Needs `show_pass_key` security.
    #[serde(default)]
    pub on_show_pass_key: Vec<TriggerAction>,

    /// Actions run with the authentication result. Needs `show_pass_key` security.
    #[serde(default)]
    pub on_authentication_complete: Vec<TriggerAction>,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            security_mode: SecurityMode::ShowPassKey,
            components: Vec::new(),
            on_show_pass_key: Vec::new(),
            on_authentication_complete: Vec::new(),
            log_settings: LogSettings::default(),
        }
    }
}

impl ControllerSettings {
    /// Check every service and characteristic UUID. Runs before any
    /// controller is built so a bad file never half-configures one.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for service in &self.services {
            uuid::validate(&service.service)?;
            for characteristic in &service.characteristics {
                uuid::validate(&characteristic.characteristic)?;
            }
        }
        Ok(())
    }

    /// Instantiate the described components into a fresh arena.
    pub fn build_components(&self) -> Result<ComponentArena, ConfigurationError> {
        let mut arena = ComponentArena::new();
        for component in &self.components {
            let id = component.id.clone();
            match component.kind {
                ComponentKind::Sensor => arena.insert(Arc::new(SensorComponent::new(
                    id,
                    component.accuracy_decimals,
                )))?,
                ComponentKind::BinarySensor => {
                    arena.insert(Arc::new(BinarySensorComponent::new(id)))?
                }
                ComponentKind::Switch => arena.insert(Arc::new(SwitchComponent::new(id)))?,
                ComponentKind::TextSensor => {
                    arena.insert(Arc::new(TextSensorComponent::new(id)))?
                }
            };
        }
        Ok(arena)
    }
}

pub struct SettingsService {
    settings: ControllerSettings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the per-user config directory, falling back to defaults.
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::default_path()?;
        Ok(Self::load_or_default(settings_path))
    }

    /// Load from `path`, falling back to defaults when it cannot be read.
    pub fn load_or_default(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "Using default settings, could not load {}: {}",
                    settings_path.display(),
                    e
                );
                ControllerSettings::default()
            }
        };
        Self {
            settings,
            settings_path,
        }
    }

    /// Load from `path`, failing when it is missing or malformed.
    pub fn load(settings_path: PathBuf) -> anyhow::Result<Self> {
        let settings = Self::load_from_file(&settings_path)?;
        info!("Loaded settings from {}", settings_path.display());
        Ok(Self {
            settings,
            settings_path,
        })
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<ControllerSettings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut ControllerSettings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "security_mode": "none",
        "services": [
            {
                "service": "0000180d-0000-1000-8000-00805f9b34fb",
                "characteristics": [
                    { "characteristic": "2A37", "exposes": "heart_rate" },
                    { "characteristic": "2A38", "exposes": "relay", "use_BLE2902": false }
                ]
            }
        ],
        "components": [
            { "id": "heart_rate", "kind": "sensor", "accuracy_decimals": 1 },
            { "id": "relay", "kind": "switch" }
        ]
    }"#;

    #[test]
    fn parses_firmware_style_configuration() {
        let settings: ControllerSettings = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(settings.security_mode, SecurityMode::None);
        let chars = &settings.services[0].characteristics;
        assert!(chars[0].use_ble2902);
        assert!(!chars[1].use_ble2902);
        assert_eq!(settings.components[1].kind, ComponentKind::Switch);
        assert_eq!(settings.log_settings.level, "info");
        settings.validate().unwrap();
    }

    #[test]
    fn security_defaults_to_show_pass_key() {
        let settings: ControllerSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.security_mode, SecurityMode::ShowPassKey);
        assert!(settings.services.is_empty());
    }

    #[test]
    fn validate_names_bad_uuid() {
        let mut settings: ControllerSettings = serde_json::from_str(SAMPLE).unwrap();
        settings.services[0].characteristics[1].characteristic = "zz-top".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("zz-top"));
    }

    #[test]
    fn unknown_security_mode_is_rejected() {
        let parsed = serde_json::from_str::<ControllerSettings>(r#"{"security_mode": "bond"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn builds_described_components() {
        let settings: ControllerSettings = serde_json::from_str(SAMPLE).unwrap();
        let arena = settings.build_components().unwrap();
        assert_eq!(arena.len(), 2);
        let relay = arena.resolve("relay").unwrap();
        assert!(arena.get(relay).is_writable());
    }

    #[test]
    fn save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "ble_controller_settings_{}.json",
            std::process::id()
        ));
        let mut service = SettingsService::load_or_default(path.clone());
        service.get_mut().security_mode = SecurityMode::None;
        service.save().unwrap();

        let reloaded = SettingsService::load(path.clone()).unwrap();
        assert_eq!(reloaded.get().security_mode, SecurityMode::None);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("ble_controller_does_not_exist.json");
        let service = SettingsService::load_or_default(path);
        assert_eq!(service.get().security_mode, SecurityMode::ShowPassKey);
    }

    #[test]
    fn parses_trigger_actions() {
        let settings: ControllerSettings = serde_json::from_str(
            r#"{
                "on_show_pass_key": [{ "action": "log", "message": "Pass key {pass_key}" }],
                "on_authentication_complete": [{ "action": "warn", "message": "ok={success}" }]
            }"#,
        )
        .unwrap();
        assert_eq!(
            settings.on_show_pass_key,
            [TriggerAction::Log {
                message: "Pass key {pass_key}".to_string()
            }]
        );
        assert_eq!(settings.on_authentication_complete.len(), 1);
        assert!(settings.on_show_pass_key[0].run("pass_key", "000042").is_ok());
    }

    #[test]
    fn unknown_trigger_action_is_rejected() {
        let parsed = serde_json::from_str::<ControllerSettings>(
            r#"{"on_show_pass_key": [{ "action": "beep" }]}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn partial_log_settings_keep_defaults() {
        let settings: ControllerSettings =
            serde_json::from_str(r#"{"log_settings": {"level": "debug"}}"#).unwrap();
        assert_eq!(settings.log_settings.level, "debug");
        assert_eq!(settings.log_settings.rotation, "daily");
        assert!(settings.log_settings.console_logging_enabled);
    }
}
