//! GATT wire format and attribute table
//!
//! This module contains the encoding used on characteristic values and the
//! translation of the registry into the attribute table handed to the stack.

use crate::domain::component::{CharacteristicValue, ComponentArena, ValueKind};
use crate::domain::error::GattError;
use crate::domain::models::{SecurityMode, ServiceDescriptor};
use crate::domain::uuid::BleUuid;
use tracing::trace;

/// Client Characteristic Configuration Descriptor (assigned number 0x2902)
pub const CCCD_UUID: &str = "2902";

/// Characteristic properties advertised to peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristicSpec {
    pub uuid: BleUuid,
    pub properties: CharacteristicProperties,
    /// Descriptors attached to the characteristic (only the CCCD today).
    pub descriptors: Vec<BleUuid>,
    /// Access requires an encrypted, authenticated link.
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattServiceSpec {
    pub uuid: BleUuid,
    pub characteristics: Vec<GattCharacteristicSpec>,
}

/// Build the attribute table the stack advertises, in registry order.
pub fn build_attribute_table(
    services: &[ServiceDescriptor],
    components: &ComponentArena,
    security: SecurityMode,
) -> Vec<GattServiceSpec> {
    let encrypted = security.authentication_enabled();
    services
        .iter()
        .map(|service| GattServiceSpec {
            uuid: service.uuid.clone(),
            characteristics: service
                .characteristics
                .iter()
                .map(|c| {
                    let component = components.get(c.component);
                    let descriptors = if c.notify_enabled {
                        vec![cccd_uuid()]
                    } else {
                        Vec::new()
                    };
                    GattCharacteristicSpec {
                        uuid: c.uuid.clone(),
                        properties: CharacteristicProperties {
                            read: true,
                            write: component.is_writable(),
                            notify: c.notify_enabled,
                        },
                        descriptors,
                        encrypted,
                    }
                })
                .collect(),
        })
        .collect()
}

fn cccd_uuid() -> BleUuid {
    BleUuid::assigned(CCCD_UUID)
}

/// Encode a component value for the wire
///
/// ```text
/// Numeric : ASCII decimal, rounded to the component's accuracy ("21.5")
///           NaN (no state yet) is encoded as "nan"
/// Boolean : one byte, 0x00 / 0x01
/// Text    : UTF-8
/// ```
pub fn encode_value(kind: ValueKind, value: &CharacteristicValue) -> Vec<u8> {
    let bytes = match (kind, value) {
        (ValueKind::Numeric { accuracy_decimals }, CharacteristicValue::Number(n)) => {
            format_number(*n, accuracy_decimals).into_bytes()
        }
        (ValueKind::Boolean, CharacteristicValue::Bool(b)) => vec![u8::from(*b)],
        // Mismatched kinds fall back to the textual form.
        (_, other) => other.to_string().into_bytes(),
    };
    trace!("Encoded {:?} as {:02X?}", value, bytes);
    bytes
}

fn format_number(value: f64, accuracy_decimals: u8) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    format!("{:.*}", accuracy_decimals as usize, value)
}

/// Decode bytes written by a peer into a value for a component of `kind`
pub fn decode_value(
    name: &str,
    kind: ValueKind,
    bytes: &[u8],
) -> Result<CharacteristicValue, GattError> {
    let encoding = |reason: String| GattError::Encoding {
        name: name.to_string(),
        reason,
    };

    match kind {
        ValueKind::Boolean => match bytes {
            [0x00] => Ok(CharacteristicValue::Bool(false)),
            [0x01] => Ok(CharacteristicValue::Bool(true)),
            _ => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| encoding(e.to_string()))?
                    .trim()
                    .to_ascii_lowercase();
                match text.as_str() {
                    "1" | "true" | "on" => Ok(CharacteristicValue::Bool(true)),
                    "0" | "false" | "off" => Ok(CharacteristicValue::Bool(false)),
                    _ => Err(encoding(format!("not a boolean: {:?}", text))),
                }
            }
        },
        ValueKind::Numeric { .. } => {
            let text = std::str::from_utf8(bytes).map_err(|e| encoding(e.to_string()))?;
            text.trim()
                .parse::<f64>()
                .map(CharacteristicValue::Number)
                .map_err(|e| encoding(format!("{}: {:?}", e, text)))
        }
        ValueKind::Text => String::from_utf8(bytes.to_vec())
            .map(CharacteristicValue::Text)
            .map_err(|e| encoding(e.to_string())),
    }
}
