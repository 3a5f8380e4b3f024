//! BLE UUID text validation.
//!
//! Accepts 8 to 36 hex digits and hyphens, which covers both the full
//! hyphenated 128-bit form and the abbreviated forms used in firmware
//! configuration. 16-bit shorthand such as `180D` is also accepted.

use crate::domain::error::UuidError;
use std::fmt;
use std::str::FromStr;

pub const MIN_UUID_LEN: usize = 8;
pub const MAX_UUID_LEN: usize = 36;

/// Shortest form accepted for assigned-number shorthand (`180D`, `2A37`).
const SHORT_UUID_LEN: usize = 4;

/// A validated BLE UUID. Equality ignores hex digit case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BleUuid(String);

impl BleUuid {
    /// Bluetooth SIG assigned number, known to be well formed.
    pub(crate) fn assigned(short: &'static str) -> Self {
        BleUuid(short.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for 16-bit assigned-number shorthand.
    pub fn is_short(&self) -> bool {
        self.0.len() == SHORT_UUID_LEN
    }
}

/// Validate `text` as a BLE UUID.
pub fn validate(text: &str) -> Result<BleUuid, UuidError> {
    let len = text.len();
    let length_ok = (MIN_UUID_LEN..=MAX_UUID_LEN).contains(&len) || len == SHORT_UUID_LEN;
    let chars_ok = text.chars().all(|c| c.is_ascii_hexdigit() || c == '-');

    if !(length_ok && chars_ok) {
        return Err(UuidError::InvalidFormat(text.to_string()));
    }

    Ok(BleUuid(text.to_ascii_lowercase()))
}

impl FromStr for BleUuid {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)
    }
}

impl TryFrom<&str> for BleUuid {
    type Error = UuidError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_ascii_uppercase())
    }
}
