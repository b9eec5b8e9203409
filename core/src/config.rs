// Peripheral configuration
//
// Everything that used to be a module-level constant (UUIDs, advertisement
// strings, object paths) lives here and is handed to constructors explicitly.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::gatt::GattFlag;

/// Custom AttentID service UUID
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xA07498CA_AD5B_474E_940D_16F7609C2A69);

/// Custom AttentID characteristic UUID
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// Characteristic User Description (0x2901) in 128-bit form
pub const USER_DESCRIPTION_UUID: Uuid = Uuid::from_u128(0x00002901_0000_1000_8000_00805F9B34FB);

/// Value served by the characteristic before any write
pub const DEFAULT_INITIAL_VALUE: &str = "AttentID Ready";

/// Text served by the user description descriptor
pub const DEFAULT_DESCRIPTION: &str = "AttentID Communication Channel";

/// Advertised local name
pub const DEFAULT_LOCAL_NAME: &str = "AttentID Server";

/// Root under which the application and advertisement objects are exported
pub const DEFAULT_OBJECT_ROOT: &str = "/org/bluez/attentid";

/// Default passive scan window in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;

/// Errors for configuration validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Local name must not be empty")]
    EmptyLocalName,
    #[error("Invalid object root: {0}")]
    InvalidObjectRoot(String),
    #[error("Characteristic flags must not be empty")]
    EmptyFlags,
    #[error("Invalid scan configuration: {0}")]
    InvalidScanConfig(String),
}

/// Whether write/scan events authenticate the sender before acting on them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Log the event only; the verifier is never consulted
    #[default]
    Disabled,
    /// Verify and log the verdict, but act on the payload regardless
    Audit,
    /// Reject events from senders that do not match a known address
    Enforce,
}

/// How written bytes are turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDecoding {
    /// One byte per code point (U+0000..=U+00FF); never fails
    #[default]
    Latin1,
    /// 7-bit only; any byte above 0x7F is a decode failure
    Ascii,
    /// Strict UTF-8
    Utf8,
}

/// Immutable configuration of the peripheral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub characteristic_flags: Vec<GattFlag>,
    pub initial_value: String,
    pub description: String,
    pub local_name: String,
    pub object_root: String,
    /// Adapter name such as `hci0`; `None` picks the first suitable adapter
    pub adapter: Option<String>,
    pub known_addresses: Vec<String>,
    pub auth_policy: AuthPolicy,
    pub payload_decoding: PayloadDecoding,
    /// Also report descriptors from GetManagedObjects on the bus
    pub export_descriptors: bool,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            characteristic_flags: vec![GattFlag::Read, GattFlag::Write, GattFlag::Notify],
            initial_value: DEFAULT_INITIAL_VALUE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            object_root: DEFAULT_OBJECT_ROOT.to_string(),
            adapter: None,
            known_addresses: Vec::new(),
            auth_policy: AuthPolicy::default(),
            payload_decoding: PayloadDecoding::default(),
            export_descriptors: false,
        }
    }
}

impl PeripheralConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_name.trim().is_empty() {
            return Err(ConfigError::EmptyLocalName);
        }
        if self.characteristic_flags.is_empty() {
            return Err(ConfigError::EmptyFlags);
        }
        if !is_object_path(&self.object_root) {
            return Err(ConfigError::InvalidObjectRoot(self.object_root.clone()));
        }
        Ok(())
    }

    /// Path of the application root object
    pub fn application_path(&self) -> String {
        format!("{}/app0", self.object_root)
    }

    /// Path of the advertisement object
    pub fn advertisement_path(&self) -> String {
        format!("{}/advertisement0", self.object_root)
    }
}

/// What happens to in-flight scan work once the scan window closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ShutdownPolicy {
    /// Wait up to `grace_ms` for running units, then abort the rest
    Drain { grace_ms: u64 },
    /// Abort every running unit immediately
    Abandon,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Drain { grace_ms: 2_000 }
    }
}

/// Passive scan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub timeout_secs: u64,
    /// Upper bound on concurrently running detection handlers
    pub max_in_flight: usize,
    pub shutdown: ShutdownPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            max_in_flight: 64,
            shutdown: ShutdownPolicy::default(),
        }
    }
}

impl ScanConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidScanConfig(
                "Scan timeout must be > 0".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidScanConfig(
                "max_in_flight must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// D-Bus object path syntax: absolute, `[A-Za-z0-9_]` elements, no trailing slash
pub(crate) fn is_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    rest.split('/').all(|element| {
        !element.is_empty()
            && element
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
