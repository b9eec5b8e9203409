// Per-call options carried by ReadValue / WriteValue

use crate::identity::address_from_device_path;
use crate::message::UNKNOWN_DEVICE;

/// Options of a single read or write request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessOptions {
    /// Device object path or address of the requesting central
    pub device: Option<String>,
    pub offset: u16,
    pub mtu: Option<u16>,
}

impl AccessOptions {
    pub fn from_device(device: impl Into<String>) -> Self {
        Self {
            device: Some(device.into()),
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }

    /// Identifier handed to the router.
    ///
    /// A device object path (`.../dev_AA_BB_CC_DD_EE_FF`) becomes a colon
    /// separated address, any other string is used as is, and a missing or
    /// empty option falls back to `unknown-device`.
    pub fn device_id(&self) -> String {
        match self.device.as_deref() {
            Some(device) if !device.is_empty() => {
                address_from_device_path(device).unwrap_or_else(|| device.to_string())
            }
            _ => UNKNOWN_DEVICE.to_string(),
        }
    }
}
