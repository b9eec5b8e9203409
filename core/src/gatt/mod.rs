//! GATT object tree exported to the host BLE manager
//!
//! Application → Service → Characteristic → Descriptor, each node owned by
//! value by its parent. Children only remember their parent's path.

pub mod advertisement;
pub mod application;
pub mod characteristic;
pub mod descriptor;
pub mod dispatch;
pub mod node;
pub mod options;
pub mod service;

pub use advertisement::{AdvertisementDescriptor, AdvertisementType};
pub use application::{Application, NodeRef};
pub use characteristic::{Characteristic, WriteOutcome};
pub use descriptor::Descriptor;
pub use dispatch::{DispatchHandle, GattCommand, GattDispatcher};
pub use node::{
    Exportable, GattFlag, Interface, ManagedObjects, Properties, PropertyValue,
    GATT_CHARACTERISTIC_IFACE, GATT_DESCRIPTOR_IFACE, GATT_SERVICE_IFACE, LE_ADVERTISEMENT_IFACE,
    OBJECT_MANAGER_IFACE,
};
pub use options::AccessOptions;
pub use service::Service;

use thiserror::Error;

/// Errors for GATT tree operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("{path} does not implement {interface}")]
    InvalidInterface { path: String, interface: String },
    #[error("No object at {0}")]
    UnknownObject(String),
    #[error("{operation} is not supported on {path}")]
    NotSupported { path: String, operation: &'static str },
    #[error("{operation} is not permitted on {path}")]
    NotPermitted { path: String, operation: &'static str },
    #[error("Invalid offset {0}: partial writes are not supported")]
    InvalidOffset(u16),
    #[error("Device {0} is not authorized")]
    NotAuthorized(String),
    #[error("GATT dispatcher not running")]
    DispatcherUnavailable,
}
