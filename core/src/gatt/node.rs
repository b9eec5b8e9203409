//! Exportable node abstraction shared by every object in the GATT tree
//!
//! A node reports its properties for exactly one interface. Paths are
//! assigned once, at construction, as `parent + "/" + prefix + index`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::GattError;

pub const GATT_SERVICE_IFACE: &str = "org.bluez.GattService1";
pub const GATT_CHARACTERISTIC_IFACE: &str = "org.bluez.GattCharacteristic1";
pub const GATT_DESCRIPTOR_IFACE: &str = "org.bluez.GattDescriptor1";
pub const LE_ADVERTISEMENT_IFACE: &str = "org.bluez.LEAdvertisement1";
pub const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// Interface identity a node exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    GattService,
    GattCharacteristic,
    GattDescriptor,
    LeAdvertisement,
    ObjectManager,
}

impl Interface {
    pub fn name(&self) -> &'static str {
        match self {
            Interface::GattService => GATT_SERVICE_IFACE,
            Interface::GattCharacteristic => GATT_CHARACTERISTIC_IFACE,
            Interface::GattDescriptor => GATT_DESCRIPTOR_IFACE,
            Interface::LeAdvertisement => LE_ADVERTISEMENT_IFACE,
            Interface::ObjectManager => OBJECT_MANAGER_IFACE,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability tag on a characteristic or descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GattFlag {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    Notify,
    Indicate,
    AuthenticatedSignedWrites,
    ReliableWrite,
    WritableAuxiliaries,
}

impl GattFlag {
    /// Flag spelling used by BlueZ
    pub fn as_str(&self) -> &'static str {
        match self {
            GattFlag::Broadcast => "broadcast",
            GattFlag::Read => "read",
            GattFlag::WriteWithoutResponse => "write-without-response",
            GattFlag::Write => "write",
            GattFlag::Notify => "notify",
            GattFlag::Indicate => "indicate",
            GattFlag::AuthenticatedSignedWrites => "authenticated-signed-writes",
            GattFlag::ReliableWrite => "reliable-write",
            GattFlag::WritableAuxiliaries => "writable-auxiliaries",
        }
    }
}

/// Drop repeated flags, keeping first occurrence order
pub(crate) fn dedup_flags(flags: &[GattFlag]) -> Vec<GattFlag> {
    let mut out: Vec<GattFlag> = Vec::with_capacity(flags.len());
    for flag in flags {
        if !out.contains(flag) {
            out.push(*flag);
        }
    }
    out
}

pub(crate) fn flag_names(flags: &[GattFlag]) -> Vec<String> {
    flags.iter().map(|f| f.as_str().to_string()).collect()
}

/// One exported property value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    ObjectPath(String),
    StrList(Vec<String>),
    ObjectPathList(Vec<String>),
    ManufacturerData(BTreeMap<u16, Vec<u8>>),
    ServiceData(BTreeMap<String, Vec<u8>>),
}

/// Property name -> value
pub type Properties = BTreeMap<String, PropertyValue>;

/// Object path -> interface name -> properties
pub type ManagedObjects = BTreeMap<String, BTreeMap<String, Properties>>;

/// Capability every node in the tree implements
pub trait Exportable {
    /// Stable hierarchical path
    fn path(&self) -> &str;

    /// The single interface this node exports
    fn interface(&self) -> Interface;

    /// Full property mapping for `interface()`
    fn properties(&self) -> Properties;

    /// Property mapping for `interface`, or `InvalidInterface` if the node does not export it
    fn get_properties(&self, interface: &str) -> Result<Properties, GattError> {
        if interface != self.interface().name() {
            return Err(GattError::InvalidInterface {
                path: self.path().to_string(),
                interface: interface.to_string(),
            });
        }
        Ok(self.properties())
    }

    /// `{ interface: properties }` entry as it appears in a managed-object report
    fn report(&self) -> BTreeMap<String, Properties> {
        BTreeMap::from([(self.interface().name().to_string(), self.properties())])
    }
}

/// Path of the `index`-th child of `parent`
pub(crate) fn child_path(parent: &str, prefix: &str, index: usize) -> String {
    format!("{}/{}{}", parent, prefix, index)
}

/// Slice of `value` starting at `offset`; empty once past the end
pub(crate) fn slice_from(value: &[u8], offset: u16) -> Vec<u8> {
    value.get(offset as usize..).unwrap_or_default().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_names_match_bluez() {
        let flags = [GattFlag::Read, GattFlag::WriteWithoutResponse, GattFlag::Notify];
        assert_eq!(
            flag_names(&flags),
            vec!["read", "write-without-response", "notify"]
        );
    }

    #[test]
    fn test_flag_serde_uses_bluez_spelling() {
        let json = serde_json::to_string(&GattFlag::WriteWithoutResponse).unwrap();
        assert_eq!(json, "\"write-without-response\"");
        let flag: GattFlag = serde_json::from_str("\"notify\"").unwrap();
        assert_eq!(flag, GattFlag::Notify);
    }

    #[test]
    fn test_dedup_flags_keeps_order() {
        let flags = [GattFlag::Write, GattFlag::Read, GattFlag::Write];
        assert_eq!(dedup_flags(&flags), vec![GattFlag::Write, GattFlag::Read]);
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/a/app0", "service", 0), "/a/app0/service0");
        assert_eq!(child_path("/a/app0/service0", "char", 12), "/a/app0/service0/char12");
    }

    #[test]
    fn test_slice_from() {
        assert_eq!(slice_from(b"ABC", 0), b"ABC".to_vec());
        assert_eq!(slice_from(b"ABC", 2), b"C".to_vec());
        assert_eq!(slice_from(b"ABC", 3), Vec::<u8>::new());
        assert_eq!(slice_from(b"ABC", 9), Vec::<u8>::new());
    }
}
