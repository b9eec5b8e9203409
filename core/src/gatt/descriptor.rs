// Descriptor — read-only metadata attached to a characteristic

use uuid::Uuid;

use super::node::{dedup_flags, flag_names, slice_from, Exportable, GattFlag, Interface};
use super::node::{Properties, PropertyValue};
use super::AccessOptions;

#[derive(Debug, Clone)]
pub struct Descriptor {
    path: String,
    uuid: Uuid,
    flags: Vec<GattFlag>,
    characteristic: String,
    value: Vec<u8>,
}

impl Descriptor {
    pub(crate) fn new(
        path: String,
        uuid: Uuid,
        flags: &[GattFlag],
        characteristic: &str,
        value: Vec<u8>,
    ) -> Self {
        Self {
            path,
            uuid,
            flags: dedup_flags(flags),
            characteristic: characteristic.to_string(),
            value,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn flags(&self) -> &[GattFlag] {
        &self.flags
    }

    /// Path of the owning characteristic
    pub fn characteristic_path(&self) -> &str {
        &self.characteristic
    }

    /// Fixed payload set at construction
    pub fn read_value(&self, options: &AccessOptions) -> Vec<u8> {
        tracing::debug!(path = %self.path, offset = options.offset, "Descriptor read");
        slice_from(&self.value, options.offset)
    }
}

impl Exportable for Descriptor {
    fn path(&self) -> &str {
        &self.path
    }

    fn interface(&self) -> Interface {
        Interface::GattDescriptor
    }

    fn properties(&self) -> Properties {
        Properties::from([
            ("UUID".to_string(), PropertyValue::Str(self.uuid.to_string())),
            (
                "Characteristic".to_string(),
                PropertyValue::ObjectPath(self.characteristic.clone()),
            ),
            (
                "Flags".to_string(),
                PropertyValue::StrList(flag_names(&self.flags)),
            ),
        ])
    }
}
