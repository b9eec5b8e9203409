// Service — ordered set of characteristics under one UUID

use uuid::Uuid;

use super::node::{child_path, Exportable, GattFlag, Interface, Properties, PropertyValue};
use super::Characteristic;

#[derive(Debug, Clone)]
pub struct Service {
    path: String,
    uuid: Uuid,
    primary: bool,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub(crate) fn new(path: String, uuid: Uuid, primary: bool) -> Self {
        Self {
            path,
            uuid,
            primary,
            characteristics: Vec::new(),
        }
    }

    /// Append a characteristic; its path is `<service>/char<index>`
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        flags: &[GattFlag],
        initial_value: Vec<u8>,
    ) -> &mut Characteristic {
        let path = child_path(&self.path, "char", self.characteristics.len());
        self.characteristics.push(Characteristic::new(
            path,
            uuid,
            flags,
            &self.path,
            initial_value,
        ));
        let last = self.characteristics.len() - 1;
        &mut self.characteristics[last]
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub(crate) fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.characteristics
    }
}

impl Exportable for Service {
    fn path(&self) -> &str {
        &self.path
    }

    fn interface(&self) -> Interface {
        Interface::GattService
    }

    fn properties(&self) -> Properties {
        Properties::from([
            ("UUID".to_string(), PropertyValue::Str(self.uuid.to_string())),
            ("Primary".to_string(), PropertyValue::Bool(self.primary)),
            (
                "Characteristics".to_string(),
                PropertyValue::ObjectPathList(
                    self.characteristics
                        .iter()
                        .map(|c| c.path().to_string())
                        .collect(),
                ),
            ),
        ])
    }
}
