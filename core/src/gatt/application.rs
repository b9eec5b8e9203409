// Application — root of the GATT tree and source of the managed-object report

use std::collections::BTreeMap;
use uuid::Uuid;

use super::node::{child_path, Exportable, GattFlag, Interface, ManagedObjects, Properties};
use super::{AccessOptions, Characteristic, Descriptor, GattError, Service, WriteOutcome};
use crate::config::{PeripheralConfig, USER_DESCRIPTION_UUID};
use crate::message::MessageRouter;

/// Borrowed view of any node in the tree
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Application(&'a Application),
    Service(&'a Service),
    Characteristic(&'a Characteristic),
    Descriptor(&'a Descriptor),
}

impl NodeRef<'_> {
    fn exportable(&self) -> &dyn Exportable {
        match self {
            NodeRef::Application(node) => *node,
            NodeRef::Service(node) => *node,
            NodeRef::Characteristic(node) => *node,
            NodeRef::Descriptor(node) => *node,
        }
    }

    pub fn path(&self) -> &str {
        self.exportable().path()
    }

    pub fn interface(&self) -> Interface {
        self.exportable().interface()
    }

    pub fn get_properties(&self, interface: &str) -> Result<Properties, GattError> {
        self.exportable().get_properties(interface)
    }
}

#[derive(Debug, Clone)]
pub struct Application {
    path: String,
    services: Vec<Service>,
}

impl Application {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            services: Vec::new(),
        }
    }

    /// Build the AttentID tree: one primary service holding one characteristic
    /// with a user description descriptor.
    pub fn from_config(config: &PeripheralConfig) -> Self {
        let mut app = Application::new(config.application_path());
        let service = app.add_service(config.service_uuid, true);
        let characteristic = service.add_characteristic(
            config.characteristic_uuid,
            &config.characteristic_flags,
            config.initial_value.as_bytes().to_vec(),
        );
        characteristic.add_descriptor(
            USER_DESCRIPTION_UUID,
            &[GattFlag::Read],
            config.description.as_bytes().to_vec(),
        );
        characteristic.set_decoding(config.payload_decoding);
        app
    }

    /// Append a service; its path is `<app>/service<index>`
    pub fn add_service(&mut self, uuid: Uuid, primary: bool) -> &mut Service {
        let path = child_path(&self.path, "service", self.services.len());
        self.services.push(Service::new(path, uuid, primary));
        let last = self.services.len() - 1;
        &mut self.services[last]
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Every node path in tree order, the application first
    pub fn paths(&self) -> Vec<String> {
        let mut paths = vec![self.path.clone()];
        for service in &self.services {
            paths.push(service.path().to_string());
            for chr in service.characteristics() {
                paths.push(chr.path().to_string());
                paths.extend(chr.descriptors().iter().map(|d| d.path().to_string()));
            }
        }
        paths
    }

    /// Look a node up by path
    pub fn find(&self, path: &str) -> Option<NodeRef<'_>> {
        if path == self.path {
            return Some(NodeRef::Application(self));
        }
        for service in &self.services {
            if service.path() == path {
                return Some(NodeRef::Service(service));
            }
            for chr in service.characteristics() {
                if chr.path() == path {
                    return Some(NodeRef::Characteristic(chr));
                }
                if let Some(desc) = chr.descriptors().iter().find(|d| d.path() == path) {
                    return Some(NodeRef::Descriptor(desc));
                }
            }
        }
        None
    }

    pub fn characteristic_mut(&mut self, path: &str) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|service| service.characteristics_mut().iter_mut())
            .find(|chr| chr.path() == path)
    }

    /// Properties of the node at `path` for `interface`
    pub fn get_all(&self, path: &str, interface: &str) -> Result<Properties, GattError> {
        self.find(path)
            .ok_or_else(|| GattError::UnknownObject(path.to_string()))?
            .get_properties(interface)
    }

    /// Read the value of the characteristic or descriptor at `path`
    pub fn read_value(&self, path: &str, options: &AccessOptions) -> Result<Vec<u8>, GattError> {
        match self.find(path) {
            Some(NodeRef::Characteristic(chr)) => Ok(chr.read_value(options)),
            Some(NodeRef::Descriptor(desc)) => Ok(desc.read_value(options)),
            Some(_) => Err(GattError::NotSupported {
                path: path.to_string(),
                operation: "ReadValue",
            }),
            None => Err(GattError::UnknownObject(path.to_string())),
        }
    }

    /// Write to the characteristic at `path`
    pub fn write_value(
        &mut self,
        path: &str,
        bytes: &[u8],
        options: &AccessOptions,
        router: &MessageRouter,
    ) -> Result<WriteOutcome, GattError> {
        match self.find(path) {
            Some(NodeRef::Characteristic(_)) => {}
            Some(NodeRef::Descriptor(_)) => {
                return Err(GattError::NotPermitted {
                    path: path.to_string(),
                    operation: "WriteValue",
                })
            }
            Some(_) => {
                return Err(GattError::NotSupported {
                    path: path.to_string(),
                    operation: "WriteValue",
                })
            }
            None => return Err(GattError::UnknownObject(path.to_string())),
        }
        self.characteristic_mut(path)
            .ok_or_else(|| GattError::UnknownObject(path.to_string()))?
            .write_value(bytes, options, router)
    }

    /// Report of every service and characteristic; descriptors are left out
    pub fn get_managed_objects(&self) -> ManagedObjects {
        self.collect_managed_objects(false)
    }

    /// Same report with descriptors included
    pub fn get_managed_objects_with_descriptors(&self) -> ManagedObjects {
        self.collect_managed_objects(true)
    }

    fn collect_managed_objects(&self, descriptors: bool) -> ManagedObjects {
        let mut report = BTreeMap::new();
        for service in &self.services {
            report.insert(service.path().to_string(), service.report());
            for chr in service.characteristics() {
                report.insert(chr.path().to_string(), chr.report());
                if descriptors {
                    for desc in chr.descriptors() {
                        report.insert(desc.path().to_string(), desc.report());
                    }
                }
            }
        }
        report
    }
}

impl Exportable for Application {
    fn path(&self) -> &str {
        &self.path
    }

    fn interface(&self) -> Interface {
        Interface::ObjectManager
    }

    fn properties(&self) -> Properties {
        Properties::new()
    }
}
