// BlueZ implementation of BleManager over the system bus

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::ObjectPath;
use zbus::Connection;

use super::objects::{self, ExportedObject};
use super::proxies::{AdapterProxy, GattManagerProxy, LEAdvertisingManagerProxy};
use crate::config::PeripheralConfig;
use crate::gatt::{AdvertisementDescriptor, Application, DispatchHandle};
use crate::peripheral::{BleManager, PeripheralError};

const GATT_MANAGER_IFACE: &str = "org.bluez.GattManager1";
const ADVERTISING_MANAGER_IFACE: &str = "org.bluez.LEAdvertisingManager1";
const ADAPTER_IFACE: &str = "org.bluez.Adapter1";

fn object_path(path: &str) -> Result<ObjectPath<'_>, PeripheralError> {
    ObjectPath::try_from(path).map_err(|e| PeripheralError::Export(e.to_string()))
}

/// BLE manager backed by the BlueZ daemon
pub struct BluezManager {
    connection: Connection,
    adapter_name: Option<String>,
    include_descriptors: bool,
    exported: Mutex<Vec<ExportedObject>>,
}

impl BluezManager {
    pub fn new(connection: Connection, config: &PeripheralConfig) -> Self {
        Self {
            connection,
            adapter_name: config.adapter.clone(),
            include_descriptors: config.export_descriptors,
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Connect to the system bus
    pub async fn system(config: &PeripheralConfig) -> Result<Self, PeripheralError> {
        let connection = Connection::system()
            .await
            .map_err(|e| PeripheralError::ManagerUnavailable(e.to_string()))?;
        Ok(Self::new(connection, config))
    }
}

#[async_trait]
impl BleManager for BluezManager {
    async fn resolve_managers(&self) -> Result<String, PeripheralError> {
        let unavailable = |e: zbus::Error| PeripheralError::ManagerUnavailable(e.to_string());

        let om = ObjectManagerProxy::new(&self.connection, "org.bluez", "/")
            .await
            .map_err(unavailable)?;
        let objects = om
            .get_managed_objects()
            .await
            .map_err(|e| PeripheralError::ManagerUnavailable(e.to_string()))?;

        objects
            .into_iter()
            .find(|(path, interfaces)| {
                let has = |iface: &str| interfaces.keys().any(|name| name.as_str() == iface);
                let capable =
                    has(GATT_MANAGER_IFACE) && has(ADVERTISING_MANAGER_IFACE) && has(ADAPTER_IFACE);
                capable
                    && self
                        .adapter_name
                        .as_deref()
                        .map(|name| path.as_str().rsplit('/').next() == Some(name))
                        .unwrap_or(true)
            })
            .map(|(path, _)| path.to_string())
            .ok_or_else(|| {
                PeripheralError::ManagerUnavailable(match &self.adapter_name {
                    Some(name) => format!("adapter {} has no GATT/advertising manager", name),
                    None => "no adapter with GATT and advertising managers".to_string(),
                })
            })
    }

    async fn configure_adapter(&self, adapter: &str) -> Result<(), PeripheralError> {
        let failed = |e: zbus::Error| PeripheralError::AdapterConfiguration(e.to_string());

        let proxy = AdapterProxy::new(&self.connection, adapter)
            .await
            .map_err(failed)?;
        proxy.set_powered(true).await.map_err(failed)?;
        proxy.set_discoverable(true).await.map_err(failed)?;
        tracing::info!(adapter, "Adapter powered on and discoverable");
        Ok(())
    }

    async fn export_objects(
        &self,
        app: &Application,
        advertisement: &AdvertisementDescriptor,
        handle: &DispatchHandle,
    ) -> Result<(), PeripheralError> {
        let server = self.connection.object_server();
        let mut exported = self.exported.lock().await;
        objects::export(
            server,
            app,
            advertisement,
            handle,
            self.include_descriptors,
            &mut exported,
        )
        .await
        .map_err(|e| PeripheralError::Export(e.to_string()))
    }

    async fn unexport_objects(&self) {
        let exported = std::mem::take(&mut *self.exported.lock().await);
        objects::unexport(self.connection.object_server(), &exported).await;
    }

    async fn register_advertisement(
        &self,
        adapter: &str,
        advertisement: &str,
    ) -> Result<(), PeripheralError> {
        let failed = |e: zbus::Error| PeripheralError::RegistrationFailure(e.to_string());
        let proxy = LEAdvertisingManagerProxy::new(&self.connection, adapter)
            .await
            .map_err(failed)?;
        proxy
            .register_advertisement(&object_path(advertisement)?, HashMap::new())
            .await
            .map_err(failed)
    }

    async fn register_application(
        &self,
        adapter: &str,
        application: &str,
    ) -> Result<(), PeripheralError> {
        let failed = |e: zbus::Error| PeripheralError::RegistrationFailure(e.to_string());
        let proxy = GattManagerProxy::new(&self.connection, adapter)
            .await
            .map_err(failed)?;
        proxy
            .register_application(&object_path(application)?, HashMap::new())
            .await
            .map_err(failed)
    }

    async fn unregister(
        &self,
        adapter: &str,
        application: &str,
        advertisement: Option<String>,
    ) -> Result<(), PeripheralError> {
        let mut result = Ok(());

        if let Some(advertisement) = advertisement {
            let unregistered = async {
                LEAdvertisingManagerProxy::new(&self.connection, adapter)
                    .await?
                    .unregister_advertisement(&ObjectPath::try_from(advertisement.as_str())?)
                    .await
            };
            if let Err(e) = unregistered.await {
                tracing::warn!(path = %advertisement, "Failed to unregister advertisement: {}", e);
                result = Err(PeripheralError::RegistrationFailure(e.to_string()));
            }
        }

        let unregistered = async {
            GattManagerProxy::new(&self.connection, adapter)
                .await?
                .unregister_application(&ObjectPath::try_from(application)?)
                .await
        };
        if let Err(e) = unregistered.await {
            tracing::warn!(path = %application, "Failed to unregister application: {}", e);
            result = Err(PeripheralError::RegistrationFailure(e.to_string()));
        }

        self.unexport_objects().await;
        result
    }
}
