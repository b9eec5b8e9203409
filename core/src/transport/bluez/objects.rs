// Bus-side objects exported for BlueZ
//
// Tree objects hold only their path and a dispatcher handle: property reads,
// ReadValue / WriteValue and GetManagedObjects are all answered by the
// dispatcher, so the bus shows exactly what the tree exports.

use std::collections::HashMap;
use zbus::object_server::{Interface as BusInterface, ObjectServer};
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::{fdo, interface, DBusError};

use crate::gatt::{
    AccessOptions, AdvertisementDescriptor, Application, DispatchHandle, Exportable, GattError,
    Interface, ManagedObjects, Properties, PropertyValue, LE_ADVERTISEMENT_IFACE,
};

/// Errors returned to BlueZ
#[derive(Debug, DBusError)]
#[zbus(prefix = "org.bluez.Error")]
pub enum BluezError {
    #[zbus(error)]
    ZBus(zbus::Error),
    Failed(String),
    InvalidArguments(String),
    NotAuthorized(String),
    InvalidOffset(String),
    NotSupported(String),
    NotPermitted(String),
}

impl From<GattError> for BluezError {
    fn from(e: GattError) -> Self {
        let message = e.to_string();
        match e {
            GattError::InvalidInterface { .. } => BluezError::InvalidArguments(message),
            GattError::InvalidOffset(_) => BluezError::InvalidOffset(message),
            GattError::NotAuthorized(_) => BluezError::NotAuthorized(message),
            GattError::NotSupported { .. } => BluezError::NotSupported(message),
            GattError::NotPermitted { .. } => BluezError::NotPermitted(message),
            GattError::UnknownObject(_) | GattError::DispatcherUnavailable => {
                BluezError::Failed(message)
            }
        }
    }
}

/// Object path -> interface -> property -> value, as GetManagedObjects returns it
pub type BusManagedObjects = HashMap<OwnedObjectPath, HashMap<String, HashMap<String, OwnedValue>>>;

fn object_path(path: &str) -> zbus::zvariant::Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(path.to_string())
}

fn bytes_value(bytes: &[u8]) -> Value<'static> {
    Value::from(bytes.to_vec())
}

pub(crate) fn to_owned_value(value: &PropertyValue) -> zbus::zvariant::Result<OwnedValue> {
    let value: Value<'_> = match value {
        PropertyValue::Bool(b) => Value::from(*b),
        PropertyValue::Str(s) => Value::from(s.as_str()),
        PropertyValue::ObjectPath(path) => Value::from(ObjectPath::try_from(path.as_str())?),
        PropertyValue::StrList(list) => Value::from(list.clone()),
        PropertyValue::ObjectPathList(list) => Value::from(
            list.iter()
                .map(|path| ObjectPath::try_from(path.as_str()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        PropertyValue::ManufacturerData(data) => Value::from(
            data.iter()
                .map(|(company, bytes)| (*company, bytes_value(bytes)))
                .collect::<HashMap<u16, Value<'_>>>(),
        ),
        PropertyValue::ServiceData(data) => Value::from(
            data.iter()
                .map(|(uuid, bytes)| (uuid.clone(), bytes_value(bytes)))
                .collect::<HashMap<String, Value<'_>>>(),
        ),
    };
    value.try_to_owned()
}

pub(crate) fn to_bus_objects(report: &ManagedObjects) -> zbus::zvariant::Result<BusManagedObjects> {
    let mut objects = HashMap::with_capacity(report.len());
    for (path, interfaces) in report {
        let mut bus_interfaces = HashMap::with_capacity(interfaces.len());
        for (interface, properties) in interfaces {
            let mut bus_properties = HashMap::with_capacity(properties.len());
            for (name, value) in properties {
                bus_properties.insert(name.clone(), to_owned_value(value)?);
            }
            bus_interfaces.insert(interface.clone(), bus_properties);
        }
        objects.insert(object_path(path)?, bus_interfaces);
    }
    Ok(objects)
}

/// Parse the `a{sv}` options BlueZ passes to ReadValue / WriteValue
pub(crate) fn access_options(options: &HashMap<String, OwnedValue>) -> AccessOptions {
    let u16_option = |key: &str| match options.get(key).map(|v| &**v) {
        Some(Value::U16(n)) => Some(*n),
        _ => None,
    };
    let device = match options.get("device").map(|v| &**v) {
        Some(Value::ObjectPath(path)) => Some(path.to_string()),
        Some(Value::Str(device)) => Some(device.to_string()),
        _ => None,
    };
    AccessOptions {
        device,
        offset: u16_option("offset").unwrap_or(0),
        mtu: u16_option("mtu"),
    }
}

/// Application root; answers GetManagedObjects
pub struct ApplicationObject {
    handle: DispatchHandle,
    include_descriptors: bool,
}

#[interface(name = "org.freedesktop.DBus.ObjectManager")]
impl ApplicationObject {
    async fn get_managed_objects(&self) -> Result<BusManagedObjects, BluezError> {
        let report = self.handle.managed_objects(self.include_descriptors).await?;
        to_bus_objects(&report).map_err(|e| BluezError::Failed(e.to_string()))
    }
}

/// Bus type a `PropertyValue` converts into
trait FromProperty: Sized {
    fn from_property(value: PropertyValue) -> Option<Self>;
}

impl FromProperty for String {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl FromProperty for bool {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromProperty for OwnedObjectPath {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::ObjectPath(path) => object_path(&path).ok(),
            _ => None,
        }
    }
}

impl FromProperty for Vec<String> {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::StrList(list) => Some(list),
            _ => None,
        }
    }
}

impl FromProperty for Vec<OwnedObjectPath> {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::ObjectPathList(list) => list
                .iter()
                .map(|path| object_path(path))
                .collect::<Result<_, _>>()
                .ok(),
            _ => None,
        }
    }
}

impl FromProperty for HashMap<u16, OwnedValue> {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::ManufacturerData(data) => data
                .iter()
                .map(|(company, bytes)| -> zbus::zvariant::Result<(u16, OwnedValue)> {
                    Ok((*company, bytes_value(bytes).try_to_owned()?))
                })
                .collect::<zbus::zvariant::Result<_>>()
                .ok(),
            _ => None,
        }
    }
}

impl FromProperty for HashMap<String, OwnedValue> {
    fn from_property(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::ServiceData(data) => data
                .iter()
                .map(|(uuid, bytes)| -> zbus::zvariant::Result<(String, OwnedValue)> {
                    Ok((uuid.clone(), bytes_value(bytes).try_to_owned()?))
                })
                .collect::<zbus::zvariant::Result<_>>()
                .ok(),
            _ => None,
        }
    }
}

/// Errors for property reads, which answer on org.freedesktop.DBus.Properties
pub(crate) fn property_error(e: GattError) -> fdo::Error {
    let message = e.to_string();
    match e {
        GattError::InvalidInterface { .. } => fdo::Error::InvalidArgs(message),
        GattError::UnknownObject(_) => fdo::Error::UnknownObject(message),
        GattError::NotAuthorized(_) => fdo::Error::AccessDenied(message),
        GattError::NotSupported { .. } => fdo::Error::NotSupported(message),
        _ => fdo::Error::Failed(message),
    }
}

/// Pull `name` out of a property mapping. A property the node leaves out
/// answers UnknownProperty, and GetAll skips it.
fn take_property<T: FromProperty>(mut props: Properties, name: &str) -> fdo::Result<T> {
    let value = props
        .remove(name)
        .ok_or_else(|| fdo::Error::UnknownProperty(format!("{} is not set", name)))?;
    T::from_property(value)
        .ok_or_else(|| fdo::Error::Failed(format!("{} has an unexpected type", name)))
}

/// Read one property of a tree node through the dispatcher
async fn dispatched<T: FromProperty>(
    handle: &DispatchHandle,
    path: &str,
    interface: Interface,
    name: &str,
) -> fdo::Result<T> {
    let props = handle
        .get_all(path, interface.name())
        .await
        .map_err(property_error)?;
    take_property(props, name)
}

pub struct ServiceObject {
    path: String,
    handle: DispatchHandle,
}

#[interface(name = "org.bluez.GattService1")]
impl ServiceObject {
    #[zbus(property, name = "UUID")]
    async fn uuid(&self) -> fdo::Result<String> {
        dispatched(&self.handle, &self.path, Interface::GattService, "UUID").await
    }

    #[zbus(property)]
    async fn primary(&self) -> fdo::Result<bool> {
        dispatched(&self.handle, &self.path, Interface::GattService, "Primary").await
    }

    #[zbus(property)]
    async fn characteristics(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        dispatched(
            &self.handle,
            &self.path,
            Interface::GattService,
            "Characteristics",
        )
        .await
    }
}

pub struct CharacteristicObject {
    path: String,
    handle: DispatchHandle,
}

#[interface(name = "org.bluez.GattCharacteristic1")]
impl CharacteristicObject {
    #[zbus(property, name = "UUID")]
    async fn uuid(&self) -> fdo::Result<String> {
        dispatched(&self.handle, &self.path, Interface::GattCharacteristic, "UUID").await
    }

    #[zbus(property)]
    async fn service(&self) -> fdo::Result<OwnedObjectPath> {
        dispatched(
            &self.handle,
            &self.path,
            Interface::GattCharacteristic,
            "Service",
        )
        .await
    }

    #[zbus(property)]
    async fn flags(&self) -> fdo::Result<Vec<String>> {
        dispatched(&self.handle, &self.path, Interface::GattCharacteristic, "Flags").await
    }

    #[zbus(property)]
    async fn descriptors(&self) -> fdo::Result<Vec<OwnedObjectPath>> {
        dispatched(
            &self.handle,
            &self.path,
            Interface::GattCharacteristic,
            "Descriptors",
        )
        .await
    }

    async fn read_value(
        &self,
        options: HashMap<String, OwnedValue>,
    ) -> Result<Vec<u8>, BluezError> {
        Ok(self
            .handle
            .read_value(&self.path, access_options(&options))
            .await?)
    }

    async fn write_value(
        &self,
        value: Vec<u8>,
        options: HashMap<String, OwnedValue>,
    ) -> Result<(), BluezError> {
        self.handle
            .write_value(&self.path, value, access_options(&options))
            .await?;
        Ok(())
    }
}

pub struct DescriptorObject {
    path: String,
    handle: DispatchHandle,
}

#[interface(name = "org.bluez.GattDescriptor1")]
impl DescriptorObject {
    #[zbus(property, name = "UUID")]
    async fn uuid(&self) -> fdo::Result<String> {
        dispatched(&self.handle, &self.path, Interface::GattDescriptor, "UUID").await
    }

    #[zbus(property)]
    async fn characteristic(&self) -> fdo::Result<OwnedObjectPath> {
        dispatched(
            &self.handle,
            &self.path,
            Interface::GattDescriptor,
            "Characteristic",
        )
        .await
    }

    #[zbus(property)]
    async fn flags(&self) -> fdo::Result<Vec<String>> {
        dispatched(&self.handle, &self.path, Interface::GattDescriptor, "Flags").await
    }

    async fn read_value(
        &self,
        options: HashMap<String, OwnedValue>,
    ) -> Result<Vec<u8>, BluezError> {
        Ok(self
            .handle
            .read_value(&self.path, access_options(&options))
            .await?)
    }

    async fn write_value(
        &self,
        value: Vec<u8>,
        options: HashMap<String, OwnedValue>,
    ) -> Result<(), BluezError> {
        self.handle
            .write_value(&self.path, value, access_options(&options))
            .await?;
        Ok(())
    }
}

/// The advertisement lives outside the dispatched tree and answers from its own descriptor
pub struct AdvertisementObject {
    ad: AdvertisementDescriptor,
}

impl AdvertisementObject {
    fn property<T: FromProperty>(&self, name: &str) -> fdo::Result<T> {
        let props = self
            .ad
            .get_properties(LE_ADVERTISEMENT_IFACE)
            .map_err(property_error)?;
        take_property(props, name)
    }
}

#[interface(name = "org.bluez.LEAdvertisement1")]
impl AdvertisementObject {
    #[zbus(property, name = "Type")]
    fn ad_type(&self) -> fdo::Result<String> {
        self.property("Type")
    }

    #[zbus(property, name = "ServiceUUIDs")]
    fn service_uuids(&self) -> fdo::Result<Vec<String>> {
        self.property("ServiceUUIDs")
    }

    #[zbus(property, name = "SolicitUUIDs")]
    fn solicit_uuids(&self) -> fdo::Result<Vec<String>> {
        self.property("SolicitUUIDs")
    }

    #[zbus(property)]
    fn manufacturer_data(&self) -> fdo::Result<HashMap<u16, OwnedValue>> {
        self.property("ManufacturerData")
    }

    #[zbus(property)]
    fn service_data(&self) -> fdo::Result<HashMap<String, OwnedValue>> {
        self.property("ServiceData")
    }

    #[zbus(property)]
    fn local_name(&self) -> fdo::Result<String> {
        self.property("LocalName")
    }

    #[zbus(property)]
    fn include_tx_power(&self) -> fdo::Result<bool> {
        self.property("IncludeTxPower")
    }

    fn release(&self) {
        self.ad.release();
    }
}

/// Kind of a registered object, needed to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Application,
    Service,
    Characteristic,
    Descriptor,
    Advertisement,
}

/// Object registered on the bus by `export`
#[derive(Debug, Clone)]
pub(crate) struct ExportedObject {
    pub path: OwnedObjectPath,
    pub kind: ObjectKind,
}

/// Place `iface` at `path` and record it. A path already serving the
/// interface is an error, so nothing of ours is silently skipped.
async fn register<I: BusInterface>(
    server: &ObjectServer,
    exported: &mut Vec<ExportedObject>,
    path: OwnedObjectPath,
    kind: ObjectKind,
    iface: I,
) -> zbus::Result<()> {
    if !server.at(path.as_str(), iface).await? {
        return Err(zbus::Error::InterfaceExists(I::name(), path.into_inner()));
    }
    exported.push(ExportedObject { path, kind });
    Ok(())
}

/// Register every node of `app` plus the advertisement on `server`.
///
/// Each object is appended to `exported` as soon as it is on the bus, so a
/// failure part way leaves an exact record for `unexport`. Descriptor objects
/// are only exported when `include_descriptors` is set, keeping the bus in
/// line with the GetManagedObjects report.
pub(crate) async fn export(
    server: &ObjectServer,
    app: &Application,
    ad: &AdvertisementDescriptor,
    handle: &DispatchHandle,
    include_descriptors: bool,
    exported: &mut Vec<ExportedObject>,
) -> zbus::Result<()> {
    register(
        server,
        exported,
        object_path(app.path())?,
        ObjectKind::Application,
        ApplicationObject {
            handle: handle.clone(),
            include_descriptors,
        },
    )
    .await?;

    for service in app.services() {
        register(
            server,
            exported,
            object_path(service.path())?,
            ObjectKind::Service,
            ServiceObject {
                path: service.path().to_string(),
                handle: handle.clone(),
            },
        )
        .await?;

        for chr in service.characteristics() {
            register(
                server,
                exported,
                object_path(chr.path())?,
                ObjectKind::Characteristic,
                CharacteristicObject {
                    path: chr.path().to_string(),
                    handle: handle.clone(),
                },
            )
            .await?;

            if !include_descriptors {
                continue;
            }
            for desc in chr.descriptors() {
                register(
                    server,
                    exported,
                    object_path(desc.path())?,
                    ObjectKind::Descriptor,
                    DescriptorObject {
                        path: desc.path().to_string(),
                        handle: handle.clone(),
                    },
                )
                .await?;
            }
        }
    }

    register(
        server,
        exported,
        object_path(ad.path())?,
        ObjectKind::Advertisement,
        AdvertisementObject { ad: ad.clone() },
    )
    .await?;

    tracing::debug!(objects = exported.len(), "Exported GATT objects");
    Ok(())
}

/// Remove previously exported objects, children first
pub(crate) async fn unexport(server: &ObjectServer, exported: &[ExportedObject]) {
    for object in exported.iter().rev() {
        let path = object.path.as_str();
        let result = match object.kind {
            ObjectKind::Application => server.remove::<ApplicationObject, _>(path).await,
            ObjectKind::Service => server.remove::<ServiceObject, _>(path).await,
            ObjectKind::Characteristic => server.remove::<CharacteristicObject, _>(path).await,
            ObjectKind::Descriptor => server.remove::<DescriptorObject, _>(path).await,
            ObjectKind::Advertisement => server.remove::<AdvertisementObject, _>(path).await,
        };
        if let Err(e) = result {
            tracing::warn!(path = %path, "Failed to remove object: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthPolicy, PeripheralConfig, USER_DESCRIPTION_UUID};
    use crate::gatt::{AdvertisementType, GattDispatcher};
    use crate::identity::IdentityVerifier;
    use crate::message::MessageRouter;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn dispatched_tree() -> (Application, DispatchHandle) {
        let app = Application::from_config(&PeripheralConfig::default());
        let router = Arc::new(MessageRouter::new(
            IdentityVerifier::default(),
            AuthPolicy::Disabled,
        ));
        let (handle, _task) = GattDispatcher::spawn(app.clone(), router);
        (app, handle)
    }

    fn path_strings(paths: Vec<OwnedObjectPath>) -> Vec<String> {
        paths.iter().map(|p| p.as_str().to_string()).collect()
    }

    async fn peer_connections() -> (zbus::Connection, zbus::Connection) {
        let (ours, theirs) = tokio::net::UnixStream::pair().expect("Socket pair");
        let server = zbus::connection::Builder::unix_stream(ours)
            .server(zbus::Guid::generate())
            .expect("Server guid")
            .p2p()
            .build();
        let client = zbus::connection::Builder::unix_stream(theirs).p2p().build();
        futures::try_join!(server, client).expect("Peer connection")
    }

    #[test]
    fn test_access_options_from_bus_dict() {
        let device = ObjectPath::try_from("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF").unwrap();
        let options = HashMap::from([
            (
                "device".to_string(),
                Value::from(device).try_to_owned().unwrap(),
            ),
            ("offset".to_string(), Value::from(4u16).try_to_owned().unwrap()),
            ("mtu".to_string(), Value::from(185u16).try_to_owned().unwrap()),
        ]);
        let access = access_options(&options);
        assert_eq!(access.device_id(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(access.offset, 4);
        assert_eq!(access.mtu, Some(185));
    }

    #[test]
    fn test_access_options_empty_dict() {
        let access = access_options(&HashMap::new());
        assert_eq!(access, AccessOptions::default());
        assert_eq!(access.device_id(), "unknown-device");
    }

    #[test]
    fn test_gatt_errors_map_to_bluez_names() {
        let err: BluezError = GattError::InvalidInterface {
            path: "/a".into(),
            interface: "x".into(),
        }
        .into();
        assert!(matches!(err, BluezError::InvalidArguments(_)));

        let err: BluezError = GattError::InvalidOffset(3).into();
        assert!(matches!(err, BluezError::InvalidOffset(_)));

        let err: BluezError = GattError::NotAuthorized("dev".into()).into();
        assert!(matches!(err, BluezError::NotAuthorized(_)));

        let err: BluezError = GattError::DispatcherUnavailable.into();
        assert!(matches!(err, BluezError::Failed(_)));
    }

    #[test]
    fn test_managed_objects_convert_to_bus_types() {
        let app = Application::from_config(&PeripheralConfig::default());
        let objects = to_bus_objects(&app.get_managed_objects()).expect("Valid paths");
        assert_eq!(objects.len(), 2);

        let service_path = object_path("/org/bluez/attentid/app0/service0").unwrap();
        let service = &objects[&service_path]["org.bluez.GattService1"];
        assert_eq!(*service["Primary"], Value::from(true));
    }

    #[test]
    fn test_manufacturer_data_is_a_dict() {
        let value = to_owned_value(&PropertyValue::ManufacturerData(BTreeMap::from([(
            0xFFFF,
            vec![1, 2],
        )])))
        .expect("Convertible");
        assert!(matches!(&*value, Value::Dict(_)));
    }

    #[tokio::test]
    async fn test_tree_properties_are_read_through_dispatcher() {
        let (app, handle) = dispatched_tree();
        let service = &app.services()[0];
        let chr = &service.characteristics()[0];
        let desc = &chr.descriptors()[0];

        let service_object = ServiceObject {
            path: service.path().to_string(),
            handle: handle.clone(),
        };
        assert_eq!(service_object.uuid().await.unwrap(), service.uuid().to_string());
        assert!(service_object.primary().await.unwrap());
        assert_eq!(
            path_strings(service_object.characteristics().await.unwrap()),
            vec![chr.path().to_string()]
        );

        let chr_object = CharacteristicObject {
            path: chr.path().to_string(),
            handle: handle.clone(),
        };
        assert_eq!(chr_object.uuid().await.unwrap(), chr.uuid().to_string());
        assert_eq!(chr_object.service().await.unwrap().as_str(), service.path());
        assert_eq!(chr_object.flags().await.unwrap(), vec!["read", "write", "notify"]);
        assert_eq!(
            path_strings(chr_object.descriptors().await.unwrap()),
            vec![desc.path().to_string()]
        );

        let desc_object = DescriptorObject {
            path: desc.path().to_string(),
            handle,
        };
        assert_eq!(
            desc_object.uuid().await.unwrap(),
            USER_DESCRIPTION_UUID.to_string()
        );
        assert_eq!(desc_object.characteristic().await.unwrap().as_str(), chr.path());
        assert_eq!(desc_object.flags().await.unwrap(), vec!["read"]);
    }

    #[tokio::test]
    async fn test_property_read_errors_use_properties_names() {
        let (_app, handle) = dispatched_tree();
        let missing = ServiceObject {
            path: "/org/bluez/attentid/app0/service9".to_string(),
            handle: handle.clone(),
        };
        assert!(matches!(
            missing.uuid().await,
            Err(fdo::Error::UnknownObject(_))
        ));

        // A characteristic path asked for service properties
        let wrong = ServiceObject {
            path: "/org/bluez/attentid/app0/service0/char0".to_string(),
            handle: handle.clone(),
        };
        assert!(matches!(wrong.primary().await, Err(fdo::Error::InvalidArgs(_))));

        handle.shutdown().await.expect("Shutdown");
        let stopped = ServiceObject {
            path: "/org/bluez/attentid/app0/service0".to_string(),
            handle,
        };
        assert!(matches!(stopped.uuid().await, Err(fdo::Error::Failed(_))));
    }

    #[test]
    fn test_advertisement_properties_match_descriptor() {
        let ad = AdvertisementDescriptor::from_config(&PeripheralConfig::default());
        let object = AdvertisementObject { ad };
        assert_eq!(object.ad_type().unwrap(), "peripheral");
        assert_eq!(
            object.service_uuids().unwrap(),
            vec!["a07498ca-ad5b-474e-940d-16f7609c2a69"]
        );
        assert_eq!(object.local_name().unwrap(), "AttentID Server");

        // Unset fields are absent, so GetAll leaves them out
        assert!(matches!(
            object.manufacturer_data(),
            Err(fdo::Error::UnknownProperty(_))
        ));
        assert!(matches!(
            object.solicit_uuids(),
            Err(fdo::Error::UnknownProperty(_))
        ));
        assert!(matches!(
            object.include_tx_power(),
            Err(fdo::Error::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_advertisement_optional_fields_on_bus() {
        let ad = AdvertisementDescriptor::new("/ad0", AdvertisementType::Broadcast)
            .with_manufacturer_data(0xFFFF, [0x70, 0x74])
            .with_tx_power(true);
        let object = AdvertisementObject { ad };

        let data = object.manufacturer_data().unwrap();
        assert_eq!(*data[&0xFFFF], Value::from(vec![0x70u8, 0x74]));
        assert!(object.include_tx_power().unwrap());
        assert!(matches!(
            object.local_name(),
            Err(fdo::Error::UnknownProperty(_))
        ));
    }

    #[tokio::test]
    async fn test_export_stops_at_occupied_path_and_records_progress() {
        let (connection, _peer) = peer_connections().await;
        let server = connection.object_server();
        let config = PeripheralConfig::default();
        let (app, handle) = dispatched_tree();
        let ad = AdvertisementDescriptor::from_config(&config);

        let occupied = server
            .at(ad.path(), AdvertisementObject { ad: ad.clone() })
            .await
            .expect("Register");
        assert!(occupied);

        let mut exported = Vec::new();
        let err = export(server, &app, &ad, &handle, false, &mut exported)
            .await
            .unwrap_err();
        assert!(matches!(err, zbus::Error::InterfaceExists(..)));
        assert_eq!(
            exported.iter().map(|o| o.kind).collect::<Vec<_>>(),
            vec![
                ObjectKind::Application,
                ObjectKind::Service,
                ObjectKind::Characteristic
            ]
        );

        unexport(server, &exported).await;
        let service_path = app.services()[0].path();
        assert!(server
            .interface::<_, ServiceObject>(service_path)
            .await
            .is_err());
        assert!(server
            .interface::<_, ApplicationObject>(app.path())
            .await
            .is_err());
        assert!(server
            .interface::<_, AdvertisementObject>(ad.path())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_export_includes_descriptors_when_enabled() {
        let (connection, _peer) = peer_connections().await;
        let server = connection.object_server();
        let (app, handle) = dispatched_tree();
        let ad = AdvertisementDescriptor::from_config(&PeripheralConfig::default());

        let mut exported = Vec::new();
        export(server, &app, &ad, &handle, true, &mut exported)
            .await
            .expect("Export");
        assert_eq!(exported.len(), 5);
        assert_eq!(exported[3].kind, ObjectKind::Descriptor);
        assert_eq!(exported[4].kind, ObjectKind::Advertisement);

        unexport(server, &exported).await;
        assert!(server
            .interface::<_, AdvertisementObject>(ad.path())
            .await
            .is_err());
    }
}
