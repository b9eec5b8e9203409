// Advertisement — static broadcast parameters handed to the advertising manager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::node::{Exportable, Interface, Properties, PropertyValue};
use crate::config::PeripheralConfig;

/// Advertising type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisementType {
    /// Connectable
    #[default]
    Peripheral,
    /// Non-connectable
    Broadcast,
}

impl AdvertisementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvertisementType::Peripheral => "peripheral",
            AdvertisementType::Broadcast => "broadcast",
        }
    }
}

/// Broadcast configuration. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementDescriptor {
    path: String,
    ad_type: AdvertisementType,
    service_uuids: Vec<Uuid>,
    manufacturer_data: BTreeMap<u16, Vec<u8>>,
    solicit_uuids: Vec<Uuid>,
    service_data: BTreeMap<Uuid, Vec<u8>>,
    local_name: Option<String>,
    include_tx_power: bool,
}

impl AdvertisementDescriptor {
    pub fn new(path: impl Into<String>, ad_type: AdvertisementType) -> Self {
        Self {
            path: path.into(),
            ad_type,
            service_uuids: Vec::new(),
            manufacturer_data: BTreeMap::new(),
            solicit_uuids: Vec::new(),
            service_data: BTreeMap::new(),
            local_name: None,
            include_tx_power: false,
        }
    }

    /// Connectable advertisement of the configured service under the configured name
    pub fn from_config(config: &PeripheralConfig) -> Self {
        Self::new(config.advertisement_path(), AdvertisementType::Peripheral)
            .with_service_uuid(config.service_uuid)
            .with_local_name(config.local_name.clone())
    }

    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuids.push(uuid);
        self
    }

    pub fn with_solicit_uuid(mut self, uuid: Uuid) -> Self {
        self.solicit_uuids.push(uuid);
        self
    }

    /// Replaces any data already set for `company`
    pub fn with_manufacturer_data(mut self, company: u16, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data.insert(company, data.into());
        self
    }

    /// Replaces any data already set for `uuid`
    pub fn with_service_data(mut self, uuid: Uuid, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.insert(uuid, data.into());
        self
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_tx_power(mut self, include: bool) -> Self {
        self.include_tx_power = include;
        self
    }

    pub fn ad_type(&self) -> AdvertisementType {
        self.ad_type
    }

    pub fn service_uuids(&self) -> &[Uuid] {
        &self.service_uuids
    }

    pub fn solicit_uuids(&self) -> &[Uuid] {
        &self.solicit_uuids
    }

    pub fn manufacturer_data(&self) -> &BTreeMap<u16, Vec<u8>> {
        &self.manufacturer_data
    }

    pub fn service_data(&self) -> &BTreeMap<Uuid, Vec<u8>> {
        &self.service_data
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn include_tx_power(&self) -> bool {
        self.include_tx_power
    }

    /// Called by the advertising manager when it drops the advertisement
    pub fn release(&self) {
        tracing::info!(path = %self.path, "Advertisement released");
    }
}

fn uuid_strings(uuids: &[Uuid]) -> Vec<String> {
    uuids.iter().map(Uuid::to_string).collect()
}

impl Exportable for AdvertisementDescriptor {
    fn path(&self) -> &str {
        &self.path
    }

    fn interface(&self) -> Interface {
        Interface::LeAdvertisement
    }

    /// Empty collections and an absent name are left out
    fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert(
            "Type".to_string(),
            PropertyValue::Str(self.ad_type.as_str().to_string()),
        );
        if !self.service_uuids.is_empty() {
            props.insert(
                "ServiceUUIDs".to_string(),
                PropertyValue::StrList(uuid_strings(&self.service_uuids)),
            );
        }
        if !self.solicit_uuids.is_empty() {
            props.insert(
                "SolicitUUIDs".to_string(),
                PropertyValue::StrList(uuid_strings(&self.solicit_uuids)),
            );
        }
        if !self.manufacturer_data.is_empty() {
            props.insert(
                "ManufacturerData".to_string(),
                PropertyValue::ManufacturerData(self.manufacturer_data.clone()),
            );
        }
        if !self.service_data.is_empty() {
            props.insert(
                "ServiceData".to_string(),
                PropertyValue::ServiceData(
                    self.service_data
                        .iter()
                        .map(|(uuid, data)| (uuid.to_string(), data.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(name) = &self.local_name {
            props.insert("LocalName".to_string(), PropertyValue::Str(name.clone()));
        }
        if self.include_tx_power {
            props.insert("IncludeTxPower".to_string(), PropertyValue::Bool(true));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::GattError;

    #[test]
    fn test_default_advertisement_properties() {
        let config = PeripheralConfig::default();
        let ad = AdvertisementDescriptor::from_config(&config);
        assert_eq!(ad.path(), "/org/bluez/attentid/advertisement0");

        let props = ad
            .get_properties("org.bluez.LEAdvertisement1")
            .expect("Own interface");
        assert_eq!(props["Type"], PropertyValue::Str("peripheral".into()));
        assert_eq!(
            props["ServiceUUIDs"],
            PropertyValue::StrList(vec!["a07498ca-ad5b-474e-940d-16f7609c2a69".into()])
        );
        assert_eq!(
            props["LocalName"],
            PropertyValue::Str("AttentID Server".into())
        );
        assert!(!props.contains_key("ManufacturerData"));
        assert!(!props.contains_key("SolicitUUIDs"));
        assert!(!props.contains_key("IncludeTxPower"));
    }

    #[test]
    fn test_optional_fields_exported_when_set() {
        let ad = AdvertisementDescriptor::new("/ad0", AdvertisementType::Broadcast)
            .with_manufacturer_data(0xFFFF, [0x70, 0x74])
            .with_service_data(Uuid::nil(), [1])
            .with_tx_power(true);

        let props = ad.properties();
        assert_eq!(props["Type"], PropertyValue::Str("broadcast".into()));
        assert_eq!(
            props["ManufacturerData"],
            PropertyValue::ManufacturerData(BTreeMap::from([(0xFFFF, vec![0x70, 0x74])]))
        );
        assert_eq!(props["IncludeTxPower"], PropertyValue::Bool(true));
        assert!(!props.contains_key("LocalName"));
    }

    #[test]
    fn test_builders_replace_keyed_entries() {
        let ad = AdvertisementDescriptor::new("/ad0", AdvertisementType::Peripheral)
            .with_manufacturer_data(0x004C, [1])
            .with_manufacturer_data(0x004C, [2, 3])
            .with_solicit_uuid(Uuid::nil())
            .with_local_name("Door");

        assert_eq!(ad.manufacturer_data().len(), 1);
        assert_eq!(ad.manufacturer_data()[&0x004C], vec![2, 3]);
        assert_eq!(ad.solicit_uuids(), &[Uuid::nil()]);
        assert_eq!(ad.local_name(), Some("Door"));
        assert!(!ad.include_tx_power());
        assert_eq!(ad.ad_type(), AdvertisementType::Peripheral);
    }

    #[test]
    fn test_advertisement_rejects_gatt_interface() {
        let ad = AdvertisementDescriptor::new("/ad0", AdvertisementType::Peripheral);
        assert!(matches!(
            ad.get_properties("org.bluez.GattService1"),
            Err(GattError::InvalidInterface { .. })
        ));
    }
}
