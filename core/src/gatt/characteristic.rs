// Characteristic — the one mutable value in the tree
//
// `value` starts as the configured initial text and is replaced by every
// successfully decoded write. Reads return it verbatim.

use uuid::Uuid;

use super::node::{
    child_path, dedup_flags, flag_names, slice_from, Exportable, GattFlag, Interface, Properties,
    PropertyValue,
};
use super::{AccessOptions, Descriptor, GattError};
use crate::config::PayloadDecoding;
use crate::message::{decode_text, DecodeError, MessageRouter, Payload, RouteError};

/// Result of a write that was accepted by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value replaced and the message routed
    Stored,
    /// Payload could not be decoded; value left unchanged
    Discarded(DecodeError),
}

#[derive(Debug, Clone)]
pub struct Characteristic {
    path: String,
    uuid: Uuid,
    flags: Vec<GattFlag>,
    service: String,
    value: Vec<u8>,
    decoding: PayloadDecoding,
    descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub(crate) fn new(
        path: String,
        uuid: Uuid,
        flags: &[GattFlag],
        service: &str,
        initial_value: Vec<u8>,
    ) -> Self {
        Self {
            path,
            uuid,
            flags: dedup_flags(flags),
            service: service.to_string(),
            value: initial_value,
            decoding: PayloadDecoding::default(),
            descriptors: Vec::new(),
        }
    }

    /// Set how written bytes are decoded before routing
    pub fn set_decoding(&mut self, decoding: PayloadDecoding) -> &mut Self {
        self.decoding = decoding;
        self
    }

    /// Append a descriptor; its path is `<char>/desc<index>`
    pub fn add_descriptor(&mut self, uuid: Uuid, flags: &[GattFlag], value: Vec<u8>) -> &Descriptor {
        let path = child_path(&self.path, "desc", self.descriptors.len());
        self.descriptors
            .push(Descriptor::new(path, uuid, flags, &self.path, value));
        &self.descriptors[self.descriptors.len() - 1]
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn flags(&self) -> &[GattFlag] {
        &self.flags
    }

    /// Path of the owning service
    pub fn service_path(&self) -> &str {
        &self.service
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn decoding(&self) -> PayloadDecoding {
        self.decoding
    }

    /// Current value, starting at `options.offset`
    pub fn read_value(&self, options: &AccessOptions) -> Vec<u8> {
        tracing::debug!(
            path = %self.path,
            device = %options.device_id(),
            offset = options.offset,
            "Characteristic read"
        );
        slice_from(&self.value, options.offset)
    }

    /// Decode `bytes`, route them as a text message and store them.
    ///
    /// A payload that fails to decode is dropped without touching `value`
    /// and without an error toward the caller.
    pub fn write_value(
        &mut self,
        bytes: &[u8],
        options: &AccessOptions,
        router: &MessageRouter,
    ) -> Result<WriteOutcome, GattError> {
        if options.offset != 0 {
            return Err(GattError::InvalidOffset(options.offset));
        }

        let device = options.device_id();
        let text = match decode_text(bytes, self.decoding) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %self.path, device = %device, "Discarding write: {}", e);
                return Ok(WriteOutcome::Discarded(e));
            }
        };

        match router.handle(&device, Payload::Text(text)) {
            Ok(_) => {}
            Err(RouteError::Unauthorized { device }) => {
                return Err(GattError::NotAuthorized(device));
            }
        }

        self.value = bytes.to_vec();
        tracing::debug!(path = %self.path, len = bytes.len(), "Characteristic value updated");
        Ok(WriteOutcome::Stored)
    }
}

impl Exportable for Characteristic {
    fn path(&self) -> &str {
        &self.path
    }

    fn interface(&self) -> Interface {
        Interface::GattCharacteristic
    }

    fn properties(&self) -> Properties {
        Properties::from([
            ("UUID".to_string(), PropertyValue::Str(self.uuid.to_string())),
            (
                "Service".to_string(),
                PropertyValue::ObjectPath(self.service.clone()),
            ),
            (
                "Flags".to_string(),
                PropertyValue::StrList(flag_names(&self.flags)),
            ),
            (
                "Descriptors".to_string(),
                PropertyValue::ObjectPathList(
                    self.descriptors
                        .iter()
                        .map(|d| d.path().to_string())
                        .collect(),
                ),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthPolicy, USER_DESCRIPTION_UUID};
    use crate::identity::IdentityVerifier;

    fn characteristic() -> Characteristic {
        Characteristic::new(
            "/app0/service0/char0".to_string(),
            Uuid::nil(),
            &[GattFlag::Read, GattFlag::Write],
            "/app0/service0",
            b"AttentID Ready".to_vec(),
        )
    }

    fn router() -> MessageRouter {
        MessageRouter::new(IdentityVerifier::default(), AuthPolicy::Disabled)
    }

    #[test]
    fn test_read_before_write_returns_initial_value() {
        let chr = characteristic();
        assert_eq!(
            chr.read_value(&AccessOptions::default()),
            b"AttentID Ready".to_vec()
        );
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut chr = characteristic();
        let outcome = chr
            .write_value(&[65, 66, 67], &AccessOptions::default(), &router())
            .expect("Write accepted");
        assert_eq!(outcome, WriteOutcome::Stored);
        assert_eq!(chr.read_value(&AccessOptions::default()), vec![65, 66, 67]);
    }

    #[test]
    fn test_empty_write_stores_empty_value() {
        let mut chr = characteristic();
        chr.write_value(&[], &AccessOptions::default(), &router())
            .expect("Write accepted");
        assert!(chr.read_value(&AccessOptions::default()).is_empty());
    }

    #[test]
    fn test_decode_failure_keeps_previous_value() {
        let mut chr = characteristic();
        chr.set_decoding(PayloadDecoding::Ascii);
        let outcome = chr
            .write_value(&[0x41, 0xFF], &AccessOptions::default(), &router())
            .expect("Decode failures are silent");
        assert!(matches!(outcome, WriteOutcome::Discarded(_)));
        assert_eq!(
            chr.read_value(&AccessOptions::default()),
            b"AttentID Ready".to_vec()
        );
    }

    #[test]
    fn test_write_with_offset_rejected() {
        let mut chr = characteristic();
        let result = chr.write_value(
            b"X",
            &AccessOptions::default().with_offset(2),
            &router(),
        );
        assert_eq!(result, Err(GattError::InvalidOffset(2)));
        assert_eq!(
            chr.read_value(&AccessOptions::default()),
            b"AttentID Ready".to_vec()
        );
    }

    #[test]
    fn test_enforced_write_from_stranger_rejected() {
        let router = MessageRouter::new(
            IdentityVerifier::new(["AA:BB:CC:DD:EE:FF"]),
            AuthPolicy::Enforce,
        );
        let mut chr = characteristic();

        let stranger = AccessOptions::from_device("/org/bluez/hci0/dev_11_22_33_44_55_66");
        let result = chr.write_value(b"hi", &stranger, &router);
        assert_eq!(
            result,
            Err(GattError::NotAuthorized("11:22:33:44:55:66".into()))
        );
        assert_eq!(
            chr.read_value(&AccessOptions::default()),
            b"AttentID Ready".to_vec()
        );

        let known = AccessOptions::from_device("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF");
        assert_eq!(
            chr.write_value(b"hi", &known, &router),
            Ok(WriteOutcome::Stored)
        );
    }

    #[test]
    fn test_descriptor_paths_and_properties() {
        let mut chr = characteristic();
        let first = chr
            .add_descriptor(USER_DESCRIPTION_UUID, &[GattFlag::Read], b"a".to_vec())
            .path()
            .to_string();
        let second = chr
            .add_descriptor(USER_DESCRIPTION_UUID, &[GattFlag::Read], b"b".to_vec())
            .path()
            .to_string();
        assert_eq!(first, "/app0/service0/char0/desc0");
        assert_eq!(second, "/app0/service0/char0/desc1");

        let props = chr.properties();
        assert_eq!(
            props["Descriptors"],
            PropertyValue::ObjectPathList(vec![first, second])
        );
        assert_eq!(
            props["Flags"],
            PropertyValue::StrList(vec!["read".into(), "write".into()])
        );
    }
}
