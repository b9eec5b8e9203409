// Transport — host BLE stack integration

pub mod bluez;
pub mod scanner;

pub use bluez::BluezManager;
pub use scanner::{
    BtleplugSource, Detection, DetectionHandler, DetectionSource, ScanReport, ScanSession,
    ScannerError,
};
