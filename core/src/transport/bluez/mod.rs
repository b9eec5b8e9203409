//! BlueZ adapter over D-Bus (zbus)
//!
//! Exports the GATT tree and advertisement as bus objects and registers them
//! with `org.bluez.GattManager1` / `org.bluez.LEAdvertisingManager1`.

mod manager;
mod objects;
mod proxies;

pub use manager::BluezManager;
pub use objects::{BluezError, BusManagedObjects};
pub use proxies::{AdapterProxy, GattManagerProxy, LEAdvertisingManagerProxy};
