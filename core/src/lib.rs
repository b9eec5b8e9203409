// AttentID Core — BLE peripheral identity channel
//
// A GATT peripheral exposing one writable characteristic, a passive
// advertisement scanner, and the router both of them feed.

pub mod config;
pub mod gatt;
pub mod identity;
pub mod message;
pub mod peripheral;
pub mod transport;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use config::{
    AuthPolicy, ConfigError, PayloadDecoding, PeripheralConfig, ScanConfig, ShutdownPolicy,
};
pub use gatt::{
    AccessOptions, AdvertisementDescriptor, Application, DispatchHandle, Exportable, GattError,
    GattFlag, WriteOutcome,
};
pub use identity::IdentityVerifier;
pub use message::{InboundMessage, MessageRouter, Payload};
pub use peripheral::{
    BleManager, PeripheralError, PeripheralState, RegistrationOrchestrator, RunningPeripheral,
};
pub use transport::{BluezManager, BtleplugSource, ScanReport, ScanSession, ScannerError};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum AttentIdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("GATT error: {0}")]
    Gatt(#[from] GattError),
    #[error("Peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),
    #[error("Scanner error: {0}")]
    Scanner(#[from] ScannerError),
}

// ============================================================================
// FACADE
// ============================================================================

/// Configured peripheral and scanner sharing one router
pub struct AttentId {
    peripheral: PeripheralConfig,
    scan: ScanConfig,
    router: Arc<MessageRouter>,
}

impl AttentId {
    pub fn new(peripheral: PeripheralConfig, scan: ScanConfig) -> Result<Self, AttentIdError> {
        peripheral.validate()?;
        scan.validate()?;
        let verifier = IdentityVerifier::new(peripheral.known_addresses.clone());
        let router = Arc::new(MessageRouter::new(verifier, peripheral.auth_policy));
        Ok(Self {
            peripheral,
            scan,
            router,
        })
    }

    pub fn peripheral_config(&self) -> &PeripheralConfig {
        &self.peripheral
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan
    }

    pub fn router(&self) -> Arc<MessageRouter> {
        self.router.clone()
    }

    /// Messages accepted by the router, from either origin
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.router.subscribe()
    }

    /// The tree `serve` would export
    pub fn tree(&self) -> Application {
        Application::from_config(&self.peripheral)
    }

    pub fn advertisement(&self) -> AdvertisementDescriptor {
        AdvertisementDescriptor::from_config(&self.peripheral)
    }

    /// Check an address against the configured known addresses
    pub fn verify(&self, received: &str) -> bool {
        self.router.verifier().verify(received)
    }

    /// Register with BlueZ on the system bus and start serving
    pub async fn serve(&self) -> Result<RunningPeripheral<BluezManager>, AttentIdError> {
        let manager = BluezManager::system(&self.peripheral).await?;
        let mut orchestrator =
            RegistrationOrchestrator::new(manager, self.peripheral.clone(), self.router.clone())?;
        Ok(orchestrator.start().await?)
    }

    /// Run one passive scan window on the first adapter
    pub async fn scan(&self) -> Result<ScanReport, AttentIdError> {
        let mut source = BtleplugSource::first_adapter().await?;
        Ok(ScanSession::run(&mut source, self.router.clone(), &self.scan).await?)
    }
}
