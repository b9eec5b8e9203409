// Peripheral — registration state machine
//
// Idle → ManagersResolved → AdapterConfigured → AdvertisementRegistered →
// ApplicationRegistered → Running, with Failed reachable from anywhere.
// Advertisement and application registration are issued together; an
// advertisement-only failure skips AdvertisementRegistered.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, PeripheralConfig};
use crate::gatt::{
    AdvertisementDescriptor, Application, DispatchHandle, Exportable, GattDispatcher, GattError,
};
use crate::message::MessageRouter;

/// Errors for peripheral startup and shutdown
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeripheralError {
    #[error("BLE manager unavailable: {0}")]
    ManagerUnavailable(String),
    #[error("Adapter configuration failed: {0}")]
    AdapterConfiguration(String),
    #[error("Failed to export objects: {0}")]
    Export(String),
    #[error("Registration failed: {0}")]
    RegistrationFailure(String),
    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: PeripheralState,
        to: PeripheralState,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] GattError),
}

/// Registration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralState {
    Idle,
    ManagersResolved,
    AdapterConfigured,
    AdvertisementRegistered,
    ApplicationRegistered,
    Running,
    Failed,
}

impl PeripheralState {
    pub fn can_transition_to(self, next: PeripheralState) -> bool {
        use PeripheralState::*;
        match (self, next) {
            (Failed, _) => false,
            (_, Failed) => true,
            (Idle, ManagersResolved)
            | (ManagersResolved, AdapterConfigured)
            | (AdapterConfigured, AdvertisementRegistered)
            | (AdapterConfigured, ApplicationRegistered)
            | (AdvertisementRegistered, ApplicationRegistered)
            | (ApplicationRegistered, Running) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Host BLE manager the peripheral registers with
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleManager: Send + Sync {
    /// Locate an adapter offering GATT and advertising management; returns its path
    async fn resolve_managers(&self) -> Result<String, PeripheralError>;

    /// Power the adapter on and make it discoverable
    async fn configure_adapter(&self, adapter: &str) -> Result<(), PeripheralError>;

    /// Publish the tree and advertisement so the manager can query them
    async fn export_objects(
        &self,
        app: &Application,
        advertisement: &AdvertisementDescriptor,
        handle: &DispatchHandle,
    ) -> Result<(), PeripheralError>;

    /// Withdraw every object `export_objects` placed on the bus, including a partial export
    async fn unexport_objects(&self);

    async fn register_advertisement(
        &self,
        adapter: &str,
        advertisement: &str,
    ) -> Result<(), PeripheralError>;

    async fn register_application(
        &self,
        adapter: &str,
        application: &str,
    ) -> Result<(), PeripheralError>;

    /// Best-effort teardown of whatever was registered
    async fn unregister(
        &self,
        adapter: &str,
        application: &str,
        advertisement: Option<String>,
    ) -> Result<(), PeripheralError>;
}

/// Drives a peripheral from Idle to Running
pub struct RegistrationOrchestrator<M: BleManager> {
    manager: Arc<M>,
    config: PeripheralConfig,
    router: Arc<MessageRouter>,
    state: PeripheralState,
}

impl<M: BleManager> RegistrationOrchestrator<M> {
    pub fn new(
        manager: M,
        config: PeripheralConfig,
        router: Arc<MessageRouter>,
    ) -> Result<Self, PeripheralError> {
        config.validate()?;
        Ok(Self {
            manager: Arc::new(manager),
            config,
            router,
            state: PeripheralState::Idle,
        })
    }

    pub fn state(&self) -> PeripheralState {
        self.state
    }

    fn transition(&mut self, next: PeripheralState) -> Result<(), PeripheralError> {
        if !self.state.can_transition_to(next) {
            return Err(PeripheralError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "Peripheral state change");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, error: PeripheralError) -> PeripheralError {
        tracing::error!(state = %self.state, "Peripheral startup failed: {}", error);
        self.state = PeripheralState::Failed;
        error
    }

    /// Register everything and start serving. Failures are fatal and not retried.
    pub async fn start(&mut self) -> Result<RunningPeripheral<M>, PeripheralError> {
        if self.state != PeripheralState::Idle {
            return Err(PeripheralError::InvalidTransition {
                from: self.state,
                to: PeripheralState::ManagersResolved,
            });
        }

        let adapter = match self.manager.resolve_managers().await {
            Ok(adapter) => adapter,
            Err(e) => return Err(self.fail(e)),
        };
        self.transition(PeripheralState::ManagersResolved)?;
        tracing::info!(adapter = %adapter, "BLE managers resolved");

        if let Err(e) = self.manager.configure_adapter(&adapter).await {
            return Err(self.fail(e));
        }
        self.transition(PeripheralState::AdapterConfigured)?;

        let app = Application::from_config(&self.config);
        let advertisement = AdvertisementDescriptor::from_config(&self.config);
        let app_path = app.path().to_string();
        let ad_path = advertisement.path().to_string();

        let (handle, task) = GattDispatcher::spawn(app.clone(), self.router.clone());
        if let Err(e) = self
            .manager
            .export_objects(&app, &advertisement, &handle)
            .await
        {
            self.manager.unexport_objects().await;
            let _ = handle.shutdown().await;
            return Err(self.fail(e));
        }

        let (ad_result, app_result) = tokio::join!(
            self.manager.register_advertisement(&adapter, &ad_path),
            self.manager.register_application(&adapter, &app_path),
        );

        let advertising = match ad_result {
            Ok(()) => {
                tracing::info!(path = %ad_path, "Advertisement registered");
                self.transition(PeripheralState::AdvertisementRegistered)?;
                true
            }
            Err(e) => {
                tracing::warn!(path = %ad_path, "Failed to register advertisement: {}", e);
                false
            }
        };

        if let Err(e) = app_result {
            let _ = self
                .manager
                .unregister(&adapter, &app_path, advertising.then(|| ad_path.clone()))
                .await;
            let _ = handle.shutdown().await;
            return Err(self.fail(e));
        }
        tracing::info!(path = %app_path, "GATT application registered");
        self.transition(PeripheralState::ApplicationRegistered)?;

        self.transition(PeripheralState::Running)?;
        tracing::info!(
            name = %self.config.local_name,
            advertising,
            "Peripheral running"
        );

        Ok(RunningPeripheral {
            manager: self.manager.clone(),
            handle,
            task,
            adapter,
            app_path,
            ad_path,
            advertising,
        })
    }
}

/// A registered peripheral serving GATT calls
pub struct RunningPeripheral<M: BleManager> {
    manager: Arc<M>,
    handle: DispatchHandle,
    task: JoinHandle<Application>,
    adapter: String,
    app_path: String,
    ad_path: String,
    advertising: bool,
}

impl<M: BleManager> RunningPeripheral<M> {
    pub fn state(&self) -> PeripheralState {
        PeripheralState::Running
    }

    /// Whether the advertisement registration succeeded
    pub fn advertising(&self) -> bool {
        self.advertising
    }

    pub fn handle(&self) -> &DispatchHandle {
        &self.handle
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Resolves only when the dispatcher stops
    pub async fn wait(&self) {
        self.handle.closed().await
    }

    /// Unregister from the manager and stop the dispatcher, returning the final tree
    pub async fn shutdown(self) -> Result<Application, PeripheralError> {
        let advertisement = self.advertising.then(|| self.ad_path.clone());
        if let Err(e) = self
            .manager
            .unregister(&self.adapter, &self.app_path, advertisement)
            .await
        {
            tracing::warn!("Failed to unregister peripheral: {}", e);
        }
        // Already stopped is fine
        let _ = self.handle.shutdown().await;
        self.task
            .await
            .map_err(|_| PeripheralError::Dispatcher(GattError::DispatcherUnavailable))
    }
}
