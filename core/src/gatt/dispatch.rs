// GATT dispatcher — one task owns the Application and serves bus calls in order
//
// Every GetAll / ReadValue / WriteValue arrives as a GattCommand on a single
// channel, so calls are processed one at a time and the tree needs no lock.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AccessOptions, Application, GattError, ManagedObjects, Properties, WriteOutcome};
use crate::message::MessageRouter;

/// Commands understood by the dispatcher task
#[derive(Debug)]
pub enum GattCommand {
    GetAll {
        path: String,
        interface: String,
        reply: mpsc::Sender<Result<Properties, GattError>>,
    },
    ReadValue {
        path: String,
        options: AccessOptions,
        reply: mpsc::Sender<Result<Vec<u8>, GattError>>,
    },
    WriteValue {
        path: String,
        value: Vec<u8>,
        options: AccessOptions,
        reply: mpsc::Sender<Result<WriteOutcome, GattError>>,
    },
    ManagedObjects {
        include_descriptors: bool,
        reply: mpsc::Sender<ManagedObjects>,
    },
    Shutdown,
}

/// Cloneable handle for talking to the dispatcher task
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    command_tx: mpsc::Sender<GattCommand>,
}

impl DispatchHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<T>) -> GattCommand,
    ) -> Result<T, GattError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| GattError::DispatcherUnavailable)?;
        reply_rx
            .recv()
            .await
            .ok_or(GattError::DispatcherUnavailable)
    }

    /// Properties of `path` for `interface`
    pub async fn get_all(&self, path: &str, interface: &str) -> Result<Properties, GattError> {
        self.request(|reply| GattCommand::GetAll {
            path: path.to_string(),
            interface: interface.to_string(),
            reply,
        })
        .await?
    }

    pub async fn read_value(
        &self,
        path: &str,
        options: AccessOptions,
    ) -> Result<Vec<u8>, GattError> {
        self.request(|reply| GattCommand::ReadValue {
            path: path.to_string(),
            options,
            reply,
        })
        .await?
    }

    pub async fn write_value(
        &self,
        path: &str,
        value: Vec<u8>,
        options: AccessOptions,
    ) -> Result<WriteOutcome, GattError> {
        self.request(|reply| GattCommand::WriteValue {
            path: path.to_string(),
            value,
            options,
            reply,
        })
        .await?
    }

    pub async fn managed_objects(
        &self,
        include_descriptors: bool,
    ) -> Result<ManagedObjects, GattError> {
        self.request(|reply| GattCommand::ManagedObjects {
            include_descriptors,
            reply,
        })
        .await
    }

    /// Stop the dispatcher; the task hands the Application back through its JoinHandle
    pub async fn shutdown(&self) -> Result<(), GattError> {
        self.command_tx
            .send(GattCommand::Shutdown)
            .await
            .map_err(|_| GattError::DispatcherUnavailable)
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// Resolves once the dispatcher task has stopped
    pub async fn closed(&self) {
        self.command_tx.closed().await
    }
}

/// Serial executor for GATT calls
pub struct GattDispatcher {
    app: Application,
    router: Arc<MessageRouter>,
    command_rx: mpsc::Receiver<GattCommand>,
}

impl GattDispatcher {
    /// Spawn the dispatcher task on the current runtime
    pub fn spawn(
        app: Application,
        router: Arc<MessageRouter>,
    ) -> (DispatchHandle, JoinHandle<Application>) {
        let (command_tx, command_rx) = mpsc::channel::<GattCommand>(64);
        let dispatcher = Self {
            app,
            router,
            command_rx,
        };
        let task = tokio::spawn(dispatcher.run());
        (DispatchHandle { command_tx }, task)
    }

    async fn run(mut self) -> Application {
        tracing::info!("GATT dispatcher started");
        while let Some(command) = self.command_rx.recv().await {
            match command {
                GattCommand::GetAll {
                    path,
                    interface,
                    reply,
                } => {
                    let result = self.app.get_all(&path, &interface);
                    if let Err(e) = &result {
                        tracing::debug!(path = %path, "GetAll failed: {}", e);
                    }
                    let _ = reply.send(result).await;
                }
                GattCommand::ReadValue {
                    path,
                    options,
                    reply,
                } => {
                    let _ = reply.send(self.app.read_value(&path, &options)).await;
                }
                GattCommand::WriteValue {
                    path,
                    value,
                    options,
                    reply,
                } => {
                    let result = self
                        .app
                        .write_value(&path, &value, &options, &self.router);
                    if let Err(e) = &result {
                        tracing::warn!(path = %path, "WriteValue failed: {}", e);
                    }
                    let _ = reply.send(result).await;
                }
                GattCommand::ManagedObjects {
                    include_descriptors,
                    reply,
                } => {
                    let report = if include_descriptors {
                        self.app.get_managed_objects_with_descriptors()
                    } else {
                        self.app.get_managed_objects()
                    };
                    let _ = reply.send(report).await;
                }
                GattCommand::Shutdown => {
                    tracing::info!("GATT dispatcher shutting down");
                    break;
                }
            }
        }
        self.app
    }
}
