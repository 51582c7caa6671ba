use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::zone::ZoneStore;

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
    zone_store: Arc<ZoneStore>,
}

/// Type alias for shutdown function result
type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Type alias for shutdown function
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

/// A component that needs to be shut down gracefully
struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

impl GracefulShutdown {
    pub fn new(zone_store: Arc<ZoneStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            zone_store,
        }
    }

    /// Get a shutdown receiver for components to listen on
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register a component for graceful shutdown
    pub async fn register_component<F, Fut>(&self, name: String, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name,
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };

        self.components.lock().await.push(component);
    }

    /// Initiate graceful shutdown: stop accepting new work, let in-flight
    /// transfers and updates settle, then shut down registered components
    /// (listeners, the XFR worker pool) in turn.
    pub async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("initiating graceful shutdown");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("failed to send shutdown signal: {e}");
        }

        info!("waiting for in-flight transfers and updates to complete");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let components = self.components.lock().await;
        let mut handles = Vec::new();

        for component in components.iter() {
            info!(component = %component.name, "shutting down component");
            let handle = (component.shutdown_fn)();
            handles.push((component.name.clone(), handle));
        }

        for (name, handle) in handles {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => {
                    info!(component = %name, "component shut down successfully");
                }
                Ok(Ok(Err(e))) => {
                    error!(component = %name, error = %e, "component shutdown failed");
                }
                Ok(Err(e)) => {
                    error!(component = %name, error = %e, "component shutdown task panicked");
                }
                Err(_) => {
                    warn!(component = %name, "component shutdown timed out");
                }
            }
        }

        info!(zones = self.zone_store.len(), "zone store left in final state");
        info!("graceful shutdown completed");
        Ok(())
    }
}
