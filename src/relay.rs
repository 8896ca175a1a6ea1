//! Named relay destinations. Relay routes hand their action's output to a worker
//! registered under an address and answer with the worker's reply.

use crate::error::WebError;
use crate::route::descriptor::Envelope;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait RelayWorker: Send + Sync + 'static {
    async fn consume(&self, message: Envelope) -> Result<Value, WebError>;
}

#[async_trait]
impl<F, Fut> RelayWorker for F
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WebError>> + Send + 'static,
{
    async fn consume(&self, message: Envelope) -> Result<Value, WebError> {
        (self)(message).await
    }
}

/// Address registry, immutable once built.
#[derive(Clone, Default)]
pub struct RelayBus {
    workers: HashMap<String, Arc<dyn RelayWorker>>,
}

#[derive(Default)]
pub struct RelayBusBuilder {
    workers: HashMap<String, Arc<dyn RelayWorker>>,
}

impl RelayBusBuilder {
    pub fn worker<W: RelayWorker>(mut self, address: impl Into<String>, worker: W) -> Self {
        let address = address.into();
        if self.workers.insert(address.clone(), Arc::new(worker)).is_some() {
            tracing::warn!(address = %address, "relay worker replaced");
        }
        self
    }

    pub fn build(self) -> RelayBus {
        RelayBus {
            workers: self.workers,
        }
    }
}

impl RelayBus {
    pub fn builder() -> RelayBusBuilder {
        RelayBusBuilder::default()
    }

    pub fn empty() -> Self {
        RelayBus::default()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.workers.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Runs the worker on its own task and waits for the reply. No timeout is applied.
    pub async fn request(&self, address: &str, message: Envelope) -> Result<Value, WebError> {
        let worker = self
            .workers
            .get(address)
            .cloned()
            .ok_or_else(|| WebError::relay_unavailable(address))?;
        tracing::debug!(address = %address, "relaying message");
        tokio::spawn(async move { worker.consume(message).await })
            .await
            .map_err(|e| WebError::unexpected("relay", e))?
    }
}
