//! Turns a descriptor into an executable handler, one strategy per [`HandlerKind`].

use crate::error::WebError;
use crate::filter::Exchange;
use crate::relay::RelayBus;
use crate::response::Reply;
use crate::route::descriptor::{Action, HandlerKind, RouteDescriptor};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait RouteHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the action and ends the exchange with its result.
    async fn handle(&self, exchange: &mut Exchange) -> Result<(), WebError>;
}

pub struct DirectHandler {
    action: Action,
}

#[async_trait]
impl RouteHandler for DirectHandler {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), WebError> {
        let value = self.action.invoke(exchange.envelope()).await?;
        finish(exchange, value);
        Ok(())
    }
}

pub struct AsyncHandler {
    action: Action,
}

#[async_trait]
impl RouteHandler for AsyncHandler {
    fn name(&self) -> &'static str {
        "async"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), WebError> {
        let envelope = exchange.envelope();
        let value = match &self.action {
            Action::Sync(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(envelope))
                    .await
                    .map_err(|e| WebError::unexpected("async-handler", e))??
            }
            Action::Async(f) => tokio::spawn(f(envelope))
                .await
                .map_err(|e| WebError::unexpected("async-handler", e))??,
        };
        finish(exchange, value);
        Ok(())
    }
}

pub struct RelayHandler {
    action: Action,
    address: String,
    bus: Arc<RelayBus>,
}

#[async_trait]
impl RouteHandler for RelayHandler {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn handle(&self, exchange: &mut Exchange) -> Result<(), WebError> {
        let envelope = exchange.envelope();
        let message = self.action.invoke(envelope.clone()).await?;
        let value = self
            .bus
            .request(&self.address, envelope.with_body(message))
            .await?;
        finish(exchange, value);
        Ok(())
    }
}

fn finish(exchange: &mut Exchange, value: Value) {
    exchange.end(Reply::json(value));
}

/// Resolution reads only the given descriptor and the immutable relay bus, so any
/// number of descriptors may be resolved concurrently.
#[derive(Clone)]
pub struct HandlerResolver {
    bus: Arc<RelayBus>,
}

impl HandlerResolver {
    pub fn new(bus: Arc<RelayBus>) -> Self {
        HandlerResolver { bus }
    }

    pub fn resolve(&self, descriptor: &RouteDescriptor) -> Result<Arc<dyn RouteHandler>, WebError> {
        let action = descriptor.action.clone().ok_or_else(|| {
            WebError::missing_action("resolver", descriptor.method.as_str(), &descriptor.path)
        })?;
        Ok(match &descriptor.kind {
            HandlerKind::Direct => Arc::new(DirectHandler { action }),
            HandlerKind::Async => Arc::new(AsyncHandler { action }),
            HandlerKind::Relay { address } => Arc::new(RelayHandler {
                action,
                address: address.clone(),
                bus: Arc::clone(&self.bus),
            }),
        })
    }
}
