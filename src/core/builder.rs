use std::sync::Arc;

use crate::{
    config::ServerConfig,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
    transport::TransportRef,
};
use super::server::Server;

/// Builder for constructing a [`Server`] with optional features.
pub struct ServerBuilder {
    transport: TransportRef,
    cfg: ServerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ServerBuilder {
    /// Creates a new builder on `transport` with the default configuration.
    pub fn new(transport: TransportRef) -> Self {
        Self {
            transport,
            cfg: ServerConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the server configuration.
    pub fn with_config(mut self, cfg: ServerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (subscriptions, failures, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the server.
    ///
    /// Spawns one worker per subscriber, so it must be called inside a tokio
    /// runtime when subscribers are set.
    pub fn build(self) -> Server {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        Server::new_internal(self.cfg, self.transport, bus, subs)
    }
}
