/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! The routing façade: the only entry point the rest of the agent uses.

use crate::archive::{ArchiveError, MessageArchiveFactory};
use crate::broker::{BrokerClient, BrokerEndpoint, BrokerError};
use crate::config_source::RouteConfigSource;
use crate::connector::endpoint::ConnectorEndpoint;
use crate::connector::registry::ConnectorRegistry;
use crate::control_plane::reconciler::{RouteReconciler, RoutingState};
use crate::control_plane::route_table::RouteTable;
use crate::data_plane::local_bus::LocalBus;
use crate::data_plane::publisher::{MessagePublisher, PublishError};
use crate::data_plane::receiver::MessageReceiver;
use crate::message::Message;
use crate::observability::events;
use crate::observability::status::{RouterStatus, RouterStatusSnapshot};
use crate::realtime::RealtimeCallback;
use crate::runtime::health_monitor::HealthMonitor;
use crate::runtime::throughput::ThroughputMonitor;
use crate::runtime::ticker::TickerHandle;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const COMPONENT: &str = "routing_service";

/// Tuning knobs for [`MessageRoutingService`].
#[derive(Clone, Debug)]
pub struct RouterOptions {
    /// Namespace segment of connector topic addresses
    /// (`pubsub.<namespace>.<topic>`).
    pub namespace: String,
    pub health_interval: Duration,
    pub throughput_interval: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            namespace: crate::connector::registry::DEFAULT_NAMESPACE.to_string(),
            health_interval: Duration::from_secs(5),
            throughput_interval: Duration::from_secs(300),
        }
    }
}

/// Copy-on-write view of the live publisher/receiver maps. Hot paths read
/// this without touching the reconciliation lock.
#[derive(Clone, Default)]
pub(crate) struct RoutingSnapshot {
    pub(crate) publishers: Arc<HashMap<String, Arc<MessagePublisher>>>,
    pub(crate) receivers: Arc<HashMap<String, MessageReceiver>>,
}

/// Shared internals of the façade, also driven by the background monitors.
pub(crate) struct RouterCore {
    pub(crate) local_bus: LocalBus,
    pub(crate) registry: Arc<ConnectorRegistry>,
    pub(crate) archives: Arc<dyn MessageArchiveFactory>,
    pub(crate) realtime: Arc<dyn RealtimeCallback>,
    pub(crate) status: Arc<RouterStatus>,
    /// The reconciliation lock: every mutation of the routing maps happens
    /// under it.
    pub(crate) state: Mutex<RoutingState>,
    snapshot: RwLock<RoutingSnapshot>,
}

impl RouterCore {
    pub(crate) fn reconciler(&self) -> RouteReconciler<'_> {
        RouteReconciler::new(
            &self.local_bus,
            &self.registry,
            &self.archives,
            &self.realtime,
            &self.status,
        )
    }

    pub(crate) fn snapshot(&self) -> RoutingSnapshot {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    pub(crate) fn refresh_snapshot(&self, state: &RoutingState) {
        let fresh = RoutingSnapshot {
            publishers: Arc::new(state.publishers.clone()),
            receivers: Arc::new(state.receivers.clone()),
        };
        *self.snapshot.write().expect("snapshot lock poisoned") = fresh;
    }

    /// Stops every publisher and receiver, reconnects the local bus, and
    /// rebuilds the whole plane from the last applied route table.
    pub(crate) async fn restart_bus(&self) {
        let mut state = self.state.lock().await;
        for receiver in state.receivers.values() {
            receiver.close().await;
        }
        for publisher in state.publishers.values() {
            publisher.close().await;
        }
        state.receivers.clear();
        state.publishers.clear();

        match self.local_bus.start().await {
            Ok(()) => {
                let routes = state.routes.clone();
                self.reconciler().apply(&mut state, routes).await;
                info!(
                    event = events::BUS_RESTARTED,
                    component = COMPONENT,
                    "local bus restarted and routing reinitialized"
                );
            }
            // Leave the maps empty; the next health tick retries.
            Err(err) => {
                warn!(
                    event = events::BUS_RESTART_FAILED,
                    component = COMPONENT,
                    err = %err,
                    "unable to restart local bus"
                );
            }
        }
        self.refresh_snapshot(&state);
    }
}

/// Explicitly-constructed routing service owned by the agent's composition
/// root; no process-wide instances.
///
/// `publish` surfaces delivery errors to its caller; `update` never
/// propagates broker errors — affected resources degrade with warnings and
/// the health monitor repairs them.
pub struct MessageRoutingService {
    core: Arc<RouterCore>,
    options: RouterOptions,
    monitors: Mutex<Vec<TickerHandle>>,
}

impl MessageRoutingService {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        local_endpoint: BrokerEndpoint,
        archives: Arc<dyn MessageArchiveFactory>,
        realtime: Arc<dyn RealtimeCallback>,
    ) -> Self {
        Self::with_options(client, local_endpoint, archives, realtime, RouterOptions::default())
    }

    pub fn with_options(
        client: Arc<dyn BrokerClient>,
        local_endpoint: BrokerEndpoint,
        archives: Arc<dyn MessageArchiveFactory>,
        realtime: Arc<dyn RealtimeCallback>,
        options: RouterOptions,
    ) -> Self {
        let registry = Arc::new(ConnectorRegistry::with_namespace(
            client.clone(),
            options.namespace.clone(),
        ));
        let core = Arc::new(RouterCore {
            local_bus: LocalBus::new(client, local_endpoint),
            registry,
            archives,
            realtime,
            status: Arc::new(RouterStatus::new()),
            state: Mutex::new(RoutingState::default()),
            snapshot: RwLock::new(RoutingSnapshot::default()),
        });
        Self {
            core,
            options,
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Connects the local bus and starts the background monitors.
    pub async fn start(&self) -> Result<(), BrokerError> {
        self.core.local_bus.start().await?;

        let mut monitors = self.monitors.lock().await;
        if monitors.is_empty() {
            monitors.push(HealthMonitor::spawn(
                self.core.clone(),
                self.options.health_interval,
            ));
            monitors.push(ThroughputMonitor::spawn(
                self.core.status.clone(),
                self.options.throughput_interval,
            ));
        }

        info!(
            event = events::SERVICE_STARTED,
            component = COMPONENT,
            "message routing service started"
        );
        Ok(())
    }

    /// Stops the monitors, closes every receiver and publisher, tears down
    /// the connector registry and the local bus. Idempotent.
    pub async fn stop(&self) {
        for handle in self.monitors.lock().await.drain(..) {
            handle.stop().await;
        }

        {
            let mut state = self.core.state.lock().await;
            for receiver in state.receivers.values() {
                receiver.close().await;
            }
            for publisher in state.publishers.values() {
                publisher.close().await;
            }
            state.receivers.clear();
            state.publishers.clear();
            state.routes = RouteTable::new();
            self.core.refresh_snapshot(&state);
        }

        self.core.registry.shutdown().await;
        self.core.local_bus.stop().await;

        info!(
            event = events::SERVICE_STOPPED,
            component = COMPONENT,
            "message routing service stopped"
        );
    }

    /// Applies a new route table and connector endpoint set. Routes touching
    /// an unknown connector are skipped with a warning; unaffected flows are
    /// not disrupted.
    pub async fn update(&self, routes: RouteTable, endpoints: HashMap<u32, ConnectorEndpoint>) {
        self.core.registry.reconcile(endpoints).await;

        let mut state = self.core.state.lock().await;
        self.core.reconciler().apply(&mut state, routes).await;
        self.core.refresh_snapshot(&state);
        drop(state);

        self.core
            .status
            .set_connector_health(self.core.registry.connector_health().await);
        debug!(
            event = events::ROUTES_UPDATED,
            component = COMPONENT,
            "route table and endpoints applied"
        );
    }

    /// Convenience glue for the agent's sync layer: fetch from `source` and
    /// apply. Fetch failures are logged, keeping the previous configuration.
    pub async fn refresh_from(&self, source: &dyn RouteConfigSource) {
        match source.fetch().await {
            Ok((routes, endpoints)) => self.update(routes, endpoints).await,
            Err(err) => {
                warn!(
                    event = events::CONFIG_REFRESH_FAILED,
                    component = COMPONENT,
                    err = %err,
                    "unable to refresh routing configuration"
                );
            }
        }
    }

    /// Publishes on behalf of a local producing microservice.
    pub async fn publish(&self, producer_uuid: &str, message: Message) -> Result<(), PublishError> {
        let snapshot = self.core.snapshot();
        let Some(publisher) = snapshot.publishers.get(producer_uuid) else {
            return Err(PublishError::UnknownPublisher(producer_uuid.to_string()));
        };
        publisher.publish(message).await
    }

    /// Switches a local receiver to push-mode delivery. No-op for unknown
    /// or remote receivers.
    pub async fn enable_realtime(&self, microservice_uuid: &str) {
        if let Some(MessageReceiver::Local(local)) =
            self.core.snapshot().receivers.get(microservice_uuid)
        {
            local.enable_real_time().await;
        }
    }

    pub async fn disable_realtime(&self, microservice_uuid: &str) {
        if let Some(MessageReceiver::Local(local)) =
            self.core.snapshot().receivers.get(microservice_uuid)
        {
            local.disable_real_time().await;
        }
    }

    /// Drains pending messages for a local receiver in pull mode. Returns an
    /// empty list while real-time delivery is enabled, and for unknown or
    /// remote receivers.
    pub async fn drain_messages(&self, microservice_uuid: &str) -> Result<Vec<Message>, BrokerError> {
        match self.core.snapshot().receivers.get(microservice_uuid) {
            Some(MessageReceiver::Local(local)) => local.drain_messages().await,
            _ => Ok(Vec::new()),
        }
    }

    /// Messages archived for `producer_uuid` within `[from_ms, to_ms]`.
    /// Unknown producers yield an empty list.
    pub async fn query(
        &self,
        producer_uuid: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Message>, ArchiveError> {
        match self.core.snapshot().publishers.get(producer_uuid) {
            Some(publisher) => publisher.query(from_ms, to_ms).await,
            None => Ok(Vec::new()),
        }
    }

    pub fn status(&self) -> RouterStatusSnapshot {
        self.core.status.snapshot()
    }

    /// Runs one health-monitor pass synchronously, independent of the
    /// background cadence. Useful for tests and for agents that want an
    /// explicit repair hook.
    pub async fn run_health_tick(&self) {
        HealthMonitor::new(self.core.clone()).run_once().await;
    }
}
