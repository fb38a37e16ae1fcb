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

//! Background repair loop: the sole recovery mechanism for transient broker
//! disconnects.
//!
//! Each tick checks the local bus, retries failed connector pools, and
//! recreates closed producers/consumers in place. The reconciliation lock is
//! taken per entry, never across a whole tick, so routing keeps flowing for
//! unaffected routes while one is being repaired.

use crate::data_plane::receiver::MessageReceiver;
use crate::observability::events;
use crate::routing::receiver_selection;
use crate::runtime::ticker::{spawn_ticker, TickerHandle};
use crate::service::RouterCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "health_monitor";

pub(crate) struct HealthMonitor {
    core: Arc<RouterCore>,
}

impl HealthMonitor {
    pub(crate) fn new(core: Arc<RouterCore>) -> Self {
        Self { core }
    }

    pub(crate) fn spawn(core: Arc<RouterCore>, period: Duration) -> TickerHandle {
        let monitor = Arc::new(Self::new(core));
        spawn_ticker("health_monitor", period, move || {
            let monitor = monitor.clone();
            async move { monitor.run_once().await }
        })
    }

    /// One full health pass. Public within the crate so tests (and the
    /// façade) can drive a single tick synchronously.
    pub(crate) async fn run_once(&self) {
        if !self.core.local_bus.is_active().await {
            warn!(
                event = events::BUS_INACTIVE,
                component = COMPONENT,
                "local bus inactive; restarting"
            );
            self.core.restart_bus().await;
            return;
        }

        self.core.registry.ensure_pools().await;
        self.core
            .status
            .set_connector_health(self.core.registry.connector_health().await);

        self.repair_publishers().await;
        self.repair_receivers().await;
    }

    async fn repair_publishers(&self) {
        let producer_uuids: Vec<String> =
            self.core.snapshot().publishers.keys().cloned().collect();

        for producer_uuid in producer_uuids {
            let mut state = self.core.state.lock().await;
            let Some(publisher) = state.publishers.get(&producer_uuid).cloned() else {
                continue;
            };

            if publisher.is_producer_closed().await {
                publisher.close().await;
                match state.routes.get(&producer_uuid).cloned() {
                    None => {
                        // The route disappeared since; drop instead of recreating.
                        state.publishers.remove(&producer_uuid);
                        warn!(
                            event = events::MONITOR_PRODUCER_DROPPED,
                            component = COMPONENT,
                            producer = producer_uuid.as_str(),
                            "closed producer had no route; publisher dropped"
                        );
                    }
                    Some(route) => match self.core.reconciler().create_publisher(&route).await {
                        Ok(fresh) => {
                            state.publishers.insert(producer_uuid.clone(), fresh);
                            debug!(
                                event = events::MONITOR_PRODUCER_RESTORED,
                                component = COMPONENT,
                                producer = producer_uuid.as_str(),
                                "publisher recreated"
                            );
                        }
                        // Keep the closed entry; the next tick retries.
                        Err(err) => {
                            warn!(
                                event = events::MONITOR_REPAIR_FAILED,
                                component = COMPONENT,
                                producer = producer_uuid.as_str(),
                                err = %err,
                                "unable to recreate publisher"
                            );
                        }
                    },
                }
                self.core.refresh_snapshot(&state);
            } else if publisher.needs_connector_consuming().await {
                publisher.enable_connector_consuming().await;
            }
        }
    }

    async fn repair_receivers(&self) {
        let receiver_uuids: Vec<String> =
            self.core.snapshot().receivers.keys().cloned().collect();

        for receiver_uuid in receiver_uuids {
            let mut state = self.core.state.lock().await;
            let Some(receiver) = state.receivers.get(&receiver_uuid).cloned() else {
                continue;
            };

            if receiver.is_consumer_closed() {
                receiver.close().await;
                let current_ref = receiver_selection::effective_receiver_set(&state.routes)
                    .remove(&receiver_uuid);
                match current_ref {
                    None => {
                        state.receivers.remove(&receiver_uuid);
                        warn!(
                            event = events::MONITOR_CONSUMER_DROPPED,
                            component = COMPONENT,
                            receiver = receiver_uuid.as_str(),
                            "closed consumer no longer routed; receiver dropped"
                        );
                    }
                    Some(receiver_ref) => {
                        match self.core.reconciler().create_receiver(&receiver_ref).await {
                            Ok(fresh) => {
                                state.receivers.insert(receiver_uuid.clone(), fresh);
                                debug!(
                                    event = events::MONITOR_CONSUMER_RESTORED,
                                    component = COMPONENT,
                                    receiver = receiver_uuid.as_str(),
                                    "receiver recreated"
                                );
                            }
                            Err(err) => {
                                warn!(
                                    event = events::MONITOR_REPAIR_FAILED,
                                    component = COMPONENT,
                                    receiver = receiver_uuid.as_str(),
                                    err = %err,
                                    "unable to recreate receiver"
                                );
                            }
                        }
                    }
                }
                self.core.refresh_snapshot(&state);
            } else if let MessageReceiver::Remote(remote) = &receiver {
                if remote.needs_connector_producing().await {
                    remote.enable_connector_producing().await;
                }
            }
        }
    }
}
