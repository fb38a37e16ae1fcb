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

//! Route reconciliation: given the live publisher/receiver sets and a new
//! route table, perform the minimal create/update/close churn.

use crate::archive::{ArchiveError, MessageArchiveFactory};
use crate::broker::BrokerError;
use crate::connector::registry::ConnectorRegistry;
use crate::control_plane::route_table::{ReceiverRef, Route, RouteTable};
use crate::data_plane::local_bus::LocalBus;
use crate::data_plane::publisher::MessagePublisher;
use crate::data_plane::receiver::{LocalMessageReceiver, MessageReceiver, RemoteMessageReceiver};
use crate::observability::events;
use crate::observability::status::RouterStatus;
use crate::realtime::RealtimeCallback;
use crate::routing::receiver_selection;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tracing::{debug, warn};

const COMPONENT: &str = "route_reconciler";

/// Failure while provisioning one publisher or receiver. The reconciler
/// logs these and moves on; the health monitor picks the entry up later.
#[derive(Debug)]
pub(crate) enum ProvisionError {
    Broker(BrokerError),
    Archive(ArchiveError),
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionError::Broker(err) => write!(f, "broker resource creation failed: {err}"),
            ProvisionError::Archive(err) => write!(f, "archive open failed: {err}"),
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProvisionError::Broker(err) => Some(err),
            ProvisionError::Archive(err) => Some(err),
        }
    }
}

impl From<BrokerError> for ProvisionError {
    fn from(err: BrokerError) -> Self {
        ProvisionError::Broker(err)
    }
}

impl From<ArchiveError> for ProvisionError {
    fn from(err: ArchiveError) -> Self {
        ProvisionError::Archive(err)
    }
}

/// The routing state guarded by the façade's reconciliation lock.
#[derive(Default)]
pub(crate) struct RoutingState {
    pub(crate) routes: RouteTable,
    pub(crate) publishers: HashMap<String, Arc<MessagePublisher>>,
    pub(crate) receivers: HashMap<String, MessageReceiver>,
}

/// Coordinates one reconciliation pass over existing domain owners. The
/// caller holds the reconciliation lock for the duration of `apply`.
pub(crate) struct RouteReconciler<'a> {
    local_bus: &'a LocalBus,
    registry: &'a Arc<ConnectorRegistry>,
    archives: &'a Arc<dyn MessageArchiveFactory>,
    realtime: &'a Arc<dyn RealtimeCallback>,
    status: &'a Arc<RouterStatus>,
}

impl<'a> RouteReconciler<'a> {
    pub(crate) fn new(
        local_bus: &'a LocalBus,
        registry: &'a Arc<ConnectorRegistry>,
        archives: &'a Arc<dyn MessageArchiveFactory>,
        realtime: &'a Arc<dyn RealtimeCallback>,
        status: &'a Arc<RouterStatus>,
    ) -> Self {
        Self {
            local_bus,
            registry,
            archives,
            realtime,
            status,
        }
    }

    /// Brings `state` in line with `new_routes`: after this returns, live
    /// publisher ids equal the table's producer ids and live receiver ids
    /// equal its effective receiver set, independent of iteration order.
    pub(crate) async fn apply(&self, state: &mut RoutingState, mut new_routes: RouteTable) {
        new_routes.retain_known_connectors(&self.registry.known_connector_ids().await);
        let new_receivers = receiver_selection::effective_receiver_set(&new_routes);

        for (producer_uuid, publisher) in &state.publishers {
            match new_routes.get(producer_uuid) {
                None => publisher.close().await,
                Some(route) => publisher.update_route(route.clone()).await,
            }
        }
        state
            .publishers
            .retain(|producer_uuid, _| new_routes.contains(producer_uuid));

        for (producer_uuid, route) in new_routes.iter() {
            if state.publishers.contains_key(producer_uuid) {
                continue;
            }
            match self.create_publisher(route).await {
                Ok(publisher) => {
                    state.publishers.insert(producer_uuid.clone(), publisher);
                }
                Err(err) => {
                    warn!(
                        event = events::PUBLISHER_PROVISION_FAILED,
                        component = COMPONENT,
                        producer = producer_uuid.as_str(),
                        err = %err,
                        "unable to provision publisher"
                    );
                }
            }
        }

        for (receiver_uuid, receiver) in &state.receivers {
            match new_receivers.get(receiver_uuid) {
                None => receiver.close().await,
                // A locality flip cannot be applied in place; close here and
                // let the creation pass below rebuild the other variant.
                Some(new_ref) if receiver.is_local() != new_ref.is_local => {
                    receiver.close().await;
                }
                Some(new_ref) => receiver.update(new_ref.clone()).await,
            }
        }
        state.receivers.retain(|receiver_uuid, receiver| {
            new_receivers
                .get(receiver_uuid)
                .is_some_and(|new_ref| new_ref.is_local == receiver.is_local())
        });

        for (receiver_uuid, receiver_ref) in &new_receivers {
            if state.receivers.contains_key(receiver_uuid) {
                continue;
            }
            match self.create_receiver(receiver_ref).await {
                Ok(receiver) => {
                    state.receivers.insert(receiver_uuid.clone(), receiver);
                }
                Err(err) => {
                    warn!(
                        event = events::RECEIVER_PROVISION_FAILED,
                        component = COMPONENT,
                        receiver = receiver_uuid.as_str(),
                        err = %err,
                        "unable to provision receiver"
                    );
                }
            }
        }

        state.routes = new_routes;
        self.status
            .prune_publishers(state.publishers.keys().map(String::as_str));
        debug!(
            event = events::RECONCILE_APPLIED,
            component = COMPONENT,
            publishers = state.publishers.len(),
            receivers = state.receivers.len(),
            "route table applied"
        );
    }

    pub(crate) async fn create_publisher(
        &self,
        route: &Route,
    ) -> Result<Arc<MessagePublisher>, ProvisionError> {
        let producer = self.local_bus.create_producer().await?;
        let archive = self
            .archives
            .open(&route.producer.microservice_uuid)
            .await?;
        Ok(MessagePublisher::new(
            route.clone(),
            producer,
            archive,
            self.registry.clone(),
            self.status.clone(),
        )
        .await)
    }

    pub(crate) async fn create_receiver(
        &self,
        receiver_ref: &ReceiverRef,
    ) -> Result<MessageReceiver, ProvisionError> {
        let consumer = self
            .local_bus
            .create_consumer(&receiver_ref.microservice_uuid)
            .await?;
        Ok(if receiver_ref.is_local {
            MessageReceiver::Local(LocalMessageReceiver::new(
                receiver_ref.clone(),
                consumer,
                self.realtime.clone(),
            ))
        } else {
            MessageReceiver::Remote(
                RemoteMessageReceiver::new(receiver_ref.clone(), consumer, self.registry.clone())
                    .await,
            )
        })
    }
}
