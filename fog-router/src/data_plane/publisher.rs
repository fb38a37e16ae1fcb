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

//! Outbound side of one route: archive, local fan-out, and the connector
//! ingest path for routes whose producer lives on another node.

use crate::archive::MessageArchive;
use crate::broker::{BrokerError, BrokerProducer, MessageHandler, WireMessage};
use crate::connector::bridge::BridgeConsumer;
use crate::connector::registry::ConnectorRegistry;
use crate::control_plane::route_table::Route;
use crate::message::{Message, PROP_RECEIVER};
use crate::observability::events;
use crate::observability::status::RouterStatus;
use crate::routing::receiver_selection;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "message_publisher";

/// Failure surfaced to `publish` callers.
#[derive(Debug)]
pub enum PublishError {
    /// The publisher was closed while the call was in flight.
    Closed(String),
    /// No publisher exists for the given producer uuid.
    UnknownPublisher(String),
    Delivery(BrokerError),
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Closed(producer_uuid) => {
                write!(f, "publisher for {producer_uuid} is closed")
            }
            PublishError::UnknownPublisher(producer_uuid) => {
                write!(f, "no publisher for producer {producer_uuid}")
            }
            PublishError::Delivery(err) => write!(f, "message delivery failed: {err}"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PublishError::Delivery(err) => Some(err),
            _ => None,
        }
    }
}

struct PublisherState {
    route: Route,
    producer: Arc<dyn BrokerProducer>,
    bridge_consumer: Option<Arc<BridgeConsumer>>,
    closed: bool,
}

/// Owns one local route's outbound side.
///
/// `publish`, `update_route` and `close` serialize on one internal mutex, so
/// per-route ordering follows call order and a route update is atomic
/// relative to in-flight publishes on the same route.
pub struct MessagePublisher {
    producer_uuid: String,
    archive: Arc<dyn MessageArchive>,
    registry: Arc<ConnectorRegistry>,
    status: Arc<RouterStatus>,
    state: Mutex<PublisherState>,
}

impl MessagePublisher {
    pub(crate) async fn new(
        route: Route,
        producer: Arc<dyn BrokerProducer>,
        archive: Arc<dyn MessageArchive>,
        registry: Arc<ConnectorRegistry>,
        status: Arc<RouterStatus>,
    ) -> Arc<Self> {
        let publisher = Arc::new(Self {
            producer_uuid: route.producer.microservice_uuid.clone(),
            archive,
            registry,
            status,
            state: Mutex::new(PublisherState {
                route,
                producer,
                bridge_consumer: None,
                closed: false,
            }),
        });
        publisher.enable_connector_consuming().await;
        publisher
    }

    /// Archives `message` best-effort, then fans it out: one local bus send
    /// per distinct local receiver, one per remote connector group (addressed
    /// to the group representative, whose bridge does the remote hop).
    pub async fn publish(&self, message: Message) -> Result<(), PublishError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(PublishError::Closed(self.producer_uuid.clone()));
        }

        let message = message.ensure_id();
        if let Err(err) = self
            .archive
            .save(message.bytes(), message.timestamp_ms())
            .await
        {
            warn!(
                event = events::PUBLISH_ARCHIVE_FAILED,
                component = COMPONENT,
                producer = self.producer_uuid.as_str(),
                err = %err,
                "unable to archive message"
            );
        }

        for receiver in receiver_selection::effective_receivers(&state.route) {
            let mut wire = message.to_wire();
            wire.put_string_property(PROP_RECEIVER, receiver.microservice_uuid.clone());
            if let Err(err) = state.producer.send(wire).await {
                warn!(
                    event = events::PUBLISH_SEND_FAILED,
                    component = COMPONENT,
                    producer = self.producer_uuid.as_str(),
                    receiver = receiver.microservice_uuid.as_str(),
                    err = %err,
                    "unable to send message"
                );
                return Err(PublishError::Delivery(err));
            }
        }

        self.status.record_published(&self.producer_uuid);
        Ok(())
    }

    /// Entry point for messages arriving over the connector when this
    /// route's producer is remote; failures degrade to warnings because
    /// there is no caller to surface them to.
    async fn ingest(&self, message: Message) {
        if let Err(err) = self.publish(message).await {
            warn!(
                event = events::CONNECTOR_INGEST_FAILED,
                component = COMPONENT,
                producer = self.producer_uuid.as_str(),
                err = %err,
                "unable to ingest connector message"
            );
        }
    }

    /// Wires a bridge consumer into the ingest path when the route's
    /// producer is remote. No-op for local producers or when a live bridge
    /// is already attached.
    pub(crate) async fn enable_connector_consuming(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        self.enable_connector_consuming_locked(&mut state).await;
    }

    async fn enable_connector_consuming_locked(self: &Arc<Self>, state: &mut PublisherState) {
        if state.closed || state.route.producer.is_local {
            return;
        }
        if state
            .bridge_consumer
            .as_ref()
            .is_some_and(|bridge| !bridge.is_closed())
        {
            return;
        }
        let Some(key) = state.route.producer.bridge.clone() else {
            warn!(
                event = events::CONNECTOR_CONSUMING_UNAVAILABLE,
                component = COMPONENT,
                producer = self.producer_uuid.as_str(),
                reason = "remote producer without bridge key",
                "unable to enable connector consuming"
            );
            return;
        };

        if let Some(stale) = state.bridge_consumer.take() {
            let _ = stale.clear_handler().await;
            self.registry.release_bridge_consumer(stale.key()).await;
        }

        match self.registry.bridge_consumer(&self.producer_uuid, &key).await {
            Ok(bridge) => {
                let handler: Arc<dyn MessageHandler> = Arc::new(ConnectorIngestHandler {
                    publisher: Arc::downgrade(self),
                });
                if let Err(err) = bridge.set_handler(handler).await {
                    warn!(
                        event = events::RECEIVER_HANDLER_FAILED,
                        component = COMPONENT,
                        producer = self.producer_uuid.as_str(),
                        err = %err,
                        "unable to install connector ingest handler"
                    );
                }
                state.bridge_consumer = Some(bridge);
                debug!(
                    event = events::CONNECTOR_CONSUMING_ENABLED,
                    component = COMPONENT,
                    producer = self.producer_uuid.as_str(),
                    connector_id = key.connector_id,
                    "connector consuming enabled"
                );
            }
            Err(err) => {
                warn!(
                    event = events::CONNECTOR_CONSUMING_UNAVAILABLE,
                    component = COMPONENT,
                    producer = self.producer_uuid.as_str(),
                    connector_id = key.connector_id,
                    err = %err,
                    "unable to enable connector consuming"
                );
            }
        }
    }

    async fn disable_connector_consuming_locked(&self, state: &mut PublisherState) {
        if let Some(bridge) = state.bridge_consumer.take() {
            let _ = bridge.clear_handler().await;
            self.registry.release_bridge_consumer(bridge.key()).await;
        }
    }

    /// Applies a new route definition. Structurally-equal routes are a
    /// no-op; a producer locality flip enables/disables connector consuming;
    /// a changed bridge key swaps the bridge; anything else only swaps the
    /// receiver set.
    pub(crate) async fn update_route(self: &Arc<Self>, new_route: Route) {
        let mut state = self.state.lock().await;
        if state.closed || state.route == new_route {
            return;
        }

        let was_local = state.route.producer.is_local;
        let now_local = new_route.producer.is_local;

        if was_local != now_local {
            if now_local {
                self.disable_connector_consuming_locked(&mut state).await;
                state.route = new_route;
            } else {
                state.route = new_route;
                self.enable_connector_consuming_locked(&mut state).await;
            }
        } else if !now_local && state.route.producer.bridge != new_route.producer.bridge {
            self.disable_connector_consuming_locked(&mut state).await;
            state.route = new_route;
            self.enable_connector_consuming_locked(&mut state).await;
        } else {
            state.route = new_route;
        }
    }

    /// Closes the archive handle, releases the bridge consumer and closes
    /// the local producer. Idempotent.
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;

        if let Err(err) = self.archive.close().await {
            warn!(
                event = events::PUBLISH_ARCHIVE_FAILED,
                component = COMPONENT,
                producer = self.producer_uuid.as_str(),
                err = %err,
                "unable to close archive"
            );
        }
        self.disable_connector_consuming_locked(&mut state).await;
        if !state.producer.is_closed() {
            if let Err(err) = state.producer.close().await {
                warn!(
                    event = events::PUBLISH_SEND_FAILED,
                    component = COMPONENT,
                    producer = self.producer_uuid.as_str(),
                    err = %err,
                    "unable to close local producer"
                );
            }
        }
    }

    /// Messages this publisher archived within `[from_ms, to_ms]`.
    pub async fn query(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Message>, crate::archive::ArchiveError> {
        self.archive.query(from_ms, to_ms).await
    }

    #[cfg(test)]
    pub(crate) async fn route(&self) -> Route {
        self.state.lock().await.route.clone()
    }

    pub(crate) async fn is_producer_closed(&self) -> bool {
        self.state.lock().await.producer.is_closed()
    }

    /// Whether the connector ingest path needs repair: remote producer
    /// route with no live bridge consumer attached.
    pub(crate) async fn needs_connector_consuming(&self) -> bool {
        let state = self.state.lock().await;
        !state.closed
            && !state.route.producer.is_local
            && !state
                .bridge_consumer
                .as_ref()
                .is_some_and(|bridge| !bridge.is_closed())
    }
}

struct ConnectorIngestHandler {
    publisher: Weak<MessagePublisher>,
}

#[async_trait]
impl MessageHandler for ConnectorIngestHandler {
    async fn on_message(&self, wire: WireMessage) {
        let Some(publisher) = self.publisher.upgrade() else {
            return;
        };
        match Message::from_wire(&wire) {
            Some(message) => publisher.ingest(message).await,
            None => {
                warn!(
                    event = events::CONNECTOR_INGEST_DROPPED,
                    component = COMPONENT,
                    producer = publisher.producer_uuid.as_str(),
                    reason = "missing payload property",
                    "dropping connector message"
                );
            }
        }
    }
}
