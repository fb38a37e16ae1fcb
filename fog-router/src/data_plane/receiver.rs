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

//! Inbound side of one microservice: either a pure local consumer with an
//! optional real-time callback, or a consumer wired to a bridge producer
//! that republishes into the remote connector.

use crate::broker::{BrokerConsumer, BrokerError, MessageHandler, WireMessage};
use crate::connector::bridge::BridgeProducer;
use crate::connector::registry::ConnectorRegistry;
use crate::control_plane::route_table::ReceiverRef;
use crate::message::Message;
use crate::observability::events;
use crate::realtime::RealtimeCallback;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "message_receiver";

/// The two receiver shapes, dispatched over one tagged surface.
#[derive(Clone)]
pub enum MessageReceiver {
    Local(Arc<LocalMessageReceiver>),
    Remote(Arc<RemoteMessageReceiver>),
}

impl MessageReceiver {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageReceiver::Local(_))
    }

    pub(crate) async fn update(&self, new_ref: ReceiverRef) {
        match self {
            MessageReceiver::Local(local) => local.update(new_ref).await,
            MessageReceiver::Remote(remote) => remote.update(new_ref).await,
        }
    }

    pub(crate) async fn close(&self) {
        match self {
            MessageReceiver::Local(local) => local.close().await,
            MessageReceiver::Remote(remote) => remote.close().await,
        }
    }

    pub(crate) fn is_consumer_closed(&self) -> bool {
        match self {
            MessageReceiver::Local(local) => local.consumer.is_closed(),
            MessageReceiver::Remote(remote) => remote.consumer.is_closed(),
        }
    }
}

struct LocalReceiverState {
    receiver: ReceiverRef,
    listening: bool,
    closed: bool,
}

/// Local consumer: pull-mode draining, or push-mode real-time delivery.
/// The two modes are mutually exclusive by construction — while a real-time
/// handler is installed, draining returns nothing.
pub struct LocalMessageReceiver {
    consumer: Arc<dyn BrokerConsumer>,
    callback: Arc<dyn RealtimeCallback>,
    state: Mutex<LocalReceiverState>,
}

impl LocalMessageReceiver {
    pub(crate) fn new(
        receiver: ReceiverRef,
        consumer: Arc<dyn BrokerConsumer>,
        callback: Arc<dyn RealtimeCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            consumer,
            callback,
            state: Mutex::new(LocalReceiverState {
                receiver,
                listening: false,
                closed: false,
            }),
        })
    }

    pub async fn enable_real_time(&self) {
        let mut state = self.state.lock().await;
        if state.closed || state.listening || self.consumer.is_closed() {
            return;
        }
        let handler: Arc<dyn MessageHandler> = Arc::new(RealtimeForwarder {
            microservice_uuid: state.receiver.microservice_uuid.clone(),
            callback: self.callback.clone(),
        });
        match self.consumer.set_handler(Some(handler)).await {
            Ok(()) => {
                state.listening = true;
                debug!(
                    event = events::REALTIME_ENABLED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    "real-time receiving enabled"
                );
            }
            Err(err) => {
                warn!(
                    event = events::RECEIVER_HANDLER_FAILED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    err = %err,
                    "unable to install real-time handler"
                );
            }
        }
    }

    pub async fn disable_real_time(&self) {
        let mut state = self.state.lock().await;
        self.disable_real_time_locked(&mut state).await;
    }

    async fn disable_real_time_locked(&self, state: &mut LocalReceiverState) {
        if !state.listening {
            return;
        }
        state.listening = false;
        if let Err(err) = self.consumer.set_handler(None).await {
            warn!(
                event = events::RECEIVER_HANDLER_FAILED,
                component = COMPONENT,
                receiver = state.receiver.microservice_uuid.as_str(),
                err = %err,
                "unable to remove real-time handler"
            );
        } else {
            debug!(
                event = events::REALTIME_DISABLED,
                component = COMPONENT,
                receiver = state.receiver.microservice_uuid.as_str(),
                "real-time receiving disabled"
            );
        }
    }

    /// Drains pending messages in pull mode. Returns an empty list while a
    /// real-time handler is attached.
    pub async fn drain_messages(&self) -> Result<Vec<Message>, BrokerError> {
        let state = self.state.lock().await;
        if state.closed || state.listening {
            return Ok(Vec::new());
        }

        let mut drained = Vec::new();
        while let Some(wire) = self.consumer.receive_immediate().await? {
            if let Some(message) = Message::from_wire(&wire) {
                drained.push(message);
            }
        }
        Ok(drained)
    }

    async fn update(&self, new_ref: ReceiverRef) {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.receiver = new_ref;
        }
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        self.disable_real_time_locked(&mut state).await;
        if !self.consumer.is_closed() {
            if let Err(err) = self.consumer.close().await {
                warn!(
                    event = events::RECEIVER_HANDLER_FAILED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    err = %err,
                    "unable to close local consumer"
                );
            }
        }
    }
}

struct RealtimeForwarder {
    microservice_uuid: String,
    callback: Arc<dyn RealtimeCallback>,
}

#[async_trait]
impl MessageHandler for RealtimeForwarder {
    async fn on_message(&self, wire: WireMessage) {
        if let Some(message) = Message::from_wire(&wire) {
            self.callback.deliver(&self.microservice_uuid, message).await;
        }
    }
}

struct RemoteReceiverState {
    receiver: ReceiverRef,
    bridge: Option<Arc<BridgeProducer>>,
    closed: bool,
}

/// Remote receiver: every message delivered to its local consumer is
/// republished into the connector through a registry-owned bridge producer.
pub struct RemoteMessageReceiver {
    consumer: Arc<dyn BrokerConsumer>,
    registry: Arc<ConnectorRegistry>,
    state: Mutex<RemoteReceiverState>,
}

impl RemoteMessageReceiver {
    pub(crate) async fn new(
        receiver: ReceiverRef,
        consumer: Arc<dyn BrokerConsumer>,
        registry: Arc<ConnectorRegistry>,
    ) -> Arc<Self> {
        let remote = Arc::new(Self {
            consumer,
            registry,
            state: Mutex::new(RemoteReceiverState {
                receiver,
                bridge: None,
                closed: false,
            }),
        });
        remote.enable_connector_producing().await;
        remote
    }

    /// Binds (or rebinds) the registry's bridge producer for this receiver's
    /// key and wires the local consumer into it.
    pub(crate) async fn enable_connector_producing(&self) {
        let mut state = self.state.lock().await;
        self.enable_connector_producing_locked(&mut state).await;
    }

    async fn enable_connector_producing_locked(&self, state: &mut RemoteReceiverState) {
        if state.closed || self.consumer.is_closed() {
            return;
        }
        if state
            .bridge
            .as_ref()
            .is_some_and(|bridge| !bridge.is_closed())
        {
            return;
        }
        let Some(key) = state.receiver.bridge.clone() else {
            warn!(
                event = events::CONNECTOR_PRODUCING_UNAVAILABLE,
                component = COMPONENT,
                receiver = state.receiver.microservice_uuid.as_str(),
                reason = "remote receiver without bridge key",
                "unable to enable connector producing"
            );
            return;
        };

        if let Some(stale) = state.bridge.take() {
            self.registry.release_bridge_producer(stale.key()).await;
        }

        match self
            .registry
            .bridge_producer(&state.receiver.microservice_uuid, &key)
            .await
        {
            Ok(bridge) => {
                let handler: Arc<dyn MessageHandler> = Arc::new(BridgeForwardHandler {
                    bridge: bridge.clone(),
                });
                if let Err(err) = self.consumer.set_handler(Some(handler)).await {
                    warn!(
                        event = events::RECEIVER_HANDLER_FAILED,
                        component = COMPONENT,
                        receiver = state.receiver.microservice_uuid.as_str(),
                        err = %err,
                        "unable to install bridge forward handler"
                    );
                }
                state.bridge = Some(bridge);
                debug!(
                    event = events::CONNECTOR_PRODUCING_ENABLED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    connector_id = key.connector_id,
                    "connector producing enabled"
                );
            }
            Err(err) => {
                warn!(
                    event = events::CONNECTOR_PRODUCING_UNAVAILABLE,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    connector_id = key.connector_id,
                    err = %err,
                    "unable to enable connector producing"
                );
            }
        }
    }

    async fn disable_connector_producing_locked(&self, state: &mut RemoteReceiverState) {
        if let Some(bridge) = state.bridge.take() {
            if let Err(err) = self.consumer.set_handler(None).await {
                warn!(
                    event = events::RECEIVER_HANDLER_FAILED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    err = %err,
                    "unable to remove bridge forward handler"
                );
            }
            self.registry.release_bridge_producer(bridge.key()).await;
        }
    }

    /// Rebuilds the bridge binding only when the bridge key changed;
    /// otherwise just swaps the receiver reference.
    async fn update(&self, new_ref: ReceiverRef) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        if state.receiver.bridge != new_ref.bridge {
            self.disable_connector_producing_locked(&mut state).await;
            state.receiver = new_ref;
            self.enable_connector_producing_locked(&mut state).await;
        } else {
            state.receiver = new_ref;
        }
    }

    /// Releases the bridge producer through the registry — another route may
    /// still hold it — and closes the local consumer. Idempotent.
    async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        self.disable_connector_producing_locked(&mut state).await;
        if !self.consumer.is_closed() {
            if let Err(err) = self.consumer.close().await {
                warn!(
                    event = events::RECEIVER_HANDLER_FAILED,
                    component = COMPONENT,
                    receiver = state.receiver.microservice_uuid.as_str(),
                    err = %err,
                    "unable to close local consumer"
                );
            }
        }
    }

    /// Whether the forward path needs repair: no live bridge producer bound.
    pub(crate) async fn needs_connector_producing(&self) -> bool {
        let state = self.state.lock().await;
        !state.closed
            && !state
                .bridge
                .as_ref()
                .is_some_and(|bridge| !bridge.is_closed())
    }
}

struct BridgeForwardHandler {
    bridge: Arc<BridgeProducer>,
}

#[async_trait]
impl MessageHandler for BridgeForwardHandler {
    async fn on_message(&self, wire: WireMessage) {
        let Some(message) = Message::from_wire(&wire) else {
            return;
        };
        if let Err(err) = self.bridge.send(&message).await {
            warn!(
                event = events::BRIDGE_FORWARD_FAILED,
                component = COMPONENT,
                receiver = self.bridge.name(),
                connector_id = self.bridge.key().connector_id,
                err = %err,
                "unable to forward message over bridge"
            );
        }
    }
}
