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

//! The remote half of a route edge: producer/consumer wrappers bound to a
//! pooled connector session.

use crate::broker::{BrokerConsumer, BrokerError, BrokerProducer, BrokerSession, MessageHandler};
use crate::control_plane::route_table::BridgeKey;
use crate::message::{Message, PROP_KEY};
use crate::observability::events;
use std::sync::Arc;
use tracing::warn;

const COMPONENT: &str = "bridge";

/// Publishes into the shared broker address for one `(connector, topic)`
/// pair. `closed` state mirrors the underlying broker producer.
pub struct BridgeProducer {
    name: String,
    key: BridgeKey,
    session: Arc<dyn BrokerSession>,
    producer: Arc<dyn BrokerProducer>,
}

impl BridgeProducer {
    pub(crate) fn new(
        name: impl Into<String>,
        key: BridgeKey,
        session: Arc<dyn BrokerSession>,
        producer: Arc<dyn BrokerProducer>,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            session,
            producer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &BridgeKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.producer.is_closed()
    }

    /// Republishes `message` into the connector, stamped with this bridge's
    /// pass key.
    pub async fn send(&self, message: &Message) -> Result<(), BrokerError> {
        if self.producer.is_closed() {
            return Err(BrokerError::new("bridge producer is closed"));
        }
        let mut wire = message.to_wire();
        wire.put_string_property(PROP_KEY, self.key.pass_key.clone());
        self.producer.send(wire).await
    }

    pub(crate) async fn close(&self) {
        if self.producer.is_closed() {
            return;
        }
        if let Err(err) = self.producer.close().await {
            warn!(
                event = events::BRIDGE_CLOSE_FAILED,
                component = COMPONENT,
                name = self.name.as_str(),
                connector_id = self.key.connector_id,
                err = %err,
                "unable to close bridge producer"
            );
        }
    }

    pub(crate) fn session(&self) -> &Arc<dyn BrokerSession> {
        &self.session
    }
}

/// Subscribes to the shared broker address for one `(connector, topic)` pair
/// with a pass-key filter.
pub struct BridgeConsumer {
    name: String,
    key: BridgeKey,
    session: Arc<dyn BrokerSession>,
    consumer: Arc<dyn BrokerConsumer>,
}

impl BridgeConsumer {
    pub(crate) fn new(
        name: impl Into<String>,
        key: BridgeKey,
        session: Arc<dyn BrokerSession>,
        consumer: Arc<dyn BrokerConsumer>,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            session,
            consumer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &BridgeKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.consumer.is_closed()
    }

    pub(crate) async fn set_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        self.consumer.set_handler(Some(handler)).await
    }

    pub(crate) async fn clear_handler(&self) -> Result<(), BrokerError> {
        self.consumer.set_handler(None).await
    }

    pub(crate) async fn close(&self) {
        if self.consumer.is_closed() {
            return;
        }
        if let Err(err) = self.consumer.close().await {
            warn!(
                event = events::BRIDGE_CLOSE_FAILED,
                component = COMPONENT,
                name = self.name.as_str(),
                connector_id = self.key.connector_id,
                err = %err,
                "unable to close bridge consumer"
            );
        }
    }

    pub(crate) fn session(&self) -> &Arc<dyn BrokerSession> {
        &self.session
    }
}
