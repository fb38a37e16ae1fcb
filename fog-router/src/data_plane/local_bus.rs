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

//! Holder of the local broker session the on-node message bus runs over.

use crate::broker::{BrokerClient, BrokerConsumer, BrokerEndpoint, BrokerError, BrokerProducer, BrokerSession};
use crate::message::PROP_RECEIVER;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Internal bus address every local producer publishes to; consumers select
/// their share with a `receiver='<uuid>'` filter.
pub(crate) const LOCAL_BUS_ADDRESS: &str = "fog.message_bus";

/// Producer/consumer factory over the single local broker session.
///
/// The broker itself is an external collaborator; "restarting" it from this
/// node's point of view means dialing a fresh session via [`start`](Self::start).
pub struct LocalBus {
    client: Arc<dyn BrokerClient>,
    endpoint: BrokerEndpoint,
    session: Mutex<Option<Arc<dyn BrokerSession>>>,
}

impl LocalBus {
    pub fn new(client: Arc<dyn BrokerClient>, endpoint: BrokerEndpoint) -> Self {
        Self {
            client,
            endpoint,
            session: Mutex::new(None),
        }
    }

    /// Dials the local broker, replacing (and closing) any previous session.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let fresh = self.client.connect(&self.endpoint).await?;
        let previous = {
            let mut session = self.session.lock().await;
            session.replace(fresh)
        };
        if let Some(previous) = previous {
            if !previous.is_closed() {
                let _ = previous.close().await;
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {
        let previous = self.session.lock().await.take();
        if let Some(previous) = previous {
            if !previous.is_closed() {
                let _ = previous.close().await;
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        match self.session.lock().await.as_ref() {
            Some(session) => !session.is_closed(),
            None => false,
        }
    }

    pub(crate) async fn create_producer(&self) -> Result<Arc<dyn BrokerProducer>, BrokerError> {
        self.current_session()
            .await?
            .create_producer(LOCAL_BUS_ADDRESS)
            .await
    }

    pub(crate) async fn create_consumer(
        &self,
        receiver_uuid: &str,
    ) -> Result<Arc<dyn BrokerConsumer>, BrokerError> {
        let filter = format!("{PROP_RECEIVER}='{receiver_uuid}'");
        self.current_session()
            .await?
            .create_consumer(LOCAL_BUS_ADDRESS, Some(&filter))
            .await
    }

    async fn current_session(&self) -> Result<Arc<dyn BrokerSession>, BrokerError> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|session| !session.is_closed())
            .cloned()
            .ok_or_else(|| BrokerError::new("local bus is not active"))
    }
}
