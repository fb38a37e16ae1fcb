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

//! Capability seam over the external pub/sub broker client library.
//!
//! The router never speaks the broker wire protocol itself. Everything it
//! needs — connecting, opening sessions, producers and consumers, sending and
//! draining property-bag messages — goes through the trait objects below,
//! supplied by the agent's composition root.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Connection settings for one broker listener.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub security: EndpointSecurity,
}

/// Transport security material for a [`BrokerEndpoint`].
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EndpointSecurity {
    /// Plaintext transport, used in development deployments.
    DevMode,
    Tls {
        cert: String,
        keystore_password: String,
    },
}

/// Property-bag message as carried on the broker wire.
///
/// Mirrors the string/bytes property model of the underlying client library;
/// the routing core's address conventions (`receiver=...`, `key=...`) are
/// expressed as properties on this type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WireMessage {
    string_properties: HashMap<String, String>,
    bytes_properties: HashMap<String, Vec<u8>>,
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.string_properties.insert(key.into(), value.into());
    }

    pub fn put_bytes_property(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.bytes_properties.insert(key.into(), value);
    }

    pub fn string_property(&self, key: &str) -> Option<&str> {
        self.string_properties.get(key).map(String::as_str)
    }

    pub fn bytes_property(&self, key: &str) -> Option<&[u8]> {
        self.bytes_properties.get(key).map(Vec::as_slice)
    }
}

/// Failure reported by the broker client library.
#[derive(Clone, Debug)]
pub struct BrokerError {
    message: String,
}

impl BrokerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BrokerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "broker error: {}", self.message)
    }
}

impl Error for BrokerError {}

/// Session factory over one broker deployment.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Dials the endpoint and authenticates one session. Blocking for the
    /// duration of the TCP/TLS handshake.
    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<Arc<dyn BrokerSession>, BrokerError>;
}

/// One authenticated broker session; factory for producers and consumers.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn create_producer(&self, address: &str) -> Result<Arc<dyn BrokerProducer>, BrokerError>;

    /// Subscribes at `address`, optionally with a broker-side property filter
    /// such as `key='abc'`.
    async fn create_consumer(
        &self,
        address: &str,
        filter: Option<&str>,
    ) -> Result<Arc<dyn BrokerConsumer>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    fn address(&self) -> &str;

    async fn send(&self, message: WireMessage) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    fn is_closed(&self) -> bool;
}

#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    /// Non-blocking receive. A returned message is acknowledged to the broker
    /// as part of this call; `None` means nothing is pending.
    async fn receive_immediate(&self) -> Result<Option<WireMessage>, BrokerError>;

    /// Installs (or with `None` removes) the push-mode delivery handler.
    async fn set_handler(&self, handler: Option<Arc<dyn MessageHandler>>) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;

    fn is_closed(&self) -> bool;
}

/// Push-mode delivery callback installed on a [`BrokerConsumer`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: WireMessage);
}
