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

//! Registry of connector session pools and the bridges built on them.
//!
//! Sole owner and sole mutator of both. Publishers and receivers borrow
//! bridges through the acquire/release methods here and never cache one
//! beyond the current operation without re-checking `is_closed()`; bindings
//! are reference-counted so routes sharing one bridge never double-close.

use crate::broker::{BrokerClient, BrokerError, BrokerSession};
use crate::connector::bridge::{BridgeConsumer, BridgeProducer};
use crate::connector::endpoint::ConnectorEndpoint;
use crate::connector::session_pool::ConnectorSessionPool;
use crate::control_plane::route_table::BridgeKey;
use crate::observability::{events, fields};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "connector_registry";

pub(crate) const DEFAULT_NAMESPACE: &str = "fog";

/// Failures surfaced by bridge acquisition.
#[derive(Debug)]
pub enum RegistryError {
    /// The connector id is not part of the current endpoint set.
    UnknownConnector(u32),
    /// The connector is configured but its pool could not be dialed yet.
    ConnectorUnavailable(u32),
    Broker(BrokerError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownConnector(connector_id) => {
                write!(f, "unknown connector id {connector_id}")
            }
            RegistryError::ConnectorUnavailable(connector_id) => {
                write!(f, "connector {connector_id} has no usable session pool")
            }
            RegistryError::Broker(err) => write!(f, "bridge creation failed: {err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Broker(err) => Some(err),
            _ => None,
        }
    }
}

struct BridgeBinding<T> {
    ref_count: usize,
    bridge: Arc<T>,
}

#[derive(Default)]
struct RegistryState {
    endpoints: HashMap<u32, ConnectorEndpoint>,
    pools: HashMap<u32, Arc<ConnectorSessionPool>>,
    producers: HashMap<BridgeKey, BridgeBinding<BridgeProducer>>,
    consumers: HashMap<BridgeKey, BridgeBinding<BridgeConsumer>>,
}

pub struct ConnectorRegistry {
    client: Arc<dyn BrokerClient>,
    namespace: String,
    inner: Mutex<RegistryState>,
}

impl ConnectorRegistry {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self::with_namespace(client, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(client: Arc<dyn BrokerClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            inner: Mutex::new(RegistryState::default()),
        }
    }

    fn topic_address(&self, key: &BridgeKey) -> String {
        format!("pubsub.{}.{}", self.namespace, key.topic)
    }

    fn pass_key_filter(key: &BridgeKey) -> String {
        format!("key='{}'", key.pass_key)
    }

    /// Brings the pool set in line with `new_endpoints`: unseen ids get a
    /// pool, structurally-equal ids are kept, changed ids are torn down and
    /// re-dialed, absent ids are torn down.
    ///
    /// Tear-down closes the connector's bridges before shutting the pool
    /// down, so dependents observe a clean closed state instead of sessions
    /// dying under them. Dialing happens outside the registry lock.
    pub async fn reconcile(&self, new_endpoints: HashMap<u32, ConnectorEndpoint>) {
        struct Doomed {
            connector_id: u32,
            pool: Option<Arc<ConnectorSessionPool>>,
            producers: Vec<Arc<BridgeProducer>>,
            consumers: Vec<Arc<BridgeConsumer>>,
        }

        let (doomed, to_dial) = {
            let mut state = self.inner.lock().await;

            let stale_ids: Vec<u32> = state
                .endpoints
                .keys()
                .copied()
                .filter(|id| new_endpoints.get(id) != state.endpoints.get(id))
                .collect();

            let doomed: Vec<Doomed> = stale_ids
                .into_iter()
                .map(|connector_id| Doomed {
                    connector_id,
                    pool: state.pools.remove(&connector_id),
                    producers: drain_bindings(&mut state.producers, connector_id),
                    consumers: drain_bindings(&mut state.consumers, connector_id),
                })
                .collect();

            state.endpoints = new_endpoints;
            let to_dial: Vec<ConnectorEndpoint> = state
                .endpoints
                .values()
                .filter(|endpoint| !state.pools.contains_key(&endpoint.connector_id))
                .cloned()
                .collect();

            (doomed, to_dial)
        };

        for doomed_connector in doomed {
            for producer in doomed_connector.producers {
                producer.close().await;
            }
            for consumer in doomed_connector.consumers {
                consumer.close().await;
            }
            if let Some(pool) = doomed_connector.pool {
                pool.shutdown().await;
            }
            debug!(
                event = events::CONNECTOR_POOL_REMOVED,
                component = COMPONENT,
                connector_id = doomed_connector.connector_id,
                "connector torn down"
            );
        }

        for endpoint in to_dial {
            self.dial_and_install(endpoint).await;
        }
    }

    /// Retries pool creation for connectors whose eager dial failed. Driven
    /// by the health monitor's tick; never touches working pools.
    pub(crate) async fn ensure_pools(&self) {
        let missing: Vec<ConnectorEndpoint> = {
            let state = self.inner.lock().await;
            state
                .endpoints
                .values()
                .filter(|endpoint| !state.pools.contains_key(&endpoint.connector_id))
                .cloned()
                .collect()
        };

        for endpoint in missing {
            debug!(
                event = events::CONNECTOR_DIAL_RETRY,
                component = COMPONENT,
                connector_id = endpoint.connector_id,
                "retrying connector pool creation"
            );
            self.dial_and_install(endpoint).await;
        }
    }

    async fn dial_and_install(&self, endpoint: ConnectorEndpoint) {
        let connector_id = endpoint.connector_id;
        match ConnectorSessionPool::create(self.client.clone(), endpoint.clone()).await {
            Ok(pool) => {
                let superseded = {
                    let mut state = self.inner.lock().await;
                    if state.endpoints.get(&connector_id) == Some(&endpoint)
                        && !state.pools.contains_key(&connector_id)
                    {
                        state.pools.insert(connector_id, Arc::new(pool));
                        None
                    } else {
                        Some(pool)
                    }
                };
                match superseded {
                    None => debug!(
                        event = events::CONNECTOR_POOL_INSTALLED,
                        component = COMPONENT,
                        connector_id,
                        "connector pool installed"
                    ),
                    // Endpoint changed while dialing; the newer reconcile owns it now.
                    Some(pool) => pool.shutdown().await,
                }
            }
            Err(err) => {
                warn!(
                    event = events::POOL_CREATE_FAILED,
                    component = COMPONENT,
                    connector_id,
                    err = %err,
                    "unable to create connector pool"
                );
            }
        }
    }

    /// Returns the live bridge producer for `key`, building one on a pooled
    /// session when none exists. `name` is the acquiring route entity,
    /// carried for log correlation.
    pub async fn bridge_producer(
        &self,
        name: &str,
        key: &BridgeKey,
    ) -> Result<Arc<BridgeProducer>, RegistryError> {
        let (pool, stale) = {
            let mut state = self.inner.lock().await;
            if let Some(binding) = state.producers.get_mut(key) {
                if !binding.bridge.is_closed() {
                    binding.ref_count += 1;
                    debug!(
                        event = events::BRIDGE_REUSED,
                        component = COMPONENT,
                        name,
                        connector_id = key.connector_id,
                        ref_count = binding.ref_count,
                        "reusing bridge producer"
                    );
                    return Ok(binding.bridge.clone());
                }
            }
            let stale = match state.producers.get(key) {
                Some(binding) if binding.bridge.is_closed() => {
                    state.producers.remove(key).map(|binding| binding.bridge)
                }
                _ => None,
            };
            let pool = self.pool_for(&state, key.connector_id)?;
            (pool, stale)
        };

        if let Some(stale) = stale {
            pool.release(stale.session()).await;
        }

        let session = pool.acquire().await.map_err(RegistryError::Broker)?;
        let producer = match session.create_producer(&self.topic_address(key)).await {
            Ok(producer) => producer,
            Err(err) => {
                pool.release(&session).await;
                warn!(
                    event = events::BRIDGE_PRODUCER_CREATE_FAILED,
                    component = COMPONENT,
                    name,
                    connector_id = key.connector_id,
                    err = %err,
                    "unable to create bridge producer"
                );
                return Err(RegistryError::Broker(err));
            }
        };
        let bridge = Arc::new(BridgeProducer::new(name, key.clone(), session, producer));

        let mut state = self.inner.lock().await;
        if let Some(binding) = state.producers.get_mut(key) {
            if !binding.bridge.is_closed() {
                // Lost the build race; keep the winner, give ours back.
                binding.ref_count += 1;
                let winner = binding.bridge.clone();
                drop(state);
                bridge.close().await;
                pool.release(bridge.session()).await;
                return Ok(winner);
            }
        }
        state.producers.insert(
            key.clone(),
            BridgeBinding {
                ref_count: 1,
                bridge: bridge.clone(),
            },
        );
        debug!(
            event = events::BRIDGE_PRODUCER_CREATE_OK,
            component = COMPONENT,
            name,
            bridge = %fields::format_bridge_key(key),
            "bridge producer created"
        );
        Ok(bridge)
    }

    /// Returns the live bridge consumer for `key`, subscribing with the
    /// pass-key filter when none exists.
    pub async fn bridge_consumer(
        &self,
        name: &str,
        key: &BridgeKey,
    ) -> Result<Arc<BridgeConsumer>, RegistryError> {
        let (pool, stale) = {
            let mut state = self.inner.lock().await;
            if let Some(binding) = state.consumers.get_mut(key) {
                if !binding.bridge.is_closed() {
                    binding.ref_count += 1;
                    debug!(
                        event = events::BRIDGE_REUSED,
                        component = COMPONENT,
                        name,
                        connector_id = key.connector_id,
                        ref_count = binding.ref_count,
                        "reusing bridge consumer"
                    );
                    return Ok(binding.bridge.clone());
                }
            }
            let stale = match state.consumers.get(key) {
                Some(binding) if binding.bridge.is_closed() => {
                    state.consumers.remove(key).map(|binding| binding.bridge)
                }
                _ => None,
            };
            let pool = self.pool_for(&state, key.connector_id)?;
            (pool, stale)
        };

        if let Some(stale) = stale {
            pool.release(stale.session()).await;
        }

        let session = pool.acquire().await.map_err(RegistryError::Broker)?;
        let consumer = match session
            .create_consumer(&self.topic_address(key), Some(&Self::pass_key_filter(key)))
            .await
        {
            Ok(consumer) => consumer,
            Err(err) => {
                pool.release(&session).await;
                warn!(
                    event = events::BRIDGE_CONSUMER_CREATE_FAILED,
                    component = COMPONENT,
                    name,
                    connector_id = key.connector_id,
                    err = %err,
                    "unable to create bridge consumer"
                );
                return Err(RegistryError::Broker(err));
            }
        };
        let bridge = Arc::new(BridgeConsumer::new(name, key.clone(), session, consumer));

        let mut state = self.inner.lock().await;
        if let Some(binding) = state.consumers.get_mut(key) {
            if !binding.bridge.is_closed() {
                binding.ref_count += 1;
                let winner = binding.bridge.clone();
                drop(state);
                bridge.close().await;
                pool.release(bridge.session()).await;
                return Ok(winner);
            }
        }
        state.consumers.insert(
            key.clone(),
            BridgeBinding {
                ref_count: 1,
                bridge: bridge.clone(),
            },
        );
        debug!(
            event = events::BRIDGE_CONSUMER_CREATE_OK,
            component = COMPONENT,
            name,
            bridge = %fields::format_bridge_key(key),
            "bridge consumer created"
        );
        Ok(bridge)
    }

    /// Drops one acquirer's hold on the producer for `key`; the bridge is
    /// physically closed when the last hold is released.
    pub async fn release_bridge_producer(&self, key: &BridgeKey) {
        let removed = {
            let mut state = self.inner.lock().await;
            let remaining = match state.producers.get_mut(key) {
                None => {
                    debug!(
                        event = events::BRIDGE_RELEASE_UNTRACKED,
                        component = COMPONENT,
                        connector_id = key.connector_id,
                        "release for untracked bridge producer"
                    );
                    None
                }
                Some(binding) => {
                    binding.ref_count = binding.ref_count.saturating_sub(1);
                    Some(binding.ref_count)
                }
            };
            match remaining {
                Some(0) => state.producers.remove(key).map(|binding| binding.bridge),
                Some(ref_count) => {
                    debug!(
                        event = events::BRIDGE_RELEASED,
                        component = COMPONENT,
                        connector_id = key.connector_id,
                        ref_count,
                        "bridge producer still shared"
                    );
                    None
                }
                None => None,
            }
        };

        if let Some(bridge) = removed {
            bridge.close().await;
            self.release_session_to_pool(key.connector_id, bridge.session())
                .await;
            debug!(
                event = events::BRIDGE_REMOVED,
                component = COMPONENT,
                bridge = %fields::format_bridge_key(key),
                "bridge producer closed"
            );
        }
    }

    /// Counterpart of [`release_bridge_producer`](Self::release_bridge_producer)
    /// for consumers.
    pub async fn release_bridge_consumer(&self, key: &BridgeKey) {
        let removed = {
            let mut state = self.inner.lock().await;
            let remaining = match state.consumers.get_mut(key) {
                None => {
                    debug!(
                        event = events::BRIDGE_RELEASE_UNTRACKED,
                        component = COMPONENT,
                        connector_id = key.connector_id,
                        "release for untracked bridge consumer"
                    );
                    None
                }
                Some(binding) => {
                    binding.ref_count = binding.ref_count.saturating_sub(1);
                    Some(binding.ref_count)
                }
            };
            match remaining {
                Some(0) => state.consumers.remove(key).map(|binding| binding.bridge),
                Some(ref_count) => {
                    debug!(
                        event = events::BRIDGE_RELEASED,
                        component = COMPONENT,
                        connector_id = key.connector_id,
                        ref_count,
                        "bridge consumer still shared"
                    );
                    None
                }
                None => None,
            }
        };

        if let Some(bridge) = removed {
            bridge.close().await;
            self.release_session_to_pool(key.connector_id, bridge.session())
                .await;
            debug!(
                event = events::BRIDGE_REMOVED,
                component = COMPONENT,
                bridge = %fields::format_bridge_key(key),
                "bridge consumer closed"
            );
        }
    }

    /// Force-closes the producer for `key` regardless of holds.
    pub async fn remove_bridge_producer(&self, key: &BridgeKey) {
        let removed = {
            let mut state = self.inner.lock().await;
            state.producers.remove(key).map(|binding| binding.bridge)
        };
        if let Some(bridge) = removed {
            bridge.close().await;
            self.release_session_to_pool(key.connector_id, bridge.session())
                .await;
        }
    }

    /// Force-closes the consumer for `key` regardless of holds.
    pub async fn remove_bridge_consumer(&self, key: &BridgeKey) {
        let removed = {
            let mut state = self.inner.lock().await;
            state.consumers.remove(key).map(|binding| binding.bridge)
        };
        if let Some(bridge) = removed {
            bridge.close().await;
            self.release_session_to_pool(key.connector_id, bridge.session())
                .await;
        }
    }

    /// Tears everything down: every bridge, then every pool. The endpoint
    /// set is cleared; a later `reconcile` starts fresh.
    pub async fn shutdown(&self) {
        let state = {
            let mut state = self.inner.lock().await;
            std::mem::take(&mut *state)
        };

        for binding in state.producers.into_values() {
            binding.bridge.close().await;
        }
        for binding in state.consumers.into_values() {
            binding.bridge.close().await;
        }
        for pool in state.pools.into_values() {
            pool.shutdown().await;
        }
    }

    pub(crate) async fn known_connector_ids(&self) -> HashSet<u32> {
        self.inner.lock().await.endpoints.keys().copied().collect()
    }

    /// Per-connector liveness: `true` when a usable pool is installed.
    pub(crate) async fn connector_health(&self) -> HashMap<u32, bool> {
        let state = self.inner.lock().await;
        state
            .endpoints
            .keys()
            .map(|&connector_id| (connector_id, state.pools.contains_key(&connector_id)))
            .collect()
    }

    fn pool_for(
        &self,
        state: &RegistryState,
        connector_id: u32,
    ) -> Result<Arc<ConnectorSessionPool>, RegistryError> {
        if !state.endpoints.contains_key(&connector_id) {
            return Err(RegistryError::UnknownConnector(connector_id));
        }
        state
            .pools
            .get(&connector_id)
            .cloned()
            .ok_or(RegistryError::ConnectorUnavailable(connector_id))
    }

    async fn release_session_to_pool(&self, connector_id: u32, session: &Arc<dyn BrokerSession>) {
        let pool = {
            let state = self.inner.lock().await;
            state.pools.get(&connector_id).cloned()
        };
        if let Some(pool) = pool {
            pool.release(session).await;
        }
    }
}

fn drain_bindings<T>(
    bindings: &mut HashMap<BridgeKey, BridgeBinding<T>>,
    connector_id: u32,
) -> Vec<Arc<T>> {
    let keys: Vec<BridgeKey> = bindings
        .keys()
        .filter(|key| key.connector_id == connector_id)
        .cloned()
        .collect();
    keys.into_iter()
        .filter_map(|key| bindings.remove(&key).map(|binding| binding.bridge))
        .collect()
}
