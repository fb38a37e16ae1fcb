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

//! Pool of pre-authenticated broker sessions to one connector endpoint.

use crate::broker::{BrokerClient, BrokerError, BrokerSession};
use crate::connector::endpoint::ConnectorEndpoint;
use crate::observability::events;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "session_pool";

pub(crate) const INITIAL_POOL_SIZE: usize = 5;

struct PoolState {
    free: Vec<Arc<dyn BrokerSession>>,
    in_use: Vec<Arc<dyn BrokerSession>>,
    shut_down: bool,
}

/// Owns every session dialed to one [`ConnectorEndpoint`].
///
/// Invariant: `size() == free + in_use`, and a session handed out by
/// [`acquire`](Self::acquire) is never concurrently handed out twice.
/// Session identity is `Arc` pointer identity.
pub struct ConnectorSessionPool {
    endpoint: ConnectorEndpoint,
    client: Arc<dyn BrokerClient>,
    initial_size: usize,
    state: Mutex<PoolState>,
}

impl ConnectorSessionPool {
    /// Eagerly dials `initial_size` sessions. Fails wholesale when the
    /// endpoint is unreachable, closing whatever was already opened; the
    /// caller retries on the health monitor's cadence.
    pub(crate) async fn create(
        client: Arc<dyn BrokerClient>,
        endpoint: ConnectorEndpoint,
    ) -> Result<Self, BrokerError> {
        Self::create_sized(client, endpoint, INITIAL_POOL_SIZE).await
    }

    pub(crate) async fn create_sized(
        client: Arc<dyn BrokerClient>,
        endpoint: ConnectorEndpoint,
        initial_size: usize,
    ) -> Result<Self, BrokerError> {
        let mut free = Vec::with_capacity(initial_size);
        for _ in 0..initial_size {
            match client.connect(&endpoint.broker).await {
                Ok(session) => free.push(session),
                Err(err) => {
                    for session in &free {
                        if let Err(close_err) = session.close().await {
                            warn!(
                                event = events::POOL_SESSION_CLOSE_FAILED,
                                component = COMPONENT,
                                connector_id = endpoint.connector_id,
                                err = %close_err,
                                "unable to close session while unwinding failed pool creation"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        debug!(
            event = events::POOL_CREATED,
            component = COMPONENT,
            connector_id = endpoint.connector_id,
            size = free.len(),
            "session pool created"
        );

        Ok(Self {
            endpoint,
            client,
            initial_size,
            state: Mutex::new(PoolState {
                free,
                in_use: Vec::new(),
                shut_down: false,
            }),
        })
    }

    /// Pops a free session, dialing one more on demand when the free list is
    /// empty. Errors mark the pool unusable from the caller's point of view.
    pub(crate) async fn acquire(&self) -> Result<Arc<dyn BrokerSession>, BrokerError> {
        {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return Err(BrokerError::new("session pool is shut down"));
            }
            if let Some(session) = state.free.pop() {
                state.in_use.push(session.clone());
                return Ok(session);
            }
        }

        // Dial outside the pool lock; releases stay responsive meanwhile.
        let session = self.client.connect(&self.endpoint.broker).await?;

        let mut state = self.state.lock().await;
        if state.shut_down {
            let _ = session.close().await;
            return Err(BrokerError::new("session pool is shut down"));
        }
        state.in_use.push(session.clone());
        Ok(session)
    }

    /// Returns a session to the free list, or closes it when the pool is
    /// already back at its initial size.
    pub(crate) async fn release(&self, session: &Arc<dyn BrokerSession>) {
        let over_quota = {
            let mut state = self.state.lock().await;
            let Some(position) = state
                .in_use
                .iter()
                .position(|held| Arc::ptr_eq(held, session))
            else {
                return;
            };
            let session = state.in_use.remove(position);
            if !state.shut_down && state.free.len() < self.initial_size {
                state.free.push(session);
                false
            } else {
                true
            }
        };

        if over_quota && !session.is_closed() {
            if let Err(err) = session.close().await {
                warn!(
                    event = events::POOL_SESSION_CLOSE_FAILED,
                    component = COMPONENT,
                    connector_id = self.endpoint.connector_id,
                    err = %err,
                    "unable to close released session"
                );
            }
        }
    }

    /// Reclaims in-use sessions and closes everything pooled. Idempotent.
    pub(crate) async fn shutdown(&self) {
        let sessions = {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let mut sessions = std::mem::take(&mut state.in_use);
            sessions.append(&mut state.free);
            sessions
        };

        for session in sessions {
            if !session.is_closed() {
                if let Err(err) = session.close().await {
                    warn!(
                        event = events::POOL_SESSION_CLOSE_FAILED,
                        component = COMPONENT,
                        connector_id = self.endpoint.connector_id,
                        err = %err,
                        "unable to close session during pool shutdown"
                    );
                }
            }
        }

        debug!(
            event = events::POOL_SHUTDOWN,
            component = COMPONENT,
            connector_id = self.endpoint.connector_id,
            "session pool shut down"
        );
    }

    #[cfg(test)]
    pub(crate) async fn size(&self) -> usize {
        let state = self.state.lock().await;
        state.free.len() + state.in_use.len()
    }

    #[cfg(test)]
    pub(crate) async fn free_and_in_use(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.free.len(), state.in_use.len())
    }
}
