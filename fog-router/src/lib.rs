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

//! # fog-router
//!
//! `fog-router` is the message-routing core of an edge-gateway ("fog node")
//! agent. It moves messages between local microservices over an internal
//! broker bus and, when a route crosses node boundaries, bridges them
//! through a shared Connector broker to microservices on other fog nodes.
//!
//! The broker client itself, message archival, real-time delivery, and the
//! configuration-sync protocol are external collaborators consumed through
//! capability traits ([`BrokerClient`], [`MessageArchive`],
//! [`RealtimeCallback`], [`RouteConfigSource`]); this crate owns the
//! routing/bridging control plane: route reconciliation, publisher and
//! receiver lifecycles, connector session pooling, bridge dedup, and the
//! background health monitor that repairs broken links.
//!
//! ## Usage
//!
//! The agent's composition root constructs one [`MessageRoutingService`]
//! and feeds it configuration:
//!
//! ```no_run
//! # use std::collections::HashMap;
//! # use std::sync::Arc;
//! # use fog_router::{
//! #     BrokerClient, BrokerEndpoint, EndpointSecurity, MessageArchiveFactory,
//! #     MessageRoutingService, RealtimeCallback, RouteTable,
//! # };
//! # async fn compose(
//! #     client: Arc<dyn BrokerClient>,
//! #     archives: Arc<dyn MessageArchiveFactory>,
//! #     realtime: Arc<dyn RealtimeCallback>,
//! # ) {
//! let local_endpoint = BrokerEndpoint {
//!     host: "127.0.0.1".to_string(),
//!     port: 61616,
//!     user: "fog".to_string(),
//!     password: "fog".to_string(),
//!     security: EndpointSecurity::DevMode,
//! };
//!
//! let service = MessageRoutingService::new(client, local_endpoint, archives, realtime);
//! service.start().await.expect("local bus reachable");
//! service.update(RouteTable::new(), HashMap::new()).await;
//! # }
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: [`MessageRoutingService`]
//! - Control plane: route-table model and the route reconciler
//! - Routing: receiver fan-out and connector-group dedup policy
//! - Connector plane: session pools, bridges, and their registry
//! - Data plane: the local bus, per-route publishers, per-service receivers
//! - Runtime: cancellable tickers driving the health/throughput monitors
//!
//! ## Observability model
//!
//! The crate emits `tracing` events with canonical event names and field
//! keys and does not install a global subscriber. Binaries and tests are
//! responsible for one-time subscriber initialization at process
//! boundaries.

mod archive;
mod broker;
mod config_source;
mod connector;
mod control_plane;
mod data_plane;
mod message;
#[doc(hidden)]
pub mod observability;
mod realtime;
mod routing;
mod runtime;
mod service;

pub use archive::{ArchiveError, MessageArchive, MessageArchiveFactory};
pub use broker::{
    BrokerClient, BrokerConsumer, BrokerEndpoint, BrokerError, BrokerProducer, BrokerSession,
    EndpointSecurity, MessageHandler, WireMessage,
};
pub use config_source::{ConfigSourceError, RouteConfigSource};
pub use connector::bridge::{BridgeConsumer, BridgeProducer};
pub use connector::endpoint::ConnectorEndpoint;
pub use connector::registry::{ConnectorRegistry, RegistryError};
pub use control_plane::route_table::{BridgeKey, ProducerRef, ReceiverRef, Route, RouteTable};
pub use data_plane::publisher::PublishError;
pub use message::Message;
pub use observability::status::{RouterStatus, RouterStatusSnapshot};
pub use realtime::RealtimeCallback;
pub use service::{MessageRoutingService, RouterOptions};
