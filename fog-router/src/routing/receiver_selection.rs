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

//! Receiver fan-out policy: which of a route's receivers the publisher
//! actually addresses.
//!
//! Local receivers are addressed individually. Remote receivers are grouped
//! by connector id and collapsed to one representative per group — the
//! receiver with the lowest microservice uuid — because all members of a
//! group share the same broker address and pass key; sending to more than
//! one would fan the same payload out twice on the connector side.

use crate::control_plane::route_table::{ReceiverRef, Route, RouteTable};
use std::collections::{BTreeMap, HashMap};

/// Distinct local receivers of `route`, deduplicated by uuid.
pub(crate) fn local_receivers(route: &Route) -> Vec<&ReceiverRef> {
    let mut by_uuid: BTreeMap<&str, &ReceiverRef> = BTreeMap::new();
    for receiver in route.receivers.iter().filter(|r| r.is_local) {
        by_uuid.entry(&receiver.microservice_uuid).or_insert(receiver);
    }
    by_uuid.into_values().collect()
}

/// One representative remote receiver per connector id, lowest microservice
/// uuid winning. Deterministic across invocations and iteration orders.
pub(crate) fn remote_group_representatives(route: &Route) -> Vec<&ReceiverRef> {
    let mut by_connector: BTreeMap<u32, &ReceiverRef> = BTreeMap::new();
    for receiver in route.receivers.iter().filter(|r| !r.is_local) {
        let Some(key) = &receiver.bridge else {
            continue;
        };
        by_connector
            .entry(key.connector_id)
            .and_modify(|current| {
                if receiver.microservice_uuid < current.microservice_uuid {
                    *current = receiver;
                }
            })
            .or_insert(receiver);
    }
    by_connector.into_values().collect()
}

/// The receivers a publisher addresses for `route`: all distinct local ones
/// plus one representative per remote connector group.
pub(crate) fn effective_receivers(route: &Route) -> Vec<&ReceiverRef> {
    let mut selected = local_receivers(route);
    selected.extend(remote_group_representatives(route));
    selected
}

/// The union of effective receivers across a whole table, keyed by uuid.
/// This is the set the reconciler provisions consumers for.
pub(crate) fn effective_receiver_set(table: &RouteTable) -> HashMap<String, ReceiverRef> {
    let mut set = HashMap::new();
    for (_, route) in table.iter() {
        for receiver in effective_receivers(route) {
            set.entry(receiver.microservice_uuid.clone())
                .or_insert_with(|| receiver.clone());
        }
    }
    set
}
