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

//! Connector endpoint identity.

use crate::broker::BrokerEndpoint;
use serde::{Deserialize, Serialize};

/// One shared Connector broker reachable by multiple fog nodes.
///
/// Immutable value supplied by configuration sync and replaced wholesale on
/// change; structural equality is what decides whether an existing session
/// pool can be kept or must be rebuilt.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectorEndpoint {
    pub connector_id: u32,
    pub broker: BrokerEndpoint,
}
