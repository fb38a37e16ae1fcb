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

//! Capability seam for the agent's configuration-sync layer.

use crate::connector::endpoint::ConnectorEndpoint;
use crate::control_plane::route_table::RouteTable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug)]
pub struct ConfigSourceError {
    message: String,
}

impl ConfigSourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ConfigSourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "config source error: {}", self.message)
    }
}

impl Error for ConfigSourceError {}

/// Supplies the current route table and connector endpoint set. How and how
/// often the agent refreshes this is the sync layer's business; the router
/// only consumes the result.
#[async_trait]
pub trait RouteConfigSource: Send + Sync {
    async fn fetch(
        &self,
    ) -> Result<(RouteTable, HashMap<u32, ConnectorEndpoint>), ConfigSourceError>;
}
