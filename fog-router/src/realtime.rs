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

//! Capability seam for push-mode delivery to local containers.

use crate::message::Message;
use async_trait::async_trait;

/// Invoked by the router for every message delivered to a receiver with
/// real-time receiving enabled.
#[async_trait]
pub trait RealtimeCallback: Send + Sync {
    async fn deliver(&self, microservice_uuid: &str, message: Message);
}
