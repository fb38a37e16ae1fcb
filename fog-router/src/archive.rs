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

//! Capability seam for per-publisher message archival.

use crate::message::Message;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ArchiveError {
    message: String,
}

impl ArchiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "archive error: {}", self.message)
    }
}

impl Error for ArchiveError {}

/// Archival store for everything one publisher emits. Saving is best-effort
/// from the router's point of view; a failure never blocks fan-out.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    async fn save(&self, bytes: &[u8], timestamp_ms: i64) -> Result<(), ArchiveError>;

    async fn query(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Message>, ArchiveError>;

    async fn close(&self) -> Result<(), ArchiveError>;
}

/// Opens one archive handle per publishing microservice.
#[async_trait]
pub trait MessageArchiveFactory: Send + Sync {
    async fn open(&self, microservice_uuid: &str) -> Result<Arc<dyn MessageArchive>, ArchiveError>;
}
