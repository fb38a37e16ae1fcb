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

//! Immutable message value and its wire representation.

use crate::broker::WireMessage;
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes property carrying the opaque payload.
pub(crate) const PROP_MESSAGE: &str = "message";
/// String property addressing a local receiver on the internal bus.
pub(crate) const PROP_RECEIVER: &str = "receiver";
/// String property carrying the pass key on connector-bound messages.
pub(crate) const PROP_KEY: &str = "key";
pub(crate) const PROP_TIMESTAMP: &str = "timestamp";
pub(crate) const PROP_ID: &str = "id";

/// One routed message. Immutable once constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    bytes: Vec<u8>,
    timestamp_ms: i64,
    id: Option<String>,
}

impl Message {
    pub fn new(bytes: Vec<u8>, timestamp_ms: i64) -> Self {
        Self {
            bytes,
            timestamp_ms,
            id: None,
        }
    }

    pub fn with_id(bytes: Vec<u8>, timestamp_ms: i64, id: impl Into<String>) -> Self {
        Self {
            bytes,
            timestamp_ms,
            id: Some(id.into()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Stamps a generated id when the caller did not supply one.
    pub(crate) fn ensure_id(self) -> Self {
        if self.id.is_some() {
            return self;
        }
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            ..self
        }
    }

    pub(crate) fn to_wire(&self) -> WireMessage {
        let mut wire = WireMessage::new();
        wire.put_bytes_property(PROP_MESSAGE, self.bytes.clone());
        wire.put_string_property(PROP_TIMESTAMP, self.timestamp_ms.to_string());
        if let Some(id) = &self.id {
            wire.put_string_property(PROP_ID, id.clone());
        }
        wire
    }

    /// Rebuilds a message from the wire. Returns `None` when the payload
    /// property is missing; a missing or unparsable timestamp falls back to
    /// the receipt time.
    pub(crate) fn from_wire(wire: &WireMessage) -> Option<Self> {
        let bytes = wire.bytes_property(PROP_MESSAGE)?.to_vec();
        let timestamp_ms = wire
            .string_property(PROP_TIMESTAMP)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(now_ms);
        Some(Self {
            bytes,
            timestamp_ms,
            id: wire.string_property(PROP_ID).map(str::to_string),
        })
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
