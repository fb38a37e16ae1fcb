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

//! Shared scenario-test support: an in-memory mock broker that actually
//! routes messages by address and filter, plus recording archive/realtime
//! collaborators and route-table builders.

#![allow(dead_code)]

use async_trait::async_trait;
use fog_router::{
    ArchiveError, BridgeKey, BrokerClient, BrokerConsumer, BrokerEndpoint, BrokerError,
    BrokerProducer, BrokerSession, ConnectorEndpoint, EndpointSecurity, Message, MessageArchive,
    MessageArchiveFactory, MessageHandler, MessageRoutingService, ProducerRef, RealtimeCallback,
    ReceiverRef, Route, WireMessage,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const LOCAL_HOST: &str = "local-bus";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Mock broker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HubInner {
    unreachable: HashSet<String>,
    connects: HashMap<String, usize>,
    sessions: Vec<(String, Arc<MockSession>)>,
    producers: Vec<Arc<MockProducer>>,
    consumers: Vec<Arc<MockConsumer>>,
    events: Vec<String>,
}

/// Shared state behind every session/producer/consumer the mock hands out.
#[derive(Default)]
struct BrokerHub {
    inner: Mutex<HubInner>,
}

impl BrokerHub {
    fn record_event(&self, event: String) {
        self.inner.lock().unwrap().events.push(event);
    }

    fn matching_consumers(&self, address: &str, message: &WireMessage) -> Vec<Arc<MockConsumer>> {
        self.inner
            .lock()
            .unwrap()
            .consumers
            .iter()
            .filter(|consumer| {
                !consumer.is_closed()
                    && consumer.address == address
                    && consumer.filter_matches(message)
            })
            .cloned()
            .collect()
    }
}

/// In-memory broker: sessions, producers and consumers are tracked globally
/// so tests can inspect them, and `send` routes to every consumer whose
/// address and property filter match — one process-local pub/sub bus.
#[derive(Default)]
pub struct MockBroker {
    hub: Arc<BrokerHub>,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut inner = self.hub.inner.lock().unwrap();
        if unreachable {
            inner.unreachable.insert(host.to_string());
        } else {
            inner.unreachable.remove(host);
        }
    }

    pub fn connect_count(&self, host: &str) -> usize {
        self.hub
            .inner
            .lock()
            .unwrap()
            .connects
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    pub fn sessions_for(&self, host: &str) -> Vec<Arc<MockSession>> {
        self.hub
            .inner
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|(session_host, _)| session_host == host)
            .map(|(_, session)| session.clone())
            .collect()
    }

    pub fn open_sessions_for(&self, host: &str) -> Vec<Arc<MockSession>> {
        self.sessions_for(host)
            .into_iter()
            .filter(|session| !session.is_closed())
            .collect()
    }

    pub fn producers_at(&self, address: &str) -> Vec<Arc<MockProducer>> {
        self.hub
            .inner
            .lock()
            .unwrap()
            .producers
            .iter()
            .filter(|producer| producer.address == address)
            .cloned()
            .collect()
    }

    pub fn consumers_at(&self, address: &str) -> Vec<Arc<MockConsumer>> {
        self.hub
            .inner
            .lock()
            .unwrap()
            .consumers
            .iter()
            .filter(|consumer| consumer.address == address)
            .cloned()
            .collect()
    }

    pub fn open_producers_at(&self, address: &str) -> Vec<Arc<MockProducer>> {
        self.producers_at(address)
            .into_iter()
            .filter(|producer| !producer.closed.load(Ordering::Relaxed))
            .collect()
    }

    /// Filter values of the not-yet-closed consumers at `address`, sorted.
    pub fn open_consumer_filters(&self, address: &str) -> Vec<String> {
        let mut filters: Vec<String> = self
            .consumers_at(address)
            .into_iter()
            .filter(|consumer| !consumer.closed.load(Ordering::Relaxed))
            .filter_map(|consumer| consumer.filter_value().map(str::to_string))
            .collect();
        filters.sort_unstable();
        filters
    }

    /// Every wire message sent to `address`, across all producers.
    pub fn sent_to(&self, address: &str) -> Vec<WireMessage> {
        self.producers_at(address)
            .into_iter()
            .flat_map(|producer| producer.sent())
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.hub.inner.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
    ) -> Result<Arc<dyn BrokerSession>, BrokerError> {
        let session = {
            let mut inner = self.hub.inner.lock().unwrap();
            *inner.connects.entry(endpoint.host.clone()).or_insert(0) += 1;
            if inner.unreachable.contains(&endpoint.host) {
                return Err(BrokerError::new(format!(
                    "host {} unreachable",
                    endpoint.host
                )));
            }
            let session = Arc::new(MockSession {
                host: endpoint.host.clone(),
                closed: AtomicBool::new(false),
                children: Mutex::new(SessionChildren::default()),
            });
            inner
                .sessions
                .push((endpoint.host.clone(), session.clone()));
            session
        };
        Ok(Arc::new(SessionHandle {
            session,
            hub: self.hub.clone(),
        }))
    }
}

#[derive(Default)]
struct SessionChildren {
    producers: Vec<Arc<MockProducer>>,
    consumers: Vec<Arc<MockConsumer>>,
}

pub struct MockSession {
    host: String,
    closed: AtomicBool,
    children: Mutex<SessionChildren>,
}

impl MockSession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Simulates the broker side dropping this session and everything built
    /// on it.
    pub fn force_close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let children = self.children.lock().unwrap();
        for producer in &children.producers {
            producer.closed.store(true, Ordering::Relaxed);
        }
        for consumer in &children.consumers {
            consumer.closed.store(true, Ordering::Relaxed);
        }
    }
}

struct SessionHandle {
    session: Arc<MockSession>,
    hub: Arc<BrokerHub>,
}

#[async_trait]
impl BrokerSession for SessionHandle {
    async fn create_producer(&self, address: &str) -> Result<Arc<dyn BrokerProducer>, BrokerError> {
        if self.session.is_closed() {
            return Err(BrokerError::new("session is closed"));
        }
        let producer = Arc::new(MockProducer {
            address: address.to_string(),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            hub: self.hub.clone(),
        });
        self.session
            .children
            .lock()
            .unwrap()
            .producers
            .push(producer.clone());
        self.hub.inner.lock().unwrap().producers.push(producer.clone());
        Ok(producer)
    }

    async fn create_consumer(
        &self,
        address: &str,
        filter: Option<&str>,
    ) -> Result<Arc<dyn BrokerConsumer>, BrokerError> {
        if self.session.is_closed() {
            return Err(BrokerError::new("session is closed"));
        }
        let filter = match filter {
            Some(raw) => Some(parse_filter(raw)?),
            None => None,
        };
        let consumer = Arc::new(MockConsumer {
            address: address.to_string(),
            filter,
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            handler: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            hub: self.hub.clone(),
        });
        self.session
            .children
            .lock()
            .unwrap()
            .consumers
            .push(consumer.clone());
        self.hub.inner.lock().unwrap().consumers.push(consumer.clone());
        Ok(consumer)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.session.force_close();
        self.hub
            .record_event(format!("session_closed:{}", self.session.host));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), BrokerError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| BrokerError::new(format!("malformed filter: {raw}")))?;
    let value = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .ok_or_else(|| BrokerError::new(format!("malformed filter value: {raw}")))?;
    Ok((name.to_string(), value.to_string()))
}

pub struct MockProducer {
    pub address: String,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    sent: Mutex<Vec<WireMessage>>,
    hub: Arc<BrokerHub>,
}

impl MockProducer {
    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Relaxed)
    }

    pub fn force_close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl BrokerProducer for MockProducer {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send(&self, message: WireMessage) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::new("producer is closed"));
        }
        self.sent.lock().unwrap().push(message.clone());

        for consumer in self.hub.matching_consumers(&self.address, &message) {
            consumer.deliver(message.clone()).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.close_calls.fetch_add(1, Ordering::Relaxed);
        self.closed.store(true, Ordering::Relaxed);
        self.hub
            .record_event(format!("producer_closed:{}", self.address));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

pub struct MockConsumer {
    pub address: String,
    filter: Option<(String, String)>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    queue: Mutex<VecDeque<WireMessage>>,
    hub: Arc<BrokerHub>,
}

impl MockConsumer {
    pub fn filter_value(&self) -> Option<&str> {
        self.filter.as_ref().map(|(_, value)| value.as_str())
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Relaxed)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn force_close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn filter_matches(&self, message: &WireMessage) -> bool {
        match &self.filter {
            None => true,
            Some((name, value)) => message.string_property(name) == Some(value.as_str()),
        }
    }

    /// Push-mode delivery when a handler is installed, queueing otherwise.
    pub async fn deliver(&self, message: WireMessage) {
        let handler = self.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler.on_message(message).await,
            None => self.queue.lock().unwrap().push_back(message),
        }
    }
}

#[async_trait]
impl BrokerConsumer for MockConsumer {
    async fn receive_immediate(&self) -> Result<Option<WireMessage>, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::new("consumer is closed"));
        }
        Ok(self.queue.lock().unwrap().pop_front())
    }

    async fn set_handler(
        &self,
        handler: Option<Arc<dyn MessageHandler>>,
    ) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::new("consumer is closed"));
        }
        *self.handler.lock().unwrap() = handler;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.close_calls.fetch_add(1, Ordering::Relaxed);
        self.closed.store(true, Ordering::Relaxed);
        let filter = self.filter_value().unwrap_or("none").to_string();
        self.hub
            .record_event(format!("consumer_closed:{}:{}", self.address, filter));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Recording collaborators
// ---------------------------------------------------------------------------

pub struct MemoryArchive {
    saved: Mutex<Vec<(Vec<u8>, i64)>>,
    fail_saves: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryArchive {
    pub fn saved(&self) -> Vec<(Vec<u8>, i64)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageArchive for MemoryArchive {
    async fn save(&self, bytes: &[u8], timestamp_ms: i64) -> Result<(), ArchiveError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(ArchiveError::new("archive unavailable"));
        }
        self.saved
            .lock()
            .unwrap()
            .push((bytes.to_vec(), timestamp_ms));
        Ok(())
    }

    async fn query(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Message>, ArchiveError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, timestamp_ms)| (from_ms..=to_ms).contains(timestamp_ms))
            .map(|(bytes, timestamp_ms)| Message::new(bytes.clone(), *timestamp_ms))
            .collect())
    }

    async fn close(&self) -> Result<(), ArchiveError> {
        self.close_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryArchiveFactory {
    archives: Mutex<HashMap<String, Arc<MemoryArchive>>>,
}

impl MemoryArchiveFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn archive_for(&self, microservice_uuid: &str) -> Option<Arc<MemoryArchive>> {
        self.archives
            .lock()
            .unwrap()
            .get(microservice_uuid)
            .cloned()
    }
}

#[async_trait]
impl MessageArchiveFactory for MemoryArchiveFactory {
    async fn open(&self, microservice_uuid: &str) -> Result<Arc<dyn MessageArchive>, ArchiveError> {
        let archive = self
            .archives
            .lock()
            .unwrap()
            .entry(microservice_uuid.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryArchive {
                    saved: Mutex::new(Vec::new()),
                    fail_saves: AtomicBool::new(false),
                    close_calls: AtomicUsize::new(0),
                })
            })
            .clone();
        Ok(archive)
    }
}

#[derive(Default)]
pub struct RecordingRealtime {
    delivered: Mutex<Vec<(String, Message)>>,
}

impl RecordingRealtime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered_for(&self, microservice_uuid: &str) -> Vec<Message> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(uuid, _)| uuid == microservice_uuid)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl RealtimeCallback for RecordingRealtime {
    async fn deliver(&self, microservice_uuid: &str, message: Message) {
        self.delivered
            .lock()
            .unwrap()
            .push((microservice_uuid.to_string(), message));
    }
}

// ---------------------------------------------------------------------------
// Builders and harness
// ---------------------------------------------------------------------------

pub fn broker_endpoint(host: &str) -> BrokerEndpoint {
    BrokerEndpoint {
        host: host.to_string(),
        port: 61616,
        user: "fog".to_string(),
        password: "fog".to_string(),
        security: EndpointSecurity::DevMode,
    }
}

pub fn connector_endpoint(connector_id: u32, host: &str) -> ConnectorEndpoint {
    ConnectorEndpoint {
        connector_id,
        broker: broker_endpoint(host),
    }
}

pub fn bridge_key(connector_id: u32, topic: &str, pass_key: &str) -> BridgeKey {
    BridgeKey {
        connector_id,
        topic: topic.to_string(),
        pass_key: pass_key.to_string(),
    }
}

pub fn local_producer(uuid: &str) -> ProducerRef {
    ProducerRef {
        microservice_uuid: uuid.to_string(),
        is_local: true,
        bridge: None,
    }
}

pub fn remote_producer(uuid: &str, key: BridgeKey) -> ProducerRef {
    ProducerRef {
        microservice_uuid: uuid.to_string(),
        is_local: false,
        bridge: Some(key),
    }
}

pub fn local_receiver(uuid: &str) -> ReceiverRef {
    ReceiverRef {
        microservice_uuid: uuid.to_string(),
        is_local: true,
        bridge: None,
    }
}

pub fn remote_receiver(uuid: &str, key: BridgeKey) -> ReceiverRef {
    ReceiverRef {
        microservice_uuid: uuid.to_string(),
        is_local: false,
        bridge: Some(key),
    }
}

pub fn route(producer: ProducerRef, receivers: Vec<ReceiverRef>) -> Route {
    Route {
        producer,
        receivers,
    }
}

pub struct Harness {
    pub broker: Arc<MockBroker>,
    pub archives: Arc<MemoryArchiveFactory>,
    pub realtime: Arc<RecordingRealtime>,
    pub service: MessageRoutingService,
}

/// A started service wired to fresh mock collaborators. Monitors run on
/// their default cadence; tests drive extra ticks via `run_health_tick`.
pub async fn started_service() -> Harness {
    init_logging();
    let broker = MockBroker::new();
    let archives = MemoryArchiveFactory::new();
    let realtime = RecordingRealtime::new();
    let service = MessageRoutingService::new(
        broker.clone(),
        broker_endpoint(LOCAL_HOST),
        archives.clone(),
        realtime.clone(),
    );
    service
        .start()
        .await
        .expect("local bus should be reachable");
    Harness {
        broker,
        archives,
        realtime,
        service,
    }
}
