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

mod support;

use fog_router::{Message, PublishError, RouteTable};
use std::collections::HashMap;
use support::*;

const LOCAL_BUS: &str = "fog.message_bus";

#[tokio::test]
async fn remote_route_publishes_through_the_connector_address() {
    let harness = started_service().await;
    let endpoints = HashMap::from([(7, connector_endpoint(7, "c.local"))]);
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![remote_receiver("svc-a", bridge_key(7, "t1", "k1"))],
    )]);
    harness.service.update(routes, endpoints).await;

    let payload = vec![1, 2, 3];
    harness
        .service
        .publish("producer-1", Message::new(payload.clone(), 42))
        .await
        .expect("publish should succeed");

    let producers = harness.broker.producers_at("pubsub.fog.t1");
    assert_eq!(producers.len(), 1);
    let sent = producers[0].sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].string_property("key"), Some("k1"));
    assert_eq!(sent[0].bytes_property("message"), Some(payload.as_slice()));
}

#[tokio::test]
async fn receivers_sharing_a_connector_get_exactly_one_bridge_message() {
    let harness = started_service().await;
    let key = bridge_key(5, "t-shared", "k5");
    let endpoints = HashMap::from([(5, connector_endpoint(5, "c5.local"))]);
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![
            local_receiver("svc-l1"),
            local_receiver("svc-l2"),
            remote_receiver("svc-r3", key.clone()),
            remote_receiver("svc-r1", key.clone()),
            remote_receiver("svc-r2", key),
        ],
    )]);
    harness.service.update(routes, endpoints).await;

    harness
        .service
        .publish("producer-1", Message::new(vec![9], 100))
        .await
        .expect("publish should succeed");

    // Three remote receivers share connector 5: exactly one message crosses
    // the bridge, regardless of the group size.
    let bridged = harness.broker.sent_to("pubsub.fog.t-shared");
    assert_eq!(bridged.len(), 1);
    assert_eq!(bridged[0].string_property("key"), Some("k5"));

    // Local receivers are never deduplicated; the group representative is
    // the lowest microservice uuid.
    let local_sends = harness.broker.sent_to(LOCAL_BUS);
    let mut addressed: Vec<&str> = local_sends
        .iter()
        .filter_map(|wire| wire.string_property("receiver"))
        .collect();
    addressed.sort_unstable();
    assert_eq!(addressed, vec!["svc-l1", "svc-l2", "svc-r1"]);
}

#[tokio::test]
async fn publish_archives_before_fanout_and_supports_query() {
    let harness = started_service().await;
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![local_receiver("svc-a")],
    )]);
    harness.service.update(routes, HashMap::new()).await;

    harness
        .service
        .publish("producer-1", Message::new(vec![1], 10))
        .await
        .expect("publish should succeed");
    harness
        .service
        .publish("producer-1", Message::new(vec![2], 20))
        .await
        .expect("publish should succeed");

    let archive = harness
        .archives
        .archive_for("producer-1")
        .expect("archive opened for publisher");
    assert_eq!(archive.saved().len(), 2);

    let in_window = harness
        .service
        .query("producer-1", 0, 15)
        .await
        .expect("query should succeed");
    assert_eq!(in_window.len(), 1);
    assert_eq!(in_window[0].bytes(), &[1]);
}

#[tokio::test]
async fn archive_failure_degrades_to_warning_and_delivery_proceeds() {
    let harness = started_service().await;
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![local_receiver("svc-a")],
    )]);
    harness.service.update(routes, HashMap::new()).await;

    harness
        .archives
        .archive_for("producer-1")
        .expect("archive opened for publisher")
        .set_fail_saves(true);

    harness
        .service
        .publish("producer-1", Message::new(vec![3], 30))
        .await
        .expect("publish should succeed despite archive failure");

    assert_eq!(harness.broker.sent_to(LOCAL_BUS).len(), 1);
}

#[tokio::test]
async fn publish_for_unknown_producer_is_an_error() {
    let harness = started_service().await;

    let result = harness
        .service
        .publish("never-routed", Message::new(vec![1], 1))
        .await;

    assert!(matches!(result, Err(PublishError::UnknownPublisher(_))));
}

#[tokio::test]
async fn concurrent_publishes_on_one_route_all_deliver() {
    let harness = started_service().await;
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![local_receiver("svc-a")],
    )]);
    harness.service.update(routes, HashMap::new()).await;

    let (first, second) = futures::future::join(
        harness
            .service
            .publish("producer-1", Message::new(vec![1], 1)),
        harness
            .service
            .publish("producer-1", Message::new(vec![2], 2)),
    )
    .await;
    first.expect("publish should succeed");
    second.expect("publish should succeed");

    assert_eq!(harness.broker.sent_to(LOCAL_BUS).len(), 2);
    assert_eq!(harness.service.status().processed_messages, 2);
}

#[tokio::test]
async fn status_tracks_published_counts() {
    let harness = started_service().await;
    let routes = RouteTable::from_routes(vec![route(
        local_producer("producer-1"),
        vec![local_receiver("svc-a")],
    )]);
    harness.service.update(routes, HashMap::new()).await;

    for sequence in 0u8..3 {
        harness
            .service
            .publish("producer-1", Message::new(vec![sequence], i64::from(sequence)))
            .await
            .expect("publish should succeed");
    }

    let status = harness.service.status();
    assert_eq!(status.processed_messages, 3);
    assert_eq!(status.published_per_microservice["producer-1"], 3);
}
