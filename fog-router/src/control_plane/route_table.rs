//! Route-table data model: who publishes, who receives, and over which
//! connector a route edge leaves this node.

use crate::observability::events;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

const COMPONENT: &str = "route_table";

/// Identity of one remote bridge endpoint: which connector, which shared
/// topic, and the pass key gating it.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct BridgeKey {
    pub connector_id: u32,
    pub topic: String,
    pub pass_key: String,
}

/// The producing side of a route. `bridge` is present iff `!is_local`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProducerRef {
    pub microservice_uuid: String,
    pub is_local: bool,
    pub bridge: Option<BridgeKey>,
}

/// One receiving side of a route. `bridge` is present iff `!is_local`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReceiverRef {
    pub microservice_uuid: String,
    pub is_local: bool,
    pub bridge: Option<BridgeKey>,
}

/// One producing microservice and the set of receivers that should get
/// everything it publishes.
///
/// Receiver semantics are set semantics: order-insensitive equality,
/// deduplicated by microservice uuid.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct Route {
    pub producer: ProducerRef,
    pub receivers: Vec<ReceiverRef>,
}

impl Route {
    fn receivers_by_uuid(&self) -> BTreeMap<&str, &ReceiverRef> {
        self.receivers
            .iter()
            .map(|receiver| (receiver.microservice_uuid.as_str(), receiver))
            .collect()
    }

    fn references_unknown_connector(&self, known: &HashSet<u32>) -> Option<u32> {
        self.producer
            .bridge
            .iter()
            .chain(self.receivers.iter().filter_map(|r| r.bridge.as_ref()))
            .map(|key| key.connector_id)
            .find(|connector_id| !known.contains(connector_id))
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.producer == other.producer && self.receivers_by_uuid() == other.receivers_by_uuid()
    }
}

/// Storage owner for the full table of routes, keyed by producer uuid.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::new();
        for route in routes {
            table.insert(route);
        }
        table
    }

    pub fn insert(&mut self, route: Route) {
        self.routes
            .insert(route.producer.microservice_uuid.clone(), route);
    }

    pub fn get(&self, producer_uuid: &str) -> Option<&Route> {
        self.routes.get(producer_uuid)
    }

    pub fn contains(&self, producer_uuid: &str) -> bool {
        self.routes.contains_key(producer_uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Route)> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Drops every route referencing a connector id outside `known`. A
    /// misconfigured route degrades to a warning; the rest of the table is
    /// unaffected.
    pub(crate) fn retain_known_connectors(&mut self, known: &HashSet<u32>) {
        self.routes.retain(|producer_uuid, route| {
            match route.references_unknown_connector(known) {
                None => true,
                Some(connector_id) => {
                    warn!(
                        event = events::ROUTE_SKIPPED_UNKNOWN_CONNECTOR,
                        component = COMPONENT,
                        producer = producer_uuid.as_str(),
                        connector_id,
                        "route references unknown connector; skipping"
                    );
                    false
                }
            }
        });
    }
}
