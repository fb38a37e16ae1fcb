//! Canonical structured event names used across `fog-router`.

// Session pool and connector registry events.
pub const POOL_CREATED: &str = "pool_created";
pub const POOL_CREATE_FAILED: &str = "pool_create_failed";
pub const POOL_SHUTDOWN: &str = "pool_shutdown";
pub const POOL_SESSION_CLOSE_FAILED: &str = "pool_session_close_failed";
pub const CONNECTOR_POOL_INSTALLED: &str = "connector_pool_installed";
pub const CONNECTOR_POOL_REMOVED: &str = "connector_pool_removed";
pub const CONNECTOR_DIAL_RETRY: &str = "connector_dial_retry";
pub const BRIDGE_PRODUCER_CREATE_OK: &str = "bridge_producer_create_ok";
pub const BRIDGE_PRODUCER_CREATE_FAILED: &str = "bridge_producer_create_failed";
pub const BRIDGE_CONSUMER_CREATE_OK: &str = "bridge_consumer_create_ok";
pub const BRIDGE_CONSUMER_CREATE_FAILED: &str = "bridge_consumer_create_failed";
pub const BRIDGE_REUSED: &str = "bridge_reused";
pub const BRIDGE_RELEASED: &str = "bridge_released";
pub const BRIDGE_REMOVED: &str = "bridge_removed";
pub const BRIDGE_RELEASE_UNTRACKED: &str = "bridge_release_untracked";
pub const BRIDGE_CLOSE_FAILED: &str = "bridge_close_failed";

// Publisher and receiver events.
pub const PUBLISH_ARCHIVE_FAILED: &str = "publish_archive_failed";
pub const PUBLISH_SEND_FAILED: &str = "publish_send_failed";
pub const CONNECTOR_INGEST_DROPPED: &str = "connector_ingest_dropped";
pub const CONNECTOR_INGEST_FAILED: &str = "connector_ingest_failed";
pub const CONNECTOR_CONSUMING_ENABLED: &str = "connector_consuming_enabled";
pub const CONNECTOR_CONSUMING_UNAVAILABLE: &str = "connector_consuming_unavailable";
pub const CONNECTOR_PRODUCING_ENABLED: &str = "connector_producing_enabled";
pub const CONNECTOR_PRODUCING_UNAVAILABLE: &str = "connector_producing_unavailable";
pub const BRIDGE_FORWARD_FAILED: &str = "bridge_forward_failed";
pub const REALTIME_ENABLED: &str = "realtime_enabled";
pub const REALTIME_DISABLED: &str = "realtime_disabled";
pub const RECEIVER_HANDLER_FAILED: &str = "receiver_handler_failed";

// Control-plane lifecycle events.
pub const ROUTE_SKIPPED_UNKNOWN_CONNECTOR: &str = "route_skipped_unknown_connector";
pub const RECONCILE_APPLIED: &str = "reconcile_applied";
pub const PUBLISHER_PROVISION_FAILED: &str = "publisher_provision_failed";
pub const RECEIVER_PROVISION_FAILED: &str = "receiver_provision_failed";

// Health-monitor and runtime events.
pub const BUS_INACTIVE: &str = "bus_inactive";
pub const BUS_RESTARTED: &str = "bus_restarted";
pub const BUS_RESTART_FAILED: &str = "bus_restart_failed";
pub const MONITOR_PRODUCER_RESTORED: &str = "monitor_producer_restored";
pub const MONITOR_PRODUCER_DROPPED: &str = "monitor_producer_dropped";
pub const MONITOR_CONSUMER_RESTORED: &str = "monitor_consumer_restored";
pub const MONITOR_CONSUMER_DROPPED: &str = "monitor_consumer_dropped";
pub const MONITOR_REPAIR_FAILED: &str = "monitor_repair_failed";
pub const TICKER_STOPPED: &str = "ticker_stopped";

// Facade events.
pub const SERVICE_STARTED: &str = "service_started";
pub const SERVICE_STOPPED: &str = "service_stopped";
pub const ROUTES_UPDATED: &str = "routes_updated";
pub const CONFIG_REFRESH_FAILED: &str = "config_refresh_failed";
