//! Canonical structured field keys and value-format helpers.

use crate::control_plane::route_table::BridgeKey;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const PRODUCER: &str = "producer";
pub const RECEIVER: &str = "receiver";
pub const CONNECTOR_ID: &str = "connector_id";
pub const BRIDGE: &str = "bridge";
pub const ERR: &str = "err";
pub const REASON: &str = "reason";

pub const NONE: &str = "none";

/// Compact single-field rendering of a bridge key for log correlation.
pub fn format_bridge_key(key: &BridgeKey) -> String {
    format!("{}/{}", key.connector_id, key.topic)
}

pub fn format_optional_bridge_key(key: Option<&BridgeKey>) -> String {
    key.map(format_bridge_key).unwrap_or_else(|| NONE.to_string())
}

#[cfg(test)]
mod tests {
    use super::{format_bridge_key, format_optional_bridge_key, NONE};
    use crate::control_plane::route_table::BridgeKey;

    #[test]
    fn bridge_key_formats_without_pass_key() {
        let key = BridgeKey {
            connector_id: 7,
            topic: "telemetry".to_string(),
            pass_key: "secret".to_string(),
        };

        let formatted = format_bridge_key(&key);

        assert_eq!(formatted, "7/telemetry");
        assert!(!formatted.contains("secret"));
    }

    #[test]
    fn optional_bridge_key_falls_back_to_none() {
        assert_eq!(format_optional_bridge_key(None), NONE);
    }
}
