//! Connector plane: session pooling, bridge producers/consumers, and the
//! registry reconciling both against the configured endpoint set.

pub mod bridge;
pub mod endpoint;
pub mod registry;
pub(crate) mod session_pool;
