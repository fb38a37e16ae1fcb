//! Data plane: the local bus session, per-route publishers, and per-service
//! receivers.

pub(crate) mod local_bus;
pub mod publisher;
pub mod receiver;
