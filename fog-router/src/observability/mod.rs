//! Observability model: canonical event names, structured field keys, and
//! the router status surface. The library emits `tracing` events and never
//! installs a global subscriber; binaries and tests own subscriber setup.

pub mod events;
pub mod fields;
pub mod status;
