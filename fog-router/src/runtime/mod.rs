//! Runtime layer: the cancellable ticker abstraction and the background
//! monitors built on it. Isolated here so async/timing behavior stays
//! localized and predictable for the rest of the crate.

pub(crate) mod health_monitor;
pub(crate) mod throughput;
pub(crate) mod ticker;
