//! Routing policy: how a route's receiver set maps onto the addresses a
//! publisher actually sends to.

pub(crate) mod receiver_selection;
