//! Remote call description and the transport/gateway ports.

pub mod call;
pub mod ports;
