//! Backend access: JSON-RPC transport, session pooling and the resilient
//! client facade.

pub mod client;
pub mod sessions;
pub mod transport;

pub use client::{ErpLease, ResilientRpcClient};
pub use sessions::TransportSessions;
pub use transport::{JsonRpcTransport, RpcSession};
